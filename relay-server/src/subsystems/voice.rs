//! Voice dialog loop.
//!
//! Each provider callback is handled on its own; no call state is kept
//! between turns. Continuity comes from the stored messages of the caller's
//! voice conversation.

use relay_core::channels::{GatherSpec, VoiceMarkup};
use relay_core::models::{Channel, ConversationStatus, Sender, TenantIntegration, VoiceEvent};
use relay_core::{GenerationRequest, RelayError, Turn};

use super::responder::{self, ReplyProfile};
use super::{conversation, tenant};
use crate::state::RelayState;

pub const NO_ACCOUNT: &str = "We could not find an account for this number.";
pub const VOICE_DISABLED: &str = "This number does not accept voice calls.";
pub const NO_INPUT_FALLTHROUGH: &str = "I didn't hear anything. Goodbye.";
pub const VOICE_FALLBACK: &str = "I'm sorry, I didn't catch that.";
pub const VOICE_ERROR: &str = "Sorry, I had an error.";
pub const GOODBYE: &str = "Goodbye.";

pub const CALL_STARTED: &str = "[Voice Call Started]";
/// Stored voice messages carry this prefix; it is removed when rebuilding history.
pub const VOICE_PREFIX: &str = "[Voice] ";

/// Where a callback sits in the call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DialogStep {
    CallStart,
    TurnReceived(String),
    NoInput,
}

impl DialogStep {
    pub fn classify(event: &VoiceEvent, is_turn_callback: bool) -> Self {
        match (is_turn_callback, event.transcript()) {
            (_, Some(text)) => DialogStep::TurnReceived(text.to_string()),
            (false, None) => DialogStep::CallStart,
            (true, None) => DialogStep::NoInput,
        }
    }
}

fn gather_spec(state: &RelayState) -> GatherSpec {
    GatherSpec {
        action: state.config.voice.action_url.clone(),
        language: state.config.voice.language.clone(),
        pause_seconds: state.config.voice.pause_seconds,
    }
}

fn voice_of<'a>(state: &'a RelayState, tenant: &'a TenantIntegration) -> &'a str {
    tenant
        .voice_id
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(&state.config.voice.default_voice)
}

/// Resolve a tenant that accepts calls, or the terminal markup explaining why not.
async fn voice_tenant(
    state: &RelayState,
    event: &VoiceEvent,
) -> Result<Result<TenantIntegration, VoiceMarkup>, RelayError> {
    match tenant::resolve_tenant(state.store.as_ref(), Channel::Voice, &event.to).await {
        Ok(tenant) if tenant.accepts_voice() => Ok(Ok(tenant)),
        Ok(tenant) => {
            tracing::info!(tenant_id = %tenant.tenant_id, "Voice disabled, rejecting call");
            Ok(Err(VoiceMarkup::terminal(None, VOICE_DISABLED)))
        }
        Err(RelayError::TenantNotFound { address, .. }) => {
            tracing::warn!(to = %address, "No tenant for voice number");
            Ok(Err(VoiceMarkup::terminal(None, NO_ACCOUNT)))
        }
        Err(e) => Err(e),
    }
}

/// Entry point for both voice webhooks. Never fails: internal errors become
/// a terminal apology.
pub async fn handle_callback(
    state: &RelayState,
    event: VoiceEvent,
    is_turn_callback: bool,
) -> VoiceMarkup {
    match handle_callback_inner(state, &event, is_turn_callback).await {
        Ok(markup) => markup,
        Err(e) => {
            tracing::error!(from = %event.from, to = %event.to, error = %e, "Voice callback failed");
            VoiceMarkup::terminal(None, VOICE_ERROR)
        }
    }
}

async fn handle_callback_inner(
    state: &RelayState,
    event: &VoiceEvent,
    is_turn_callback: bool,
) -> Result<VoiceMarkup, RelayError> {
    let tenant = match voice_tenant(state, event).await? {
        Ok(tenant) => tenant,
        Err(markup) => return Ok(markup),
    };
    let voice = voice_of(state, &tenant);

    match DialogStep::classify(event, is_turn_callback) {
        DialogStep::CallStart => {
            let greeting = tenant
                .voice_greeting
                .as_deref()
                .map(str::trim)
                .filter(|g| !g.is_empty())
                .unwrap_or(&state.config.voice.default_greeting);
            tracing::info!(tenant_id = %tenant.tenant_id, from = %event.from, "Incoming call");
            Ok(VoiceMarkup::new()
                .say(Some(voice), greeting)
                .gather(gather_spec(state))
                .say(Some(voice), NO_INPUT_FALLTHROUGH))
        }
        DialogStep::NoInput => Ok(VoiceMarkup::new().say(Some(voice), GOODBYE).hangup()),
        DialogStep::TurnReceived(transcript) => {
            let reply = run_turn(state, &tenant, event, &transcript).await?;
            Ok(VoiceMarkup::new()
                .say(Some(voice), &reply)
                .gather(gather_spec(state))
                .say(Some(voice), GOODBYE))
        }
    }
}

/// Persist the caller's turn, generate and persist the spoken reply.
async fn run_turn(
    state: &RelayState,
    tenant: &TenantIntegration,
    event: &VoiceEvent,
    transcript: &str,
) -> Result<String, RelayError> {
    // Seeded only when the thread is new.
    let existing = conversation::find_conversation(
        state.store.as_ref(),
        tenant.tenant_id,
        &event.from,
        Channel::Voice,
    )
    .await?;
    let conversation = match existing {
        Some(conversation) => conversation,
        None => {
            conversation::find_or_create_conversation(
                state.store.as_ref(),
                tenant.tenant_id,
                &event.from,
                Channel::Voice,
                CALL_STARTED,
            )
            .await?
            .conversation
        }
    };

    // History is read before this turn is written; the transcript is
    // appended locally instead.
    let history = state
        .store
        .recent_messages(conversation.id, state.config.ai.voice_history_limit)
        .await?;

    conversation::append_message(
        state.store.as_ref(),
        &state.events,
        &conversation,
        Sender::User,
        &format!("{}{}", VOICE_PREFIX, transcript),
    )
    .await?;

    let mut turns = responder::build_history(&history, Some(VOICE_PREFIX));
    turns.push(Turn::user(transcript));

    let raw = generate_spoken(state, tenant, turns).await;
    let (reply, _) = responder::apply_handoff(state, tenant, conversation.id, &raw);
    let reply = if reply.is_empty() {
        VOICE_FALLBACK.to_string()
    } else {
        reply
    };

    let stored = format!("{}{}", VOICE_PREFIX, reply);
    conversation::append_message(
        state.store.as_ref(),
        &state.events,
        &conversation,
        Sender::Ai,
        &stored,
    )
    .await?;
    state
        .store
        .touch_conversation(conversation.id, &stored, ConversationStatus::Replied)
        .await?;

    Ok(reply)
}

/// Generation with the voice fallback for every failure mode.
async fn generate_spoken(state: &RelayState, tenant: &TenantIntegration, turns: Vec<Turn>) -> String {
    let ai = tenant.ai_config();
    let Some(api_key) = ai.api_key.as_deref() else {
        tracing::warn!(tenant_id = %tenant.tenant_id, "No AI key, using voice fallback");
        return VOICE_FALLBACK.to_string();
    };

    let request = GenerationRequest {
        system_instruction: Some(responder::system_instruction(&ai, ReplyProfile::Voice)),
        turns,
        max_output_tokens: state.config.ai.voice_max_output_tokens,
    };

    match state.model.generate(api_key, &request).await {
        Ok(text) => text,
        Err(e) => {
            tracing::warn!(tenant_id = %tenant.tenant_id, error = %e, "Voice generation failed");
            VOICE_FALLBACK.to_string()
        }
    }
}
