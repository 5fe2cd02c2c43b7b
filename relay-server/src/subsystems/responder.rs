//! AI responder: prompt assembly, generation, handoff detection.

use relay_core::api::ReplyAction;
use relay_core::models::{
    ConversationStatus, Message, Sender, TenantAiConfig, TenantIntegration,
};
use relay_core::{GenerationError, GenerationRequest, RelayError, Role, Turn};
use uuid::Uuid;

use super::{conversation, gateway};
use crate::state::RelayState;
use crate::worker::DispatchJob;

/// Embedded by the model when the counterparty asks for a person.
pub const HANDOFF_MARKER: &str = "[HUMAN_REQUEST]";

pub const TEXT_FALLBACK: &str = "I'm sorry, I'm having trouble connecting right now.";

/// Synthetic user turn appended when history would end on the model.
pub const CONTINUE_PROMPT: &str = "Please respond to the previous context.";

pub(crate) const DEFAULT_GOAL: &str = "Help the client";

const VOICE_RULES: &str = "IMPORTANT VOICE INSTRUCTIONS:
1. You are speaking on the phone.
2. Keep responses SHORT and CONVERSATIONAL (1-2 sentences max).
3. Do not use emojis, markdown, or bullet points.
4. If you need to list things, say \"First, ... Second, ...\".
5. Be polite but direct.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyProfile {
    Text,
    Voice,
}

/// Map stored messages (oldest first) to model turns. Only counterparty
/// messages are user turns; AI and system messages are model turns.
pub fn build_history(messages: &[Message], strip_prefix: Option<&str>) -> Vec<Turn> {
    messages
        .iter()
        .map(|m| {
            let text = match strip_prefix {
                Some(prefix) => m.text.strip_prefix(prefix).unwrap_or(&m.text),
                None => &m.text,
            };
            match m.sender {
                Sender::User => Turn::user(text),
                Sender::Ai | Sender::System => Turn::model(text),
            }
        })
        .collect()
}

pub fn ensure_trailing_user_turn(turns: &mut Vec<Turn>) {
    if turns.last().map_or(true, |t| t.role == Role::Model) {
        turns.push(Turn::user(CONTINUE_PROMPT));
    }
}

pub fn system_instruction(ai: &TenantAiConfig, profile: ReplyProfile) -> String {
    let goal = ai.business_goal.as_deref().unwrap_or(DEFAULT_GOAL);
    match profile {
        ReplyProfile::Text => match ai.knowledge_base.as_deref() {
            Some(kb) => format!(
                "{}\n\nIMPORTANT: Be concise. If the user asks for a human or to speak to someone, add {} to your response.",
                kb, HANDOFF_MARKER
            ),
            None => format!(
                "You are a helpful AI receptionist. Goal: {}. Be polite and concise.",
                goal
            ),
        },
        ReplyProfile::Voice => {
            let base = match ai.knowledge_base.as_deref() {
                Some(kb) => kb.to_string(),
                None => format!("You are a helpful AI receptionist. Your goal is: {}.", goal),
            };
            format!("{}\n\n{}", base, VOICE_RULES)
        }
    }
}

/// Remove every handoff marker. Returns the visible text and whether one was present.
pub fn extract_handoff(text: &str) -> (String, bool) {
    if !text.contains(HANDOFF_MARKER) {
        return (text.trim().to_string(), false);
    }
    (text.replace(HANDOFF_MARKER, "").trim().to_string(), true)
}

/// Strip the marker and, when the tenant has a notification phone, queue
/// exactly one notification. Queueing failures never affect the reply.
pub fn apply_handoff(
    state: &RelayState,
    tenant: &TenantIntegration,
    conversation_id: Uuid,
    text: &str,
) -> (String, bool) {
    let (visible, handoff) = extract_handoff(text);
    if handoff {
        match tenant.ai_config().notification_phone {
            Some(phone) => {
                tracing::info!(
                    tenant_id = %tenant.tenant_id,
                    conversation_id = %conversation_id,
                    "Human handoff requested, notifying tenant"
                );
                state.dispatcher.enqueue(DispatchJob::Notify {
                    tenant_id: tenant.tenant_id,
                    to: phone,
                    body: format!("Human Handoff Requested for conversation: {}", conversation_id),
                });
            }
            None => tracing::info!(
                tenant_id = %tenant.tenant_id,
                conversation_id = %conversation_id,
                "Human handoff requested, no notification phone configured"
            ),
        }
    }
    (visible, handoff)
}

#[derive(Debug, Clone)]
pub struct ReplyOutcome {
    pub reply: String,
    pub handoff: bool,
    /// True when the reply was persisted and handed to the channel.
    pub sent: bool,
    pub send_error: Option<String>,
}

pub async fn reply_to_conversation(
    state: &RelayState,
    tenant_id: Uuid,
    conversation_id: Uuid,
    action: ReplyAction,
) -> Result<ReplyOutcome, RelayError> {
    let tenant = state
        .store
        .get_tenant_config(tenant_id)
        .await?
        .ok_or_else(|| RelayError::Other(format!("Tenant {} not found", tenant_id)))?;
    let conversation = state
        .store
        .get_conversation(tenant_id, conversation_id)
        .await?
        .ok_or(RelayError::ConversationNotFound(conversation_id))?;

    let ai = tenant.ai_config();
    let api_key = ai
        .api_key
        .as_deref()
        .ok_or_else(|| RelayError::MissingCredential("AI API key missing".to_string()))?;

    let messages = state
        .store
        .recent_messages(conversation_id, state.config.ai.text_history_limit)
        .await?;
    let mut turns = build_history(&messages, None);
    ensure_trailing_user_turn(&mut turns);

    let request = GenerationRequest {
        system_instruction: Some(system_instruction(&ai, ReplyProfile::Text)),
        turns,
        max_output_tokens: state.config.ai.text_max_output_tokens,
    };

    let raw = match state.model.generate(api_key, &request).await {
        Ok(text) => text,
        Err(GenerationError::EmptyOutput) => TEXT_FALLBACK.to_string(),
        Err(e) => return Err(e.into()),
    };
    let (reply, handoff) = apply_handoff(state, &tenant, conversation_id, &raw);
    let reply = if reply.is_empty() {
        TEXT_FALLBACK.to_string()
    } else {
        reply
    };

    let mut outcome = ReplyOutcome {
        reply,
        handoff,
        sent: false,
        send_error: None,
    };

    if action == ReplyAction::ReplyAndSend {
        conversation::append_message(
            state.store.as_ref(),
            &state.events,
            &conversation,
            Sender::Ai,
            &outcome.reply,
        )
        .await?;
        state
            .store
            .touch_conversation(conversation_id, &outcome.reply, ConversationStatus::Replied)
            .await?;

        match gateway::send_outbound(
            state,
            &tenant,
            conversation.channel,
            &conversation.address,
            &outcome.reply,
        )
        .await
        {
            Ok(_) => outcome.sent = true,
            Err(e) => {
                tracing::warn!(
                    tenant_id = %tenant_id,
                    conversation_id = %conversation_id,
                    error = %e,
                    "Reply stored but delivery failed"
                );
                outcome.send_error = Some(e.to_string());
            }
        }
    }

    Ok(outcome)
}
