//! Inbound pipeline shared by the text-channel webhooks:
//! resolve tenant, upsert thread, store the message, trigger auto-pilot.

use relay_core::models::{InboundMessage, Sender};
use relay_core::RelayError;
use uuid::Uuid;

use super::{autopilot, conversation, tenant};
use crate::state::RelayState;

#[derive(Debug, Clone)]
pub struct InboundOutcome {
    pub tenant_id: Uuid,
    pub conversation_id: Uuid,
    pub created: bool,
    pub auto_pilot_queued: bool,
}

pub async fn ingest_message(
    state: &RelayState,
    message: InboundMessage,
) -> Result<InboundOutcome, RelayError> {
    let tenant = tenant::resolve_tenant(state.store.as_ref(), message.channel, &message.to).await?;

    let outcome = conversation::find_or_create_conversation(
        state.store.as_ref(),
        tenant.tenant_id,
        &message.from,
        message.channel,
        &message.text,
    )
    .await?;

    conversation::append_message(
        state.store.as_ref(),
        &state.events,
        &outcome.conversation,
        Sender::User,
        &message.text,
    )
    .await?;

    tracing::info!(
        tenant_id = %tenant.tenant_id,
        conversation_id = %outcome.conversation.id,
        channel = %message.channel,
        "Inbound message stored"
    );

    let auto_pilot_queued = autopilot::trigger(state, &tenant, outcome.conversation.id);

    Ok(InboundOutcome {
        tenant_id: tenant.tenant_id,
        conversation_id: outcome.conversation.id,
        created: outcome.created,
        auto_pilot_queued,
    })
}
