//! Auto-pilot: answer inbound messages without waiting for an operator.

use anyhow::Result;
use relay_core::api::ReplyAction;
use relay_core::models::TenantIntegration;
use uuid::Uuid;

use super::responder;
use crate::state::RelayState;
use crate::worker::DispatchJob;

/// Queue a reply-and-send job when the tenant has auto-pilot on.
/// Never waits for the job; returns whether one was queued.
pub fn trigger(state: &RelayState, tenant: &TenantIntegration, conversation_id: Uuid) -> bool {
    if !tenant.auto_pilot_enabled {
        return false;
    }
    state.dispatcher.enqueue(DispatchJob::AutoPilot {
        tenant_id: tenant.tenant_id,
        conversation_id,
    })
}

/// Worker side of [`trigger`].
pub async fn run_auto_pilot(
    state: &RelayState,
    tenant_id: Uuid,
    conversation_id: Uuid,
) -> Result<()> {
    let outcome =
        responder::reply_to_conversation(state, tenant_id, conversation_id, ReplyAction::ReplyAndSend)
            .await?;

    match outcome.send_error {
        Some(e) => Err(anyhow::anyhow!("auto-pilot reply stored but not delivered: {}", e)),
        None => {
            tracing::info!(
                tenant_id = %tenant_id,
                conversation_id = %conversation_id,
                handoff = outcome.handoff,
                "Auto-pilot reply sent"
            );
            Ok(())
        }
    }
}
