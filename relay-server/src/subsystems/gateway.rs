//! Outbound send gateway: one entry point for every provider send.

use anyhow::Result;
use relay_core::api::SendMessageRequest;
use relay_core::channels::SendResult;
use relay_core::models::{Channel, TenantIntegration};
use relay_core::RelayError;
use uuid::Uuid;

use crate::auth::Caller;
use crate::state::RelayState;

pub async fn send_outbound(
    state: &RelayState,
    tenant: &TenantIntegration,
    channel: Channel,
    to: &str,
    body: &str,
) -> Result<SendResult, RelayError> {
    let to = to.trim();
    if to.is_empty() || body.trim().is_empty() {
        return Err(RelayError::Other("Missing to or body".to_string()));
    }

    let sender = state.channels.for_channel(channel).ok_or_else(|| {
        RelayError::Other(format!("Channel {} does not support outbound messages", channel))
    })?;

    let result = sender.send(tenant, to, body).await?;
    tracing::info!(
        tenant_id = %tenant.tenant_id,
        channel = %channel,
        provider = sender.name(),
        "Outbound message sent"
    );
    Ok(result)
}

/// Operator or internal send: the caller decides which tenant's credentials apply.
pub async fn send_for_caller(
    state: &RelayState,
    caller: &Caller,
    request: SendMessageRequest,
) -> Result<SendResult, RelayError> {
    let tenant = caller.tenant(state, request.tenant_id).await?;
    send_outbound(state, &tenant, request.channel, &request.to, &request.body).await
}

/// Notification SMS queued by the handoff path.
pub async fn send_notification(
    state: &RelayState,
    tenant_id: Uuid,
    to: &str,
    body: &str,
) -> Result<()> {
    let tenant = state
        .store
        .get_tenant_config(tenant_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("Tenant {} not found", tenant_id))?;
    send_outbound(state, &tenant, Channel::Sms, to, body).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::{GeminiClient, MemoryStore, RelayConfig};
    use std::sync::Arc;

    fn state() -> RelayState {
        let config = RelayConfig::default();
        let model = Arc::new(GeminiClient::new(&config.ai).unwrap());
        RelayState::new(config, Arc::new(MemoryStore::new()), model, reqwest::Client::new()).0
    }

    #[tokio::test]
    async fn voice_is_not_a_send_channel() {
        let state = state();
        let tenant = TenantIntegration::new(Uuid::new_v4());
        let err = send_outbound(&state, &tenant, Channel::Voice, "+15550001111", "hi")
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Channel voice does not support outbound messages");
    }

    #[tokio::test]
    async fn missing_credentials_are_reported_per_channel() {
        let state = state();
        let tenant = TenantIntegration::new(Uuid::new_v4());

        let sms = send_outbound(&state, &tenant, Channel::Sms, "+15550001111", "hi").await;
        assert_eq!(sms.unwrap_err().to_string(), "SMS account id missing");

        let fb = send_outbound(&state, &tenant, Channel::Facebook, "PSID", "hi").await;
        assert_eq!(fb.unwrap_err().to_string(), "Meta page id missing");

        let wa = send_outbound(&state, &tenant, Channel::Whatsapp, "15550001111", "hi").await;
        assert_eq!(wa.unwrap_err().to_string(), "WhatsApp phone id missing");
    }

    #[tokio::test]
    async fn service_caller_must_name_a_tenant() {
        let state = state();
        let request = SendMessageRequest {
            to: "+15550001111".to_string(),
            body: "hi".to_string(),
            channel: Channel::Sms,
            tenant_id: None,
        };
        let err = send_for_caller(&state, &Caller::Service, request).await.unwrap_err();
        assert_eq!(err.to_string(), "Missing tenant_id for system call");
    }
}
