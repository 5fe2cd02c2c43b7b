use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::{required_field, OutboundChannel, SendResult};
use crate::error::RelayError;
use crate::models::{Channel, SmsEvent, TenantIntegration};

/// Empty TwiML document; acknowledges the webhook without replying.
pub const SMS_ACK: &str = r#"<?xml version="1.0" encoding="UTF-8"?><Response></Response>"#;

/// Decode the provider's form fields. `From` and `To` are required.
pub fn parse_sms_form(form: &HashMap<String, String>) -> Result<SmsEvent, RelayError> {
    let (Some(from), Some(to)) = (required_field(form, "From"), required_field(form, "To")) else {
        return Err(RelayError::Parse("Missing fields".to_string()));
    };
    Ok(SmsEvent {
        from: from.to_string(),
        to: to.to_string(),
        body: form.get("Body").cloned().unwrap_or_default(),
    })
}

#[derive(Debug, Deserialize)]
struct TwilioErrorBody {
    message: Option<String>,
    detail: Option<String>,
}

pub struct TwilioSender {
    client: Client,
    base_url: String,
}

impl TwilioSender {
    pub fn new(client: Client, base_url: String) -> Self {
        Self { client, base_url }
    }
}

#[async_trait]
impl OutboundChannel for TwilioSender {
    async fn send(
        &self,
        tenant: &TenantIntegration,
        to: &str,
        body: &str,
    ) -> Result<SendResult, RelayError> {
        let Some((sid, token, from)) = tenant.sms_credentials() else {
            return Err(RelayError::MissingCredential(
                "SMS account id missing".to_string(),
            ));
        };

        let url = format!("{}/Accounts/{}/Messages.json", self.base_url, sid);
        let response = self
            .client
            .post(&url)
            .basic_auth(sid, Some(token))
            .form(&[("To", to), ("From", from), ("Body", body)])
            .send()
            .await?;

        let status = response.status();
        let raw = response.text().await.unwrap_or_default();

        if !status.is_success() {
            let message = serde_json::from_str::<TwilioErrorBody>(&raw)
                .ok()
                .and_then(|e| e.message.or(e.detail))
                .unwrap_or(raw);
            tracing::warn!(tenant_id = %tenant.tenant_id, status = %status, error = %message, "SMS send failed");
            return Err(RelayError::provider("Twilio", message));
        }

        let data = serde_json::from_str(&raw).unwrap_or(serde_json::Value::String(raw));
        Ok(SendResult {
            channel: Channel::Sms,
            data,
        })
    }

    fn name(&self) -> &str {
        "twilio"
    }
}
