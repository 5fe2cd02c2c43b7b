//! Messenger, Instagram Direct and WhatsApp Business over the Graph API.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::{Decoded, OutboundChannel, SendResult};
use crate::config::MetaConfig;
use crate::error::RelayError;
use crate::models::{Channel, InboundEvent, MessengerEvent, TenantIntegration, WhatsAppEvent};

/// Literal body the platform expects for every accepted POST.
pub const META_ACK: &str = "EVENT_RECEIVED";

#[derive(Debug, Deserialize, Default)]
pub struct WebhookVerifyQuery {
    #[serde(rename = "hub.mode")]
    pub hub_mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    pub hub_verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    pub hub_challenge: Option<String>,
}

impl WebhookVerifyQuery {
    /// The challenge to echo when the handshake is valid.
    pub fn accept(&self, expected_token: &str) -> Option<&str> {
        let subscribed = self.hub_mode.as_deref() == Some("subscribe");
        let token_ok = self.hub_verify_token.as_deref() == Some(expected_token);
        if subscribed && token_ok {
            self.hub_challenge.as_deref()
        } else {
            None
        }
    }
}

// ============================================================================
// Inbound payload
// ============================================================================

#[derive(Debug, Deserialize)]
struct MetaEnvelope {
    #[serde(default)]
    object: String,
    #[serde(default)]
    entry: Vec<MetaEntry>,
}

#[derive(Debug, Deserialize)]
struct MetaEntry {
    #[serde(default)]
    messaging: Vec<MessagingItem>,
    #[serde(default)]
    changes: Vec<MetaChange>,
}

#[derive(Debug, Deserialize)]
struct MessagingItem {
    sender: Option<IdRef>,
    recipient: Option<IdRef>,
    message: Option<MessagingMessage>,
}

#[derive(Debug, Deserialize)]
struct IdRef {
    id: String,
}

#[derive(Debug, Deserialize)]
struct MessagingMessage {
    text: Option<String>,
    #[serde(default)]
    is_echo: bool,
}

#[derive(Debug, Deserialize)]
struct MetaChange {
    value: Option<ChangeValue>,
}

#[derive(Debug, Deserialize)]
struct ChangeValue {
    #[serde(default)]
    messages: Vec<WaMessage>,
    metadata: Option<WaMetadata>,
}

#[derive(Debug, Deserialize)]
struct WaMessage {
    from: Option<String>,
    text: Option<WaText>,
}

#[derive(Debug, Deserialize)]
struct WaText {
    body: String,
}

#[derive(Debug, Deserialize)]
struct WaMetadata {
    phone_number_id: String,
}

/// Decode a webhook POST body into exactly one event, or an ignorable notice.
///
/// Only the first entry is considered. Messenger-style entries take the
/// channel from the envelope's `object`; `changes` entries are WhatsApp.
pub fn decode_meta(body: &[u8]) -> Result<Decoded, RelayError> {
    let envelope: MetaEnvelope =
        serde_json::from_slice(body).map_err(|e| RelayError::Parse(e.to_string()))?;

    let Some(entry) = envelope.entry.into_iter().next() else {
        return Ok(Decoded::Ignorable("no entries".to_string()));
    };

    if let Some(item) = entry.messaging.into_iter().next() {
        let message = match item.message {
            Some(m) if m.is_echo => return Ok(Decoded::Ignorable("message echo".to_string())),
            Some(m) => m,
            None => return Ok(Decoded::Ignorable("non-message messaging event".to_string())),
        };
        let text = message.text.filter(|t| !t.trim().is_empty());
        return match (item.sender, item.recipient, text) {
            (Some(sender), Some(recipient), Some(text)) => {
                let event = MessengerEvent {
                    sender_id: sender.id,
                    recipient_id: recipient.id,
                    text,
                };
                Ok(Decoded::Event(if envelope.object == "instagram" {
                    InboundEvent::Instagram(event)
                } else {
                    InboundEvent::Messenger(event)
                }))
            }
            _ => Ok(Decoded::Ignorable("message without text".to_string())),
        };
    }

    let Some(value) = entry.changes.into_iter().next().and_then(|c| c.value) else {
        return Ok(Decoded::Ignorable("no messaging or changes".to_string()));
    };
    let phone_number_id = value.metadata.map(|m| m.phone_number_id);
    let Some(message) = value.messages.into_iter().next() else {
        return Ok(Decoded::Ignorable("status update".to_string()));
    };

    let text = message
        .text
        .map(|t| t.body)
        .filter(|t| !t.trim().is_empty());
    match (message.from, text, phone_number_id) {
        (Some(from), Some(text), Some(phone_number_id)) => {
            Ok(Decoded::Event(InboundEvent::WhatsApp(WhatsAppEvent {
                from,
                phone_number_id,
                text,
            })))
        }
        _ => Ok(Decoded::Ignorable("non-text WhatsApp message".to_string())),
    }
}

// ============================================================================
// Outbound senders
// ============================================================================

#[derive(Debug, Deserialize)]
struct GraphErrorBody {
    error: Option<GraphErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct GraphErrorDetail {
    message: Option<String>,
}

/// Graph responses can carry an `error` object even with a success status.
async fn graph_result(
    provider: &str,
    response: reqwest::Response,
) -> Result<serde_json::Value, RelayError> {
    let status = response.status();
    let raw = response.text().await.unwrap_or_default();
    let data: serde_json::Value =
        serde_json::from_str(&raw).unwrap_or_else(|_| serde_json::Value::String(raw.clone()));

    let error_detail = serde_json::from_value::<GraphErrorBody>(data.clone())
        .ok()
        .and_then(|b| b.error);

    if let Some(detail) = error_detail {
        let message = detail.message.unwrap_or_else(|| "Unknown error".to_string());
        return Err(RelayError::provider(provider, message));
    }
    if !status.is_success() {
        return Err(RelayError::provider(provider, raw));
    }
    Ok(data)
}

/// Page-scoped send for Facebook Messenger and Instagram Direct.
pub struct MessengerSender {
    client: Client,
    channel: Channel,
    endpoint_base: String,
}

impl MessengerSender {
    pub fn new(client: Client, channel: Channel, config: &MetaConfig) -> Self {
        Self {
            client,
            channel,
            endpoint_base: format!("{}/{}", config.graph_base_url, config.graph_api_version),
        }
    }
}

#[async_trait]
impl OutboundChannel for MessengerSender {
    async fn send(
        &self,
        tenant: &TenantIntegration,
        to: &str,
        body: &str,
    ) -> Result<SendResult, RelayError> {
        let page_id = tenant
            .page_id()
            .ok_or_else(|| RelayError::MissingCredential("Meta page id missing".to_string()))?;
        let token = tenant
            .access_token()
            .ok_or_else(|| RelayError::MissingCredential("Meta access token missing".to_string()))?;

        let url = format!("{}/{}/messages", self.endpoint_base, page_id);
        let response = self
            .client
            .post(&url)
            .query(&[("access_token", token)])
            .json(&serde_json::json!({
                "recipient": { "id": to },
                "message": { "text": body }
            }))
            .send()
            .await?;

        let data = graph_result("Meta", response).await?;
        Ok(SendResult {
            channel: self.channel,
            data,
        })
    }

    fn name(&self) -> &str {
        self.channel.as_str()
    }
}

pub struct WhatsAppSender {
    client: Client,
    endpoint_base: String,
}

impl WhatsAppSender {
    pub fn new(client: Client, config: &MetaConfig) -> Self {
        Self {
            client,
            endpoint_base: format!("{}/{}", config.graph_base_url, config.graph_api_version),
        }
    }
}

#[async_trait]
impl OutboundChannel for WhatsAppSender {
    async fn send(
        &self,
        tenant: &TenantIntegration,
        to: &str,
        body: &str,
    ) -> Result<SendResult, RelayError> {
        let phone_id = tenant
            .whatsapp_id()
            .ok_or_else(|| RelayError::MissingCredential("WhatsApp phone id missing".to_string()))?;
        let token = tenant
            .access_token()
            .ok_or_else(|| RelayError::MissingCredential("Meta access token missing".to_string()))?;

        let url = format!("{}/{}/messages", self.endpoint_base, phone_id);
        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(&serde_json::json!({
                "messaging_product": "whatsapp",
                "to": to,
                "type": "text",
                "text": { "body": body }
            }))
            .send()
            .await?;

        let data = graph_result("WhatsApp", response).await?;
        Ok(SendResult {
            channel: Channel::Whatsapp,
            data,
        })
    }

    fn name(&self) -> &str {
        "whatsapp"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn meta_config(base: &str) -> MetaConfig {
        MetaConfig {
            graph_base_url: base.to_string(),
            ..Default::default()
        }
    }

    fn meta_tenant() -> TenantIntegration {
        let mut tenant = TenantIntegration::new(Uuid::new_v4());
        tenant.meta_page_id = Some("PAGE1".to_string());
        tenant.whatsapp_phone_id = Some("WA1".to_string());
        tenant.meta_access_token = Some("token-abc".to_string());
        tenant
    }

    #[test]
    fn verify_handshake_requires_mode_and_token() {
        let query = WebhookVerifyQuery {
            hub_mode: Some("subscribe".to_string()),
            hub_verify_token: Some("localai".to_string()),
            hub_challenge: Some("1158201444".to_string()),
        };
        assert_eq!(query.accept("localai"), Some("1158201444"));
        assert_eq!(query.accept("other"), None);

        let unsubscribed = WebhookVerifyQuery {
            hub_mode: Some("unsubscribe".to_string()),
            ..query
        };
        assert_eq!(unsubscribed.accept("localai"), None);
    }

    #[test]
    fn instagram_object_yields_instagram_event() {
        let body = serde_json::json!({
            "object": "instagram",
            "entry": [{ "messaging": [{
                "sender": { "id": "IGSID-1" },
                "recipient": { "id": "IG-BIZ" },
                "message": { "mid": "m1", "text": "hello" }
            }]}]
        });
        let decoded = decode_meta(body.to_string().as_bytes()).unwrap();
        assert_eq!(
            decoded,
            Decoded::Event(InboundEvent::Instagram(MessengerEvent {
                sender_id: "IGSID-1".to_string(),
                recipient_id: "IG-BIZ".to_string(),
                text: "hello".to_string(),
            }))
        );
    }

    #[test]
    fn page_object_yields_messenger_event() {
        let body = serde_json::json!({
            "object": "page",
            "entry": [{ "messaging": [{
                "sender": { "id": "PSID-1" },
                "recipient": { "id": "PAGE1" },
                "message": { "text": "hi" }
            }]}]
        });
        match decode_meta(body.to_string().as_bytes()).unwrap() {
            Decoded::Event(InboundEvent::Messenger(e)) => assert_eq!(e.recipient_id, "PAGE1"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn whatsapp_change_yields_whatsapp_event() {
        let body = serde_json::json!({
            "object": "whatsapp_business_account",
            "entry": [{ "changes": [{ "field": "messages", "value": {
                "messaging_product": "whatsapp",
                "metadata": { "display_phone_number": "15559998888", "phone_number_id": "WA1" },
                "messages": [{ "from": "15550001111", "type": "text", "text": { "body": "Hola" } }]
            }}]}]
        });
        assert_eq!(
            decode_meta(body.to_string().as_bytes()).unwrap(),
            Decoded::Event(InboundEvent::WhatsApp(WhatsAppEvent {
                from: "15550001111".to_string(),
                phone_number_id: "WA1".to_string(),
                text: "Hola".to_string(),
            }))
        );
    }

    #[test]
    fn blank_texts_are_ignorable() {
        let messenger = serde_json::json!({
            "object": "page",
            "entry": [{ "messaging": [{
                "sender": { "id": "PSID-1" },
                "recipient": { "id": "PAGE1" },
                "message": { "text": "" }
            }]}]
        });
        assert!(matches!(
            decode_meta(messenger.to_string().as_bytes()).unwrap(),
            Decoded::Ignorable(_)
        ));

        let whatsapp = serde_json::json!({
            "object": "whatsapp_business_account",
            "entry": [{ "changes": [{ "field": "messages", "value": {
                "metadata": { "phone_number_id": "WA1" },
                "messages": [{ "from": "15550001111", "type": "text", "text": { "body": "" } }]
            }}]}]
        });
        assert!(matches!(
            decode_meta(whatsapp.to_string().as_bytes()).unwrap(),
            Decoded::Ignorable(_)
        ));

        let whitespace = serde_json::json!({
            "object": "instagram",
            "entry": [{ "messaging": [{
                "sender": { "id": "IGSID-1" },
                "recipient": { "id": "IG-BIZ" },
                "message": { "text": "   " }
            }]}]
        });
        assert!(matches!(
            decode_meta(whitespace.to_string().as_bytes()).unwrap(),
            Decoded::Ignorable(_)
        ));
    }

    #[test]
    fn receipts_and_statuses_are_ignorable() {
        let delivery = serde_json::json!({
            "object": "page",
            "entry": [{ "messaging": [{
                "sender": { "id": "PSID-1" },
                "recipient": { "id": "PAGE1" },
                "delivery": { "watermark": 1 }
            }]}]
        });
        assert!(matches!(
            decode_meta(delivery.to_string().as_bytes()).unwrap(),
            Decoded::Ignorable(_)
        ));

        let status = serde_json::json!({
            "object": "whatsapp_business_account",
            "entry": [{ "changes": [{ "value": {
                "metadata": { "phone_number_id": "WA1" },
                "statuses": [{ "status": "read" }]
            }}]}]
        });
        assert!(matches!(
            decode_meta(status.to_string().as_bytes()).unwrap(),
            Decoded::Ignorable(_)
        ));

        let echo = serde_json::json!({
            "object": "page",
            "entry": [{ "messaging": [{
                "sender": { "id": "PAGE1" },
                "recipient": { "id": "PSID-1" },
                "message": { "text": "our reply", "is_echo": true }
            }]}]
        });
        assert!(matches!(
            decode_meta(echo.to_string().as_bytes()).unwrap(),
            Decoded::Ignorable(_)
        ));
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        assert!(matches!(decode_meta(b"not json"), Err(RelayError::Parse(_))));
    }

    #[tokio::test]
    async fn messenger_send_uses_page_endpoint_and_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v18.0/PAGE1/messages"))
            .and(query_param("access_token", "token-abc"))
            .and(body_json(serde_json::json!({
                "recipient": { "id": "PSID-1" },
                "message": { "text": "Thanks!" }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "recipient_id": "PSID-1",
                "message_id": "mid.1"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let sender = MessengerSender::new(Client::new(), Channel::Facebook, &meta_config(&server.uri()));
        let result = sender.send(&meta_tenant(), "PSID-1", "Thanks!").await.unwrap();
        assert_eq!(result.channel, Channel::Facebook);
        assert_eq!(result.data["message_id"], "mid.1");
    }

    #[tokio::test]
    async fn whatsapp_send_uses_bearer_and_envelope() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v18.0/WA1/messages"))
            .and(header("authorization", "Bearer token-abc"))
            .and(body_json(serde_json::json!({
                "messaging_product": "whatsapp",
                "to": "15550001111",
                "type": "text",
                "text": { "body": "Hi" }
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "messages": [{ "id": "wamid.1" }] })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let sender = WhatsAppSender::new(Client::new(), &meta_config(&server.uri()));
        let result = sender.send(&meta_tenant(), "15550001111", "Hi").await.unwrap();
        assert_eq!(result.channel, Channel::Whatsapp);
    }

    #[tokio::test]
    async fn graph_error_object_is_a_send_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": { "message": "Invalid OAuth access token.", "code": 190 }
            })))
            .mount(&server)
            .await;

        let sender = WhatsAppSender::new(Client::new(), &meta_config(&server.uri()));
        let err = sender.send(&meta_tenant(), "15550001111", "Hi").await.unwrap_err();
        assert_eq!(err.to_string(), "WhatsApp: Invalid OAuth access token.");
    }

    #[tokio::test]
    async fn missing_ids_fail_with_channel_specific_messages() {
        let tenant = TenantIntegration::new(Uuid::new_v4());
        let config = meta_config("http://127.0.0.1:9");

        let messenger = MessengerSender::new(Client::new(), Channel::Instagram, &config);
        let err = messenger.send(&tenant, "x", "y").await.unwrap_err();
        assert_eq!(err.to_string(), "Meta page id missing");

        let whatsapp = WhatsAppSender::new(Client::new(), &config);
        let err = whatsapp.send(&tenant, "x", "y").await.unwrap_err();
        assert_eq!(err.to_string(), "WhatsApp phone id missing");
    }
}
