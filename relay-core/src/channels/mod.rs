//! Channel adapters: inbound payload decoders and outbound provider senders.

pub mod meta;
pub mod sms;
pub mod voice;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use crate::config::RelayConfig;
use crate::error::RelayError;
use crate::models::{Channel, InboundEvent, TenantIntegration};

pub use meta::{MessengerSender, WhatsAppSender, WebhookVerifyQuery, META_ACK};
pub use sms::{TwilioSender, SMS_ACK};
pub use voice::{GatherSpec, VoiceMarkup};

/// Result of decoding a provider payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    Event(InboundEvent),
    /// Well-formed but carries no message (receipts, echoes, status updates).
    Ignorable(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct SendResult {
    pub channel: Channel,
    /// Provider response body.
    pub data: serde_json::Value,
}

#[async_trait]
pub trait OutboundChannel: Send + Sync {
    /// Deliver `body` to `to` using the tenant's credentials for this channel.
    async fn send(
        &self,
        tenant: &TenantIntegration,
        to: &str,
        body: &str,
    ) -> Result<SendResult, RelayError>;

    fn name(&self) -> &str;
}

/// The provider senders, one per outbound-capable channel.
pub struct ChannelSenders {
    pub sms: Box<dyn OutboundChannel>,
    pub facebook: Box<dyn OutboundChannel>,
    pub instagram: Box<dyn OutboundChannel>,
    pub whatsapp: Box<dyn OutboundChannel>,
}

impl ChannelSenders {
    pub fn from_config(client: Client, config: &RelayConfig) -> Self {
        Self {
            sms: Box::new(TwilioSender::new(client.clone(), config.twilio.base_url.clone())),
            facebook: Box::new(MessengerSender::new(
                client.clone(),
                Channel::Facebook,
                &config.meta,
            )),
            instagram: Box::new(MessengerSender::new(
                client.clone(),
                Channel::Instagram,
                &config.meta,
            )),
            whatsapp: Box::new(WhatsAppSender::new(client, &config.meta)),
        }
    }

    /// Voice has no outbound text API.
    pub fn for_channel(&self, channel: Channel) -> Option<&dyn OutboundChannel> {
        match channel {
            Channel::Sms => Some(self.sms.as_ref()),
            Channel::Facebook => Some(self.facebook.as_ref()),
            Channel::Instagram => Some(self.instagram.as_ref()),
            Channel::Whatsapp => Some(self.whatsapp.as_ref()),
            Channel::Voice => None,
        }
    }
}

pub(crate) fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

pub(crate) fn required_field<'a>(
    form: &'a std::collections::HashMap<String, String>,
    name: &str,
) -> Option<&'a str> {
    form.get(name).map(|v| v.trim()).filter(|v| !v.is_empty())
}
