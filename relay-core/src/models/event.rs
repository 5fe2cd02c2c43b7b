use super::conversation::Channel;

/// SMS webhook fields (`From`, `To`, `Body`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmsEvent {
    pub from: String,
    pub to: String,
    pub body: String,
}

/// A Messenger or Instagram Direct `messaging` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessengerEvent {
    pub sender_id: String,
    pub recipient_id: String,
    pub text: String,
}

/// A WhatsApp Business `messages[0]` entry with its `metadata.phone_number_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WhatsAppEvent {
    pub from: String,
    pub phone_number_id: String,
    pub text: String,
}

/// A voice webhook: call start (no transcript) or a dialog turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceEvent {
    pub from: String,
    pub to: String,
    pub speech_result: Option<String>,
}

impl VoiceEvent {
    pub fn transcript(&self) -> Option<&str> {
        self.speech_result
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

/// Decoded provider payload. Each provider decoder produces exactly one
/// variant; business logic never inspects raw payload shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    Sms(SmsEvent),
    Messenger(MessengerEvent),
    Instagram(MessengerEvent),
    WhatsApp(WhatsAppEvent),
    Voice(VoiceEvent),
}

/// Channel-neutral view of a text message, consumed once by the inbound pipeline.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub channel: Channel,
    /// Counterparty address.
    pub from: String,
    /// Tenant-side address the message was sent to.
    pub to: String,
    pub text: String,
}

impl InboundEvent {
    pub fn channel(&self) -> Channel {
        match self {
            InboundEvent::Sms(_) => Channel::Sms,
            InboundEvent::Messenger(_) => Channel::Facebook,
            InboundEvent::Instagram(_) => Channel::Instagram,
            InboundEvent::WhatsApp(_) => Channel::Whatsapp,
            InboundEvent::Voice(_) => Channel::Voice,
        }
    }

    /// Text channels normalize into an [`InboundMessage`]; voice turns are
    /// driven by the dialog loop instead and yield `None`.
    pub fn into_message(self) -> Option<InboundMessage> {
        let channel = self.channel();
        let (from, to, text) = match self {
            InboundEvent::Sms(e) => (e.from, e.to, e.body),
            InboundEvent::Messenger(e) | InboundEvent::Instagram(e) => {
                (e.sender_id, e.recipient_id, e.text)
            }
            InboundEvent::WhatsApp(e) => (e.from, e.phone_number_id, e.text),
            InboundEvent::Voice(_) => return None,
        };
        Some(InboundMessage {
            channel,
            from,
            to,
            text,
        })
    }
}
