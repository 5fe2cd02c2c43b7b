use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    #[default]
    Sms,
    Whatsapp,
    Facebook,
    Instagram,
    Voice,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Sms => "sms",
            Channel::Whatsapp => "whatsapp",
            Channel::Facebook => "facebook",
            Channel::Instagram => "instagram",
            Channel::Voice => "voice",
        }
    }

    /// Channels whose counterparty address is a phone number and is matched
    /// on its trailing digits rather than verbatim.
    pub fn is_phone_addressed(&self) -> bool {
        matches!(self, Channel::Sms | Channel::Voice | Channel::Whatsapp)
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Channel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sms" => Ok(Channel::Sms),
            "whatsapp" => Ok(Channel::Whatsapp),
            "facebook" => Ok(Channel::Facebook),
            "instagram" => Ok(Channel::Instagram),
            "voice" => Ok(Channel::Voice),
            other => Err(format!("unknown channel '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationStatus {
    New,
    Replied,
    Booked,
}

impl ConversationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversationStatus::New => "new",
            ConversationStatus::Replied => "replied",
            ConversationStatus::Booked => "booked",
        }
    }
}

impl FromStr for ConversationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(ConversationStatus::New),
            "replied" => Ok(ConversationStatus::Replied),
            "booked" => Ok(ConversationStatus::Booked),
            other => Err(format!("unknown conversation status '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    pub tenant_id: Uuid,
    /// Counterparty address as first seen (phone number or platform-scoped user id).
    pub address: String,
    /// Normalized form of `address` used for matching.
    pub address_key: String,
    pub channel: Channel,
    pub client_name: String,
    pub last_message: Option<String>,
    pub last_message_at: DateTime<Utc>,
    pub status: ConversationStatus,
    pub created_at: DateTime<Utc>,
}

/// Find-or-create input for a conversation thread.
#[derive(Debug, Clone)]
pub struct ConversationUpsert {
    pub tenant_id: Uuid,
    pub address: String,
    pub address_key: String,
    pub channel: Channel,
    pub client_name: String,
    pub seed_text: String,
}

#[derive(Debug, Clone)]
pub struct UpsertOutcome {
    pub conversation: Conversation,
    pub created: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_round_trips_through_str() {
        for channel in [
            Channel::Sms,
            Channel::Whatsapp,
            Channel::Facebook,
            Channel::Instagram,
            Channel::Voice,
        ] {
            assert_eq!(channel.as_str().parse::<Channel>().unwrap(), channel);
        }
        assert!("telegram".parse::<Channel>().is_err());
    }

    #[test]
    fn channel_serializes_lowercase() {
        let json = serde_json::to_string(&Channel::Instagram).unwrap();
        assert_eq!(json, "\"instagram\"");
        let parsed: Channel = serde_json::from_str("\"whatsapp\"").unwrap();
        assert_eq!(parsed, Channel::Whatsapp);
    }

    #[test]
    fn phone_addressed_channels() {
        assert!(Channel::Sms.is_phone_addressed());
        assert!(Channel::Voice.is_phone_addressed());
        assert!(Channel::Whatsapp.is_phone_addressed());
        assert!(!Channel::Facebook.is_phone_addressed());
        assert!(!Channel::Instagram.is_phone_addressed());
    }
}
