pub mod conversation;
pub mod event;
pub mod message;
pub mod tenant;

pub use conversation::{Channel, Conversation, ConversationStatus, ConversationUpsert, UpsertOutcome};
pub use event::{InboundEvent, InboundMessage, MessengerEvent, SmsEvent, VoiceEvent, WhatsAppEvent};
pub use message::{Message, Sender};
pub use tenant::{TenantAddress, TenantAiConfig, TenantIntegration};
