use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::Channel;

pub const PROTOCOL_VERSION: &str = "relay/1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReplyAction {
    /// Generate text only.
    #[default]
    Reply,
    /// Generate, persist and deliver to the counterparty.
    ReplyAndSend,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateReplyRequest {
    pub conversation_id: Uuid,
    #[serde(default)]
    pub action: ReplyAction,
    /// Required for trusted internal callers; ignored for tenant callers.
    #[serde(default)]
    pub tenant_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendMessageRequest {
    pub to: String,
    pub body: String,
    #[serde(default)]
    pub channel: Channel,
    #[serde(default)]
    pub tenant_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TrainRequest {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub goal: Option<String>,
    #[serde(default)]
    pub tenant_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LearnRequest {
    #[serde(default)]
    pub user_question: String,
    #[serde(default)]
    pub admin_reply: String,
    #[serde(default)]
    pub tenant_id: Option<Uuid>,
}

/// Operator and internal requests handled by the router.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum RelayRequest {
    Health,
    Send(SendMessageRequest),
    Generate(GenerateReplyRequest),
    Train(TrainRequest),
    Learn(LearnRequest),
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RelayResponse {
    pub status: String,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
}

impl RelayResponse {
    pub fn ok(data: serde_json::Value) -> Self {
        Self {
            status: "ok".to_string(),
            data: Some(data),
            error: None,
        }
    }

    pub fn err(msg: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            data: None,
            error: Some(msg.into()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}
