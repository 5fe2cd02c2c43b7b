use serde::Deserialize;
use uuid::Uuid;

/// One row per tenant: channel credentials, AI and voice configuration.
///
/// Written by the settings collaborator and the knowledge-base trainer;
/// read on every inbound and outbound operation.
#[derive(Debug, Clone, Default, Deserialize, sqlx::FromRow)]
pub struct TenantIntegration {
    pub tenant_id: Uuid,
    pub account_sid: Option<String>,
    pub auth_token: Option<String>,
    pub phone_number: Option<String>,
    pub meta_page_id: Option<String>,
    pub meta_access_token: Option<String>,
    pub whatsapp_phone_id: Option<String>,
    pub meta_instagram_id: Option<String>,
    pub ai_api_key: Option<String>,
    pub ai_context: Option<String>,
    pub business_goal: Option<String>,
    /// `None` means never configured, which still accepts calls.
    pub voice_enabled: Option<bool>,
    pub voice_id: Option<String>,
    pub voice_greeting: Option<String>,
    pub notification_phone: Option<String>,
    #[serde(default)]
    pub auto_pilot_enabled: bool,
    pub api_token: Option<String>,
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl TenantIntegration {
    pub fn new(tenant_id: Uuid) -> Self {
        Self {
            tenant_id,
            ..Default::default()
        }
    }

    pub fn accepts_voice(&self) -> bool {
        self.voice_enabled != Some(false)
    }

    pub fn ai_config(&self) -> TenantAiConfig {
        TenantAiConfig {
            api_key: present(&self.ai_api_key).map(str::to_string),
            knowledge_base: present(&self.ai_context).map(str::to_string),
            business_goal: present(&self.business_goal).map(str::to_string),
            notification_phone: present(&self.notification_phone).map(str::to_string),
        }
    }

    pub fn sms_credentials(&self) -> Option<(&str, &str, &str)> {
        Some((
            present(&self.account_sid)?,
            present(&self.auth_token)?,
            present(&self.phone_number)?,
        ))
    }

    pub fn page_id(&self) -> Option<&str> {
        present(&self.meta_page_id)
    }

    pub fn whatsapp_id(&self) -> Option<&str> {
        present(&self.whatsapp_phone_id)
    }

    pub fn access_token(&self) -> Option<&str> {
        present(&self.meta_access_token)
    }
}

/// The AI-facing slice of a tenant record.
#[derive(Debug, Clone, Default)]
pub struct TenantAiConfig {
    pub api_key: Option<String>,
    pub knowledge_base: Option<String>,
    pub business_goal: Option<String>,
    pub notification_phone: Option<String>,
}

/// Which tenant column an inbound address is looked up in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TenantAddress<'a> {
    /// `phone_number` (SMS and voice).
    Phone(&'a str),
    /// Any of `meta_page_id`, `whatsapp_phone_id`, `meta_instagram_id`.
    MetaId(&'a str),
}
