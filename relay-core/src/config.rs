use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct RelayConfig {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub meta: MetaConfig,
    #[serde(default)]
    pub twilio: TwilioConfig,
    #[serde(default)]
    pub ai: AiConfig,
    #[serde(default)]
    pub voice: VoiceConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub trainer: TrainerConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServiceConfig {
    pub log_level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Postgres,
    #[default]
    Memory,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    #[serde(default)]
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// JSON list of tenant records loaded into the memory backend at startup.
    #[serde(default)]
    pub seed_file: Option<String>,
}

fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            url: String::new(),
            max_connections: default_max_connections(),
            seed_file: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8787,
        }
    }
}

/// Credentials for trusted internal callers (other services, the dispatch worker).
#[derive(Debug, Deserialize, Clone, Default)]
pub struct AuthConfig {
    #[serde(default)]
    pub service_key: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MetaConfig {
    pub verify_token: String,
    pub graph_base_url: String,
    pub graph_api_version: String,
}

impl Default for MetaConfig {
    fn default() -> Self {
        Self {
            verify_token: "localai".to_string(),
            graph_base_url: "https://graph.facebook.com".to_string(),
            graph_api_version: "v18.0".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TwilioConfig {
    pub base_url: String,
}

impl Default for TwilioConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.twilio.com/2010-04-01".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AiConfig {
    pub model: String,
    pub base_url: String,
    pub max_retries: usize,
    pub retry_delay_ms: u64,
    pub text_history_limit: usize,
    pub voice_history_limit: usize,
    pub text_max_output_tokens: u32,
    pub voice_max_output_tokens: u32,
    pub learner_max_output_tokens: u32,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            model: "gemini-2.5-flash".to_string(),
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            max_retries: 1,
            retry_delay_ms: 250,
            text_history_limit: 10,
            voice_history_limit: 5,
            text_max_output_tokens: 200,
            voice_max_output_tokens: 150,
            learner_max_output_tokens: 1024,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct VoiceConfig {
    /// Where the telephony provider posts each speech transcript.
    pub action_url: String,
    pub default_voice: String,
    pub language: String,
    pub pause_seconds: u32,
    pub default_greeting: String,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            action_url: "/webhooks/voice/turn".to_string(),
            default_voice: "Polly.Joanna".to_string(),
            language: "en-US".to_string(),
            pause_seconds: 10,
            default_greeting: "Thanks for calling. How can I help you today?".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DispatchConfig {
    pub queue_capacity: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self { queue_capacity: 256 }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TrainerConfig {
    pub max_body_chars: usize,
    pub user_agent: String,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            max_body_chars: 2000,
            user_agent: "Mozilla/5.0 (compatible; RelayBot/1.0)".to_string(),
        }
    }
}

impl RelayConfig {
    /// Load from a TOML file, with `RELAY__SECTION__KEY` environment overrides.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name(path))
            .add_source(Environment::with_prefix("RELAY").separator("__"))
            .build()?;
        s.try_deserialize()
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::from_str(raw, FileFormat::Toml))
            .build()?;
        s.try_deserialize()
    }
}
