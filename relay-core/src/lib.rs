pub mod address;
pub mod api;
pub mod channels;
pub mod config;
pub mod db;
pub mod error;
pub mod genai;
pub mod models;
pub mod store;

pub use config::RelayConfig;
pub use db::PgStore;
pub use error::RelayError;
pub use genai::{GeminiClient, GenerationError, GenerationRequest, GenerativeBackend, Role, Turn};
pub use store::{MemoryStore, RelayStore};
