pub mod auth;
pub mod http;
pub mod router;
pub mod state;
pub mod subsystems;
pub mod worker;

pub use state::RelayState;
