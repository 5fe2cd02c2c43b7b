use std::sync::Arc;

use relay_core::channels::ChannelSenders;
use relay_core::{GenerativeBackend, RelayConfig, RelayStore};
use tokio::sync::mpsc;

use crate::subsystems::events::EventHub;
use crate::worker::{DispatchJob, Dispatcher};

/// Everything a handler or background job needs, passed explicitly.
pub struct RelayState {
    pub config: RelayConfig,
    pub store: Arc<dyn RelayStore>,
    pub model: Arc<dyn GenerativeBackend>,
    pub channels: ChannelSenders,
    /// Shared client for page fetches and provider calls.
    pub http: reqwest::Client,
    pub dispatcher: Dispatcher,
    pub events: EventHub,
}

impl RelayState {
    /// Build the state and the receiving end of its dispatch queue, which
    /// the caller hands to [`crate::worker::run_dispatch_worker`].
    pub fn new(
        config: RelayConfig,
        store: Arc<dyn RelayStore>,
        model: Arc<dyn GenerativeBackend>,
        http: reqwest::Client,
    ) -> (Self, mpsc::Receiver<DispatchJob>) {
        let (dispatcher, jobs) = Dispatcher::new(config.dispatch.queue_capacity);
        let channels = ChannelSenders::from_config(http.clone(), &config);
        let state = Self {
            config,
            store,
            model,
            channels,
            http,
            dispatcher,
            events: EventHub::new(),
        };
        (state, jobs)
    }
}
