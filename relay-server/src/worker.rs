//! Background dispatch for work the webhook handlers must not wait on.
//!
//! Jobs are handed over through a bounded queue and each one runs as its own
//! task. Delivery is best effort: a full queue drops the job, a failed job is
//! logged and never retried.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use uuid::Uuid;

use crate::state::RelayState;
use crate::subsystems::{autopilot, gateway};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchJob {
    /// Generate a reply for the conversation and deliver it.
    AutoPilot { tenant_id: Uuid, conversation_id: Uuid },
    /// SMS notification to a tenant-configured phone.
    Notify { tenant_id: Uuid, to: String, body: String },
}

impl DispatchJob {
    fn kind(&self) -> &'static str {
        match self {
            DispatchJob::AutoPilot { .. } => "auto_pilot",
            DispatchJob::Notify { .. } => "notify",
        }
    }
}

#[derive(Clone)]
pub struct Dispatcher {
    tx: mpsc::Sender<DispatchJob>,
}

impl Dispatcher {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<DispatchJob>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Queue a job without waiting. Returns false when it was dropped.
    pub fn enqueue(&self, job: DispatchJob) -> bool {
        match self.tx.try_send(job) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(job)) => {
                tracing::warn!(job = job.kind(), "Dispatch queue full, dropping job");
                false
            }
            Err(mpsc::error::TrySendError::Closed(job)) => {
                tracing::warn!(job = job.kind(), "Dispatch worker stopped, dropping job");
                false
            }
        }
    }
}

pub async fn run_dispatch_worker(
    state: Arc<RelayState>,
    mut jobs: mpsc::Receiver<DispatchJob>,
    mut shutdown: broadcast::Receiver<()>,
) {
    tracing::info!("Dispatch worker started");

    loop {
        tokio::select! {
            job = jobs.recv() => {
                let Some(job) = job else { break };
                let state = state.clone();
                tokio::spawn(async move {
                    execute(&state, job).await;
                });
            }
            _ = shutdown.recv() => {
                tracing::info!("Dispatch worker shutting down...");
                break;
            }
        }
    }
}

async fn execute(state: &RelayState, job: DispatchJob) {
    let kind = job.kind();
    let result = match job {
        DispatchJob::AutoPilot { tenant_id, conversation_id } => {
            autopilot::run_auto_pilot(state, tenant_id, conversation_id).await
        }
        DispatchJob::Notify { tenant_id, to, body } => {
            gateway::send_notification(state, tenant_id, &to, &body).await
        }
    };

    if let Err(e) = result {
        tracing::error!(job = kind, error = %e, "Dispatch job failed");
    }
}
