//! Audit event recording.
//!
//! Audit logging is an observability concern: a failed write must never
//! become an availability problem for the request that produced the event.

use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::models::AuditEvent;
use crate::services::store::AccessStore;

#[derive(Clone)]
pub struct AuditRecorder {
    store: Arc<dyn AccessStore>,
    /// Bounds concurrently in-flight detached writes so cancellation-path
    /// logging cannot leak unbounded background tasks.
    detached_budget: Arc<Semaphore>,
}

impl AuditRecorder {
    pub fn new(store: Arc<dyn AccessStore>, detached_write_budget: usize) -> Self {
        Self {
            store,
            detached_budget: Arc::new(Semaphore::new(detached_write_budget)),
        }
    }

    /// Write one audit event. Failures are logged and swallowed; this never
    /// raises to the caller.
    pub async fn record(&self, event: AuditEvent) {
        let event_type = event.event_type;
        match self.store.insert_audit_event(&event).await {
            Ok(()) => {
                tracing::debug!(event_type = event_type.as_str(), "Audit event recorded");
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    event_type = event_type.as_str(),
                    "Failed to write audit event"
                );
            }
        }
    }

    /// Best-effort fire-and-forget write, used when the request is being
    /// torn down and must not wait on the store. Drops the event when the
    /// background budget is exhausted.
    pub fn record_detached(&self, event: AuditEvent) {
        let permit = match Arc::clone(&self.detached_budget).try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                tracing::warn!(
                    event_type = event.event_type.as_str(),
                    "Detached audit budget exhausted, dropping event"
                );
                return;
            }
        };

        let store = Arc::clone(&self.store);
        tokio::spawn(async move {
            if let Err(e) = store.insert_audit_event(&event).await {
                tracing::error!(
                    error = %e,
                    event_type = event.event_type.as_str(),
                    "Failed to write detached audit event"
                );
            }
            drop(permit);
        });
    }
}
