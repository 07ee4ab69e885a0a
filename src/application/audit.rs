//! Security audit trail
//!
//! [`AuditTrail::record`] never blocks the caller: events go onto a bounded
//! queue drained by a single writer task into the [`SecurityEventLog`]. When
//! the queue is full the event is dropped and counted.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use super::auth::{AuthError, AuthResult};
use crate::domain::{SecurityEvent, SecurityEventLog};
use crate::shared::with_deadline;

const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Upper bound on events returned by one [`AuditTrail::recent`] call.
pub const MAX_RECENT_EVENTS: u64 = 1000;

#[derive(Clone)]
pub struct AuditTrail {
    sender: mpsc::Sender<SecurityEvent>,
    log: Arc<dyn SecurityEventLog>,
    storage_timeout: Duration,
}

impl AuditTrail {
    /// Spawn the writer task. It exits once every clone of the returned trail
    /// is dropped and the queue has drained.
    pub fn start(
        log: Arc<dyn SecurityEventLog>,
        storage_timeout: Duration,
    ) -> (Self, JoinHandle<()>) {
        Self::with_capacity(log, storage_timeout, DEFAULT_QUEUE_CAPACITY)
    }

    pub fn with_capacity(
        log: Arc<dyn SecurityEventLog>,
        storage_timeout: Duration,
        capacity: usize,
    ) -> (Self, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let writer = tokio::spawn(write_events(log.clone(), receiver, storage_timeout));
        (
            Self {
                sender,
                log,
                storage_timeout,
            },
            writer,
        )
    }

    pub fn record(&self, event: SecurityEvent) {
        match self.sender.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                warn!(kind = %event.kind, "audit queue full; security event dropped");
                metrics::counter!("audit_events_dropped_total").increment(1);
            }
            Err(TrySendError::Closed(event)) => {
                debug!(kind = %event.kind, "audit writer stopped; security event dropped");
            }
        }
    }

    /// Newest events first, capped at [`MAX_RECENT_EVENTS`].
    pub async fn recent(&self, limit: u64) -> AuthResult<Vec<SecurityEvent>> {
        let limit = limit.clamp(1, MAX_RECENT_EVENTS);
        with_deadline(
            "security_event_log.recent",
            self.storage_timeout,
            self.log.recent(limit),
        )
        .await
        .map_err(AuthError::from)
        .and_then(|res| res.map_err(AuthError::from))
        .inspect_err(|e| error!(error = %e, "security event query failed"))
    }

    pub fn log(&self) -> Arc<dyn SecurityEventLog> {
        self.log.clone()
    }
}

async fn write_events(
    log: Arc<dyn SecurityEventLog>,
    mut receiver: mpsc::Receiver<SecurityEvent>,
    storage_timeout: Duration,
) {
    while let Some(event) = receiver.recv().await {
        let kind = event.kind;
        match with_deadline("security_event_log.append", storage_timeout, log.append(event)).await {
            Ok(Ok(())) => {
                metrics::counter!("audit_events_total", "type" => kind.as_str()).increment(1);
            }
            Ok(Err(e)) => error!(error = %e, %kind, "failed to persist security event"),
            Err(e) => error!(error = %e, %kind, "security event write timed out"),
        }
    }
    debug!("Audit writer stopped");
}


#[cfg(test)]
mod tests {
    use super::test_support::wait_for_events;
    use super::*;
    use crate::domain::SecurityEventKind;
    use crate::infrastructure::memory::InMemorySecurityEventLog;

    #[tokio::test]
    async fn recorded_events_reach_the_log() {
        let log = Arc::new(InMemorySecurityEventLog::new());
        let (trail, writer) = AuditTrail::start(log.clone(), Duration::from_secs(1));

        trail.record(SecurityEvent::new(SecurityEventKind::LoginFailed, "one"));
        trail.record(SecurityEvent::new(SecurityEventKind::Logout, "two").by_user("u1"));

        let events = wait_for_events(log.as_ref(), 2).await;
        assert_eq!(events.len(), 2);
        assert_eq!(trail.recent(1).await.unwrap().len(), 1);

        drop(trail);
        tokio::time::timeout(Duration::from_secs(1), writer)
            .await
            .expect("writer exits once the trail is dropped")
            .unwrap();
    }

    #[tokio::test]
    async fn full_queue_drops_instead_of_blocking() {
        let log = Arc::new(InMemorySecurityEventLog::new());
        let (trail, _writer) = AuditTrail::with_capacity(log.clone(), Duration::from_secs(1), 1);

        // The current-thread writer cannot run until this test yields.
        for i in 0..10 {
            trail.record(SecurityEvent::new(SecurityEventKind::AccessDenied, format!("#{i}")));
        }

        let events = wait_for_events(log.as_ref(), 1).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(events.len(), 1);
        assert_eq!(log.len(), 1);
    }
}
