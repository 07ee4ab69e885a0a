//! Background sweeper
//!
//! Periodically drops idle rate-limiter windows and lapsed bans, purges
//! session ledger rows that expired more than one session timeout ago, and
//! trims the security audit trail to its retention period.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::application::auth::RateLimiter;
use crate::domain::{SecurityEventLog, SessionLedger};
use crate::shared::ShutdownSignal;

#[derive(Debug, Clone)]
pub struct HousekeepingConfig {
    pub interval: Duration,
    /// Ledger rows are kept this long past their expiry for auditing.
    pub session_retention: chrono::Duration,
    /// Security events older than this are deleted. `None` keeps them forever.
    pub audit_retention: Option<chrono::Duration>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub windows_evicted: usize,
    pub sessions_purged: u64,
    pub events_purged: u64,
}

pub struct Housekeeper {
    limiter: Arc<RateLimiter>,
    sessions: Arc<dyn SessionLedger>,
    audit: Option<Arc<dyn SecurityEventLog>>,
    config: HousekeepingConfig,
}

impl Housekeeper {
    pub fn new(
        limiter: Arc<RateLimiter>,
        sessions: Arc<dyn SessionLedger>,
        config: HousekeepingConfig,
    ) -> Self {
        Self {
            limiter,
            sessions,
            audit: None,
            config,
        }
    }

    pub fn with_audit_log(mut self, audit: Arc<dyn SecurityEventLog>) -> Self {
        self.audit = Some(audit);
        self
    }

    /// One pass. Ledger failures are logged and do not stop the sweeper.
    pub async fn sweep(&self) -> SweepReport {
        let windows_evicted = self.limiter.evict_idle();
        let cutoff = Utc::now() - self.config.session_retention;
        let sessions_purged = match self.sessions.purge_expired(cutoff).await {
            Ok(n) => n,
            Err(e) => {
                warn!(error = %e, "Session purge failed");
                0
            }
        };
        let events_purged = match (&self.audit, self.config.audit_retention) {
            (Some(audit), Some(retention)) => {
                match audit.purge_before(Utc::now() - retention).await {
                    Ok(n) => n,
                    Err(e) => {
                        warn!(error = %e, "Security event purge failed");
                        0
                    }
                }
            }
            _ => 0,
        };
        let report = SweepReport {
            windows_evicted,
            sessions_purged,
            events_purged,
        };
        debug!(?report, tracked_keys = self.limiter.tracked_keys(), "Housekeeping sweep");
        report
    }

    /// Run until `shutdown` fires. Each pass runs as its own task so a
    /// panicking sweep is logged and the next tick still runs.
    pub fn start(self, shutdown: ShutdownSignal) -> tokio::task::JoinHandle<()> {
        let keeper = Arc::new(self);
        tokio::spawn(async move {
            info!(interval_secs = keeper.config.interval.as_secs(), "Housekeeping started");
            let mut interval = tokio::time::interval(keeper.config.interval);
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let pass = keeper.clone();
                        if let Err(e) = tokio::spawn(async move { pass.sweep().await }).await {
                            error!(error = %e, "Housekeeping sweep aborted");
                        }
                    }
                    _ = shutdown.wait() => break,
                }
            }
            info!("Housekeeping stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use chrono::DateTime;

    use super::*;
    use crate::application::auth::RateLimitConfig;
    use crate::domain::{DomainResult, Session};
    use crate::infrastructure::memory::InMemorySessionLedger;

    /// Ledger whose first purge panics.
    #[derive(Default)]
    struct FlakyLedger {
        inner: InMemorySessionLedger,
        purges: AtomicUsize,
    }

    #[async_trait]
    impl SessionLedger for FlakyLedger {
        async fn open(
            &self,
            user_id: &str,
            ip_address: &str,
            user_agent: &str,
            created_at: DateTime<Utc>,
            expires_at: DateTime<Utc>,
        ) -> DomainResult<String> {
            self.inner
                .open(user_id, ip_address, user_agent, created_at, expires_at)
                .await
        }
        async fn close(&self, session_id: &str) -> DomainResult<()> {
            self.inner.close(session_id).await
        }
        async fn close_all_for_user(&self, user_id: &str) -> DomainResult<u64> {
            self.inner.close_all_for_user(user_id).await
        }
        async fn get(&self, session_id: &str) -> DomainResult<Option<Session>> {
            self.inner.get(session_id).await
        }
        async fn list_live(&self, user_id: &str, now: DateTime<Utc>) -> DomainResult<Vec<Session>> {
            self.inner.list_live(user_id, now).await
        }
        async fn count_online_users(&self, now: DateTime<Utc>) -> DomainResult<u64> {
            self.inner.count_online_users(now).await
        }
        async fn purge_expired(&self, before: DateTime<Utc>) -> DomainResult<u64> {
            if self.purges.fetch_add(1, Ordering::SeqCst) == 0 {
                panic!("first purge fails");
            }
            self.inner.purge_expired(before).await
        }
    }

    #[tokio::test]
    async fn sweep_purges_long_expired_sessions() {
        let ledger = Arc::new(InMemorySessionLedger::new());
        let now = Utc::now();
        ledger
            .open("u1", "ip", "ua", now - chrono::Duration::hours(5), now - chrono::Duration::hours(4))
            .await
            .unwrap();
        let live = ledger
            .open("u1", "ip", "ua", now, now + chrono::Duration::hours(1))
            .await
            .unwrap();

        let limiter = Arc::new(RateLimiter::new(RateLimitConfig::default()));
        let keeper = Housekeeper::new(
            limiter,
            ledger.clone(),
            HousekeepingConfig {
                interval: Duration::from_secs(60),
                session_retention: chrono::Duration::hours(1),
                audit_retention: None,
            },
        );

        let report = keeper.sweep().await;
        assert_eq!(report.sessions_purged, 1);
        assert_eq!(ledger.len(), 1);
        assert!(ledger.get(&live).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn sweep_trims_audit_trail() {
        use crate::domain::{SecurityEvent, SecurityEventKind};
        use crate::infrastructure::memory::InMemorySecurityEventLog;

        let log = Arc::new(InMemorySecurityEventLog::new());
        log.append(SecurityEvent {
            created_at: Utc::now() - chrono::Duration::days(31),
            ..SecurityEvent::new(SecurityEventKind::LoginFailed, "old")
        })
        .await
        .unwrap();
        log.append(SecurityEvent::new(SecurityEventKind::LoginFailed, "new"))
            .await
            .unwrap();

        let keeper = Housekeeper::new(
            Arc::new(RateLimiter::new(RateLimitConfig::default())),
            Arc::new(InMemorySessionLedger::new()),
            HousekeepingConfig {
                interval: Duration::from_secs(60),
                session_retention: chrono::Duration::hours(1),
                audit_retention: Some(chrono::Duration::days(30)),
            },
        )
        .with_audit_log(log.clone());

        assert_eq!(keeper.sweep().await.events_purged, 1);
        assert_eq!(log.len(), 1);
    }

    #[tokio::test]
    async fn stops_on_shutdown() {
        let keeper = Housekeeper::new(
            Arc::new(RateLimiter::new(RateLimitConfig::default())),
            Arc::new(InMemorySessionLedger::new()),
            HousekeepingConfig {
                interval: Duration::from_millis(10),
                session_retention: chrono::Duration::hours(1),
                audit_retention: None,
            },
        );
        let shutdown = ShutdownSignal::new();
        let handle = keeper.start(shutdown.clone());
        tokio::time::sleep(Duration::from_millis(30)).await;
        shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("housekeeper must stop")
            .unwrap();
    }

    #[tokio::test]
    async fn keeps_sweeping_after_a_panicking_pass() {
        let ledger = Arc::new(FlakyLedger::default());
        let keeper = Housekeeper::new(
            Arc::new(RateLimiter::new(RateLimitConfig::default())),
            ledger.clone(),
            HousekeepingConfig {
                interval: Duration::from_millis(10),
                session_retention: chrono::Duration::hours(1),
                audit_retention: None,
            },
        );
        let shutdown = ShutdownSignal::new();
        let handle = keeper.start(shutdown.clone());

        tokio::time::timeout(Duration::from_secs(5), async {
            while ledger.purges.load(Ordering::SeqCst) < 3 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("sweeps continue after a panic");
        assert!(!handle.is_finished());

        shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
