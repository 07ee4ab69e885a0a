use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::domain::{DomainResult, SecurityEvent, SecurityEventLog};

/// In-memory security event log
#[derive(Default)]
pub struct InMemorySecurityEventLog {
    events: DashMap<String, SecurityEvent>,
}

impl InMemorySecurityEventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[async_trait]
impl SecurityEventLog for InMemorySecurityEventLog {
    async fn append(&self, event: SecurityEvent) -> DomainResult<()> {
        self.events.insert(event.id.clone(), event);
        Ok(())
    }

    async fn recent(&self, limit: u64) -> DomainResult<Vec<SecurityEvent>> {
        let mut events: Vec<SecurityEvent> = self.events.iter().map(|e| e.value().clone()).collect();
        events.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        events.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        Ok(events)
    }

    async fn purge_before(&self, before: DateTime<Utc>) -> DomainResult<u64> {
        let mut purged = 0u64;
        self.events.retain(|_, e| {
            let keep = e.created_at >= before;
            if !keep {
                purged += 1;
            }
            keep
        });
        Ok(purged)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::domain::SecurityEventKind;

    fn event_at(kind: SecurityEventKind, at: DateTime<Utc>) -> SecurityEvent {
        SecurityEvent {
            created_at: at,
            ..SecurityEvent::new(kind, kind.as_str())
        }
    }

    #[tokio::test]
    async fn recent_is_newest_first_and_limited() {
        let log = InMemorySecurityEventLog::new();
        let now = Utc::now();
        log.append(event_at(SecurityEventKind::LoginFailed, now - Duration::minutes(2)))
            .await
            .unwrap();
        log.append(event_at(SecurityEventKind::LoginSuccess, now - Duration::minutes(1)))
            .await
            .unwrap();
        log.append(event_at(SecurityEventKind::Logout, now)).await.unwrap();

        let recent = log.recent(2).await.unwrap();
        let kinds: Vec<_> = recent.iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![SecurityEventKind::Logout, SecurityEventKind::LoginSuccess]
        );
    }

    #[tokio::test]
    async fn purge_drops_only_old_events() {
        let log = InMemorySecurityEventLog::new();
        let now = Utc::now();
        log.append(event_at(SecurityEventKind::AccessDenied, now - Duration::days(40)))
            .await
            .unwrap();
        log.append(event_at(SecurityEventKind::AccessDenied, now)).await.unwrap();

        assert_eq!(log.purge_before(now - Duration::days(30)).await.unwrap(), 1);
        assert_eq!(log.len(), 1);
    }
}
