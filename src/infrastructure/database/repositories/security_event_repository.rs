use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};

use crate::domain::{DomainError, DomainResult, SecurityEvent, SecurityEventLog};
use crate::infrastructure::database::entities::security_event;

pub struct SecurityEventRepository {
    db: DatabaseConnection,
}

impl SecurityEventRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

fn db_err(e: sea_orm::DbErr) -> DomainError {
    DomainError::Storage(format!("Database error: {}", e))
}

fn event_model_to_domain(model: security_event::Model) -> DomainResult<SecurityEvent> {
    Ok(SecurityEvent {
        kind: model.event_type.parse().map_err(DomainError::Storage)?,
        severity: model.severity.parse().map_err(DomainError::Storage)?,
        id: model.id,
        message: model.message,
        user_id: model.user_id,
        ip_address: model.ip_address,
        user_agent: model.user_agent,
        created_at: model.created_at,
    })
}

#[async_trait]
impl SecurityEventLog for SecurityEventRepository {
    async fn append(&self, event: SecurityEvent) -> DomainResult<()> {
        security_event::ActiveModel {
            id: Set(event.id),
            event_type: Set(event.kind.as_str().to_string()),
            severity: Set(event.severity.as_str().to_string()),
            message: Set(event.message),
            user_id: Set(event.user_id),
            ip_address: Set(event.ip_address),
            user_agent: Set(event.user_agent),
            created_at: Set(event.created_at),
        }
        .insert(&self.db)
        .await
        .map_err(db_err)?;

        Ok(())
    }

    async fn recent(&self, limit: u64) -> DomainResult<Vec<SecurityEvent>> {
        security_event::Entity::find()
            .order_by_desc(security_event::Column::CreatedAt)
            .limit(limit)
            .all(&self.db)
            .await
            .map_err(db_err)?
            .into_iter()
            .map(event_model_to_domain)
            .collect()
    }

    async fn purge_before(&self, before: DateTime<Utc>) -> DomainResult<u64> {
        let result = security_event::Entity::delete_many()
            .filter(security_event::Column::CreatedAt.lt(before))
            .exec(&self.db)
            .await
            .map_err(db_err)?;

        Ok(result.rows_affected)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::domain::{SecurityEventKind, Severity};
    use crate::infrastructure::database::test_support::migrated_memory_db;

    #[tokio::test]
    async fn append_then_read_back_newest_first() {
        let repo = SecurityEventRepository::new(migrated_memory_db().await);
        let now = Utc::now();

        let older = SecurityEvent {
            created_at: now - Duration::minutes(5),
            ..SecurityEvent::new(SecurityEventKind::LoginFailed, "Login failed for user: eve")
                .from_client("203.0.113.7", "curl/8")
        };
        let newer = SecurityEvent {
            created_at: now,
            ..SecurityEvent::new(SecurityEventKind::LoginSuccess, "User logged in: admin")
                .by_user("user-1")
        };
        repo.append(older).await.unwrap();
        repo.append(newer).await.unwrap();

        let events = repo.recent(10).await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind, SecurityEventKind::LoginSuccess);
        assert_eq!(events[0].user_id.as_deref(), Some("user-1"));
        assert_eq!(events[1].severity, Severity::Warning);
        assert_eq!(events[1].ip_address, "203.0.113.7");

        assert_eq!(repo.recent(1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn purge_before_cutoff() {
        let repo = SecurityEventRepository::new(migrated_memory_db().await);
        let now = Utc::now();
        repo.append(SecurityEvent {
            created_at: now - Duration::days(60),
            ..SecurityEvent::new(SecurityEventKind::AccessDenied, "old")
        })
        .await
        .unwrap();
        repo.append(SecurityEvent::new(SecurityEventKind::AccessDenied, "new"))
            .await
            .unwrap();

        assert_eq!(repo.purge_before(now - Duration::days(30)).await.unwrap(), 1);
        assert_eq!(repo.recent(10).await.unwrap().len(), 1);
    }
}
