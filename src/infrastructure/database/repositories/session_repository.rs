use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::prelude::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};

use crate::domain::{DomainError, DomainResult, Session, SessionLedger};
use crate::infrastructure::database::entities::user_session;

pub struct SessionRepository {
    db: DatabaseConnection,
}

impl SessionRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

fn session_model_to_domain(model: user_session::Model) -> Session {
    Session {
        id: model.id,
        user_id: model.user_id,
        ip_address: model.ip_address,
        user_agent: model.user_agent,
        created_at: model.created_at,
        expires_at: model.expires_at,
        ended_at: model.ended_at,
    }
}

fn db_err(e: sea_orm::DbErr) -> DomainError {
    DomainError::Storage(format!("Database error: {}", e))
}

#[async_trait]
impl SessionLedger for SessionRepository {
    async fn open(
        &self,
        user_id: &str,
        ip_address: &str,
        user_agent: &str,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> DomainResult<String> {
        let session = Session::new(user_id, ip_address, user_agent, created_at, expires_at);
        let id = session.id.clone();

        user_session::ActiveModel {
            id: Set(session.id),
            user_id: Set(session.user_id),
            ip_address: Set(session.ip_address),
            user_agent: Set(session.user_agent),
            created_at: Set(session.created_at),
            expires_at: Set(session.expires_at),
            ended_at: Set(None),
        }
        .insert(&self.db)
        .await
        .map_err(db_err)?;

        Ok(id)
    }

    async fn close(&self, session_id: &str) -> DomainResult<()> {
        // First close wins; later closes match no row.
        user_session::Entity::update_many()
            .col_expr(user_session::Column::EndedAt, Expr::value(Utc::now()))
            .filter(user_session::Column::Id.eq(session_id))
            .filter(user_session::Column::EndedAt.is_null())
            .exec(&self.db)
            .await
            .map_err(db_err)?;

        Ok(())
    }

    async fn close_all_for_user(&self, user_id: &str) -> DomainResult<u64> {
        let result = user_session::Entity::update_many()
            .col_expr(user_session::Column::EndedAt, Expr::value(Utc::now()))
            .filter(user_session::Column::UserId.eq(user_id))
            .filter(user_session::Column::EndedAt.is_null())
            .exec(&self.db)
            .await
            .map_err(db_err)?;

        Ok(result.rows_affected)
    }

    async fn get(&self, session_id: &str) -> DomainResult<Option<Session>> {
        let model = user_session::Entity::find_by_id(session_id)
            .one(&self.db)
            .await
            .map_err(db_err)?;

        Ok(model.map(session_model_to_domain))
    }

    async fn list_live(&self, user_id: &str, now: DateTime<Utc>) -> DomainResult<Vec<Session>> {
        let models = user_session::Entity::find()
            .filter(user_session::Column::UserId.eq(user_id))
            .filter(user_session::Column::EndedAt.is_null())
            .filter(user_session::Column::ExpiresAt.gt(now))
            .order_by_desc(user_session::Column::CreatedAt)
            .all(&self.db)
            .await
            .map_err(db_err)?;

        Ok(models.into_iter().map(session_model_to_domain).collect())
    }

    async fn count_online_users(&self, now: DateTime<Utc>) -> DomainResult<u64> {
        let user_ids: Vec<String> = user_session::Entity::find()
            .select_only()
            .column(user_session::Column::UserId)
            .distinct()
            .filter(user_session::Column::EndedAt.is_null())
            .filter(user_session::Column::ExpiresAt.gt(now))
            .into_tuple()
            .all(&self.db)
            .await
            .map_err(db_err)?;

        Ok(user_ids.len() as u64)
    }

    async fn purge_expired(&self, before: DateTime<Utc>) -> DomainResult<u64> {
        let result = user_session::Entity::delete_many()
            .filter(user_session::Column::ExpiresAt.lt(before))
            .exec(&self.db)
            .await
            .map_err(db_err)?;

        Ok(result.rows_affected)
    }
}
