use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::prelude::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};

use crate::domain::{CredentialStore, DomainError, DomainResult, User, UserRole};
use crate::infrastructure::database::entities::user;

pub struct UserRepository {
    db: DatabaseConnection,
}

impl UserRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

// ── Conversion helpers ──────────────────────────────────────────

fn entity_role_to_domain(role: user::UserRole) -> UserRole {
    match role {
        user::UserRole::Admin => UserRole::Admin,
        user::UserRole::Operator => UserRole::Operator,
        user::UserRole::Viewer => UserRole::Viewer,
    }
}

fn domain_role_to_entity(role: UserRole) -> user::UserRole {
    match role {
        UserRole::Admin => user::UserRole::Admin,
        UserRole::Operator => user::UserRole::Operator,
        UserRole::Viewer => user::UserRole::Viewer,
    }
}

fn user_model_to_domain(model: user::Model) -> User {
    User {
        id: model.id,
        username: model.username,
        email: model.email,
        password_hash: model.password_hash,
        role: entity_role_to_domain(model.role),
        is_active: model.is_active,
        created_at: model.created_at,
        updated_at: model.updated_at,
        last_login_at: model.last_login_at,
    }
}

fn db_err(e: sea_orm::DbErr) -> DomainError {
    DomainError::Storage(format!("Database error: {}", e))
}

fn write_err(e: sea_orm::DbErr) -> DomainError {
    let msg = e.to_string();
    if msg.contains("UNIQUE") || msg.contains("duplicate") {
        DomainError::Conflict("Username or email already exists".to_string())
    } else {
        db_err(e)
    }
}

// ── Repository implementation ───────────────────────────────────

#[async_trait]
impl CredentialStore for UserRepository {
    async fn find_by_username(&self, username: &str) -> DomainResult<Option<User>> {
        let model = user::Entity::find()
            .filter(user::Column::Username.eq(username))
            .one(&self.db)
            .await
            .map_err(db_err)?;

        Ok(model.map(user_model_to_domain))
    }

    async fn find_by_id(&self, id: &str) -> DomainResult<Option<User>> {
        let model = user::Entity::find_by_id(id)
            .one(&self.db)
            .await
            .map_err(db_err)?;

        Ok(model.map(user_model_to_domain))
    }

    async fn insert(&self, u: User) -> DomainResult<User> {
        let new_user = user::ActiveModel {
            id: Set(u.id),
            username: Set(u.username),
            email: Set(u.email.to_lowercase()),
            password_hash: Set(u.password_hash),
            role: Set(domain_role_to_entity(u.role)),
            is_active: Set(u.is_active),
            created_at: Set(u.created_at),
            updated_at: Set(u.updated_at),
            last_login_at: Set(u.last_login_at),
        };

        let inserted = new_user.insert(&self.db).await.map_err(write_err)?;
        Ok(user_model_to_domain(inserted))
    }

    async fn update(&self, u: User) -> DomainResult<User> {
        let existing = user::Entity::find_by_id(&u.id)
            .one(&self.db)
            .await
            .map_err(db_err)?
            .ok_or_else(|| DomainError::user_not_found(&u.id))?;

        // username is immutable; everything else follows the domain record
        let mut active: user::ActiveModel = existing.into();
        active.email = Set(u.email.to_lowercase());
        active.password_hash = Set(u.password_hash);
        active.role = Set(domain_role_to_entity(u.role));
        active.is_active = Set(u.is_active);
        active.updated_at = Set(u.updated_at);
        active.last_login_at = Set(u.last_login_at);

        let updated = active.update(&self.db).await.map_err(write_err)?;
        Ok(user_model_to_domain(updated))
    }

    async fn list(&self) -> DomainResult<Vec<User>> {
        let models = user::Entity::find()
            .order_by_desc(user::Column::CreatedAt)
            .all(&self.db)
            .await
            .map_err(db_err)?;

        Ok(models.into_iter().map(user_model_to_domain).collect())
    }

    async fn record_login(&self, user_id: &str, at: DateTime<Utc>) -> DomainResult<bool> {
        let result = user::Entity::update_many()
            .col_expr(user::Column::LastLoginAt, Expr::value(at))
            .col_expr(user::Column::UpdatedAt, Expr::value(at))
            .filter(user::Column::Id.eq(user_id))
            .filter(user::Column::IsActive.eq(true))
            .exec(&self.db)
            .await
            .map_err(db_err)?;

        Ok(result.rows_affected > 0)
    }
}
