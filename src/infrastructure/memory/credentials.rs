use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::domain::{CredentialStore, DomainError, DomainResult, User};

/// In-memory credential store
///
/// Username and email uniqueness is claimed through per-key index entries so
/// concurrent inserts cannot both succeed.
#[derive(Default)]
pub struct InMemoryCredentialStore {
    users: DashMap<String, User>,
    usernames: DashMap<String, String>,
    emails: DashMap<String, String>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn claim_email(&self, email: &str, user_id: &str) -> DomainResult<()> {
        match self.emails.entry(email.to_owned()) {
            Entry::Occupied(e) if e.get() != user_id => {
                Err(DomainError::Conflict("Email already exists".into()))
            }
            Entry::Occupied(_) => Ok(()),
            Entry::Vacant(v) => {
                v.insert(user_id.to_string());
                Ok(())
            }
        }
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn find_by_username(&self, username: &str) -> DomainResult<Option<User>> {
        let Some(id) = self.usernames.get(username).map(|e| e.value().clone()) else {
            return Ok(None);
        };
        Ok(self.users.get(&id).map(|u| u.clone()))
    }

    async fn find_by_id(&self, id: &str) -> DomainResult<Option<User>> {
        Ok(self.users.get(id).map(|u| u.clone()))
    }

    async fn insert(&self, mut user: User) -> DomainResult<User> {
        user.email = user.email.to_lowercase();
        match self.usernames.entry(user.username.clone()) {
            Entry::Occupied(_) => {
                return Err(DomainError::Conflict("Username already exists".into()))
            }
            Entry::Vacant(v) => {
                v.insert(user.id.clone());
            }
        }

        if let Err(e) = self.claim_email(&user.email, &user.id) {
            self.usernames.remove(&user.username);
            return Err(e);
        }

        self.users.insert(user.id.clone(), user.clone());
        Ok(user)
    }

    async fn update(&self, mut user: User) -> DomainResult<User> {
        user.email = user.email.to_lowercase();
        let existing = self
            .users
            .get(&user.id)
            .map(|u| u.clone())
            .ok_or_else(|| DomainError::user_not_found(&user.id))?;

        if existing.email != user.email {
            self.claim_email(&user.email, &user.id)?;
            self.emails.remove(&existing.email);
        }

        let updated = User {
            username: existing.username,
            ..user
        };
        self.users.insert(updated.id.clone(), updated.clone());
        Ok(updated)
    }

    async fn list(&self) -> DomainResult<Vec<User>> {
        let mut users: Vec<User> = self.users.iter().map(|e| e.value().clone()).collect();
        users.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(users)
    }

    async fn record_login(&self, user_id: &str, at: DateTime<Utc>) -> DomainResult<bool> {
        match self.users.get_mut(user_id) {
            Some(mut user) if user.is_active => {
                user.last_login_at = Some(at);
                user.updated_at = at;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::domain::UserRole;

    fn user(name: &str, email: &str) -> User {
        User::new(name, email, "hash", UserRole::Viewer)
    }

    #[tokio::test]
    async fn username_and_email_are_unique() {
        let store = InMemoryCredentialStore::new();
        store.insert(user("alice", "a@example.com")).await.unwrap();

        let same_name = store.insert(user("alice", "b@example.com")).await;
        assert!(matches!(same_name, Err(DomainError::Conflict(_))));

        let same_email = store.insert(user("bob", "A@example.com")).await;
        assert!(matches!(same_email, Err(DomainError::Conflict(_))));

        // failed email claim must release the username
        store.insert(user("bob", "b@example.com")).await.unwrap();
    }

    #[tokio::test]
    async fn update_moves_email_claim() {
        let store = InMemoryCredentialStore::new();
        let mut alice = store.insert(user("alice", "a@example.com")).await.unwrap();
        store.insert(user("bob", "b@example.com")).await.unwrap();

        alice.email = "b@example.com".into();
        assert!(matches!(
            store.update(alice.clone()).await,
            Err(DomainError::Conflict(_))
        ));

        alice.email = "alice@example.com".into();
        store.update(alice).await.unwrap();
        store.insert(user("carol", "a@example.com")).await.unwrap();
    }

    #[tokio::test]
    async fn emails_are_stored_lowercased() {
        let store = InMemoryCredentialStore::new();
        let mut alice = store.insert(user("alice", "Alice@Example.com")).await.unwrap();
        assert_eq!(alice.email, "alice@example.com");

        alice.email = "ALICE@example.org".into();
        let updated = store.update(alice).await.unwrap();
        assert_eq!(updated.email, "alice@example.org");
        store.insert(user("bob", "alice@example.com")).await.unwrap();
    }

    #[tokio::test]
    async fn record_login_touches_only_active_accounts() {
        let store = InMemoryCredentialStore::new();
        let alice = store.insert(user("alice", "a@example.com")).await.unwrap();
        let mut ghost = user("ghost", "g@example.com");
        ghost.is_active = false;
        let ghost = store.insert(ghost).await.unwrap();
        let at = Utc::now();

        assert!(store.record_login(&alice.id, at).await.unwrap());
        assert!(!store.record_login(&ghost.id, at).await.unwrap());
        assert!(!store.record_login("missing", at).await.unwrap());

        let stored = store.find_by_id(&alice.id).await.unwrap().unwrap();
        assert_eq!(stored.last_login_at, Some(at));
        assert_eq!(stored.password_hash, alice.password_hash);
        let ghost = store.find_by_id(&ghost.id).await.unwrap().unwrap();
        assert!(ghost.last_login_at.is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_inserts_admit_one_owner() {
        let store = Arc::new(InMemoryCredentialStore::new());
        let mut handles = Vec::new();
        for i in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .insert(user("dup", &format!("dup{}@example.com", i)))
                    .await
                    .is_ok()
            }));
        }

        let mut ok = 0;
        for h in handles {
            if h.await.unwrap() {
                ok += 1;
            }
        }
        assert_eq!(ok, 1);
    }
}
