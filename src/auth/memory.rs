use std::collections::HashMap;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::auth::{
    repo::{StoreError, StoreResult, UserStore},
    repo_types::{NewUser, PendingReset, User},
};

/// In-process user store. Backs tests and database-less local runs.
#[derive(Default)]
pub struct MemoryUserStore {
    users: RwLock<HashMap<Uuid, User>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.users.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.users.read().await.is_empty()
    }
}

fn email_taken(users: &HashMap<Uuid, User>, email: &str, except: Option<Uuid>) -> bool {
    users
        .values()
        .any(|u| u.email == email && Some(u.id) != except)
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn create(&self, user: NewUser) -> StoreResult<User> {
        let mut users = self.users.write().await;
        if email_taken(&users, &user.email, None) {
            return Err(StoreError::DuplicateEmail);
        }
        let record = User {
            id: Uuid::new_v4(),
            name: user.name,
            email: user.email,
            role: user.role,
            password_hash: user.password_hash,
            reset_password_token: None,
            reset_password_expire: None,
            created_at: OffsetDateTime::now_utc(),
        };
        users.insert(record.id, record.clone());
        Ok(record)
    }

    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<User>> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        Ok(self
            .users
            .read()
            .await
            .values()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn find_by_reset_token(
        &self,
        token_digest: &str,
        now: OffsetDateTime,
    ) -> StoreResult<Option<User>> {
        Ok(self
            .users
            .read()
            .await
            .values()
            .find(|u| {
                u.reset_password_token.as_deref() == Some(token_digest)
                    && u.reset_password_expire.is_some_and(|exp| exp > now)
            })
            .cloned())
    }

    async fn set_reset_token(&self, id: Uuid, reset: Option<PendingReset>) -> StoreResult<()> {
        let mut users = self.users.write().await;
        let user = users.get_mut(&id).ok_or(StoreError::NotFound)?;
        match reset {
            Some(r) => {
                user.reset_password_token = Some(r.token_digest);
                user.reset_password_expire = Some(r.expires_at);
            }
            None => {
                user.reset_password_token = None;
                user.reset_password_expire = None;
            }
        }
        Ok(())
    }

    async fn update_password(&self, id: Uuid, password_hash: &str) -> StoreResult<User> {
        let mut users = self.users.write().await;
        let user = users.get_mut(&id).ok_or(StoreError::NotFound)?;
        user.password_hash = password_hash.to_string();
        user.reset_password_token = None;
        user.reset_password_expire = None;
        Ok(user.clone())
    }

    async fn update_details(&self, id: Uuid, name: &str, email: &str) -> StoreResult<User> {
        let mut users = self.users.write().await;
        if email_taken(&users, email, Some(id)) {
            return Err(StoreError::DuplicateEmail);
        }
        let user = users.get_mut(&id).ok_or(StoreError::NotFound)?;
        user.name = name.to_string();
        user.email = email.to_string();
        Ok(user.clone())
    }
}
