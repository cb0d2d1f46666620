use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::repo_types::{NewUser, PendingReset, User, UserRow};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("email already registered")]
    DuplicateEmail,
    #[error("user not found")]
    NotFound,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Persistence for user records. Email uniqueness is enforced here.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn create(&self, user: NewUser) -> StoreResult<User>;
    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<User>>;
    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>>;
    /// Finds the user holding `token_digest` whose reset window is still open at `now`.
    async fn find_by_reset_token(
        &self,
        token_digest: &str,
        now: OffsetDateTime,
    ) -> StoreResult<Option<User>>;
    /// Writes or clears the reset fields only; nothing else on the record is touched.
    async fn set_reset_token(&self, id: Uuid, reset: Option<PendingReset>) -> StoreResult<()>;
    /// Replaces the password hash and clears any pending reset.
    async fn update_password(&self, id: Uuid, password_hash: &str) -> StoreResult<User>;
    async fn update_details(&self, id: Uuid, name: &str, email: &str) -> StoreResult<User>;
}

pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

const USER_COLUMNS: &str = "id, name, email, role, password_hash, \
     reset_password_token, reset_password_expire, created_at";

fn into_user(row: UserRow) -> StoreResult<User> {
    User::try_from(row).map_err(|e| StoreError::Database(sqlx::Error::Decode(e.into())))
}

fn map_unique(e: sqlx::Error) -> StoreError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::DuplicateEmail,
        _ => StoreError::Database(e),
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn create(&self, user: NewUser) -> StoreResult<User> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            INSERT INTO users (name, email, role, password_hash)
            VALUES ($1, $2, $3, $4)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(&user.name)
        .bind(&user.email)
        .bind(user.role.as_str())
        .bind(&user.password_hash)
        .fetch_one(&self.db)
        .await
        .map_err(map_unique)?;
        into_user(row)
    }

    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        row.map(into_user).transpose()
    }

    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.db)
        .await?;
        row.map(into_user).transpose()
    }

    async fn find_by_reset_token(
        &self,
        token_digest: &str,
        now: OffsetDateTime,
    ) -> StoreResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            SELECT {USER_COLUMNS}
            FROM users
            WHERE reset_password_token = $1 AND reset_password_expire > $2
            "#
        ))
        .bind(token_digest)
        .bind(now)
        .fetch_optional(&self.db)
        .await?;
        row.map(into_user).transpose()
    }

    async fn set_reset_token(&self, id: Uuid, reset: Option<PendingReset>) -> StoreResult<()> {
        let (digest, expires_at) = match reset {
            Some(r) => (Some(r.token_digest), Some(r.expires_at)),
            None => (None, None),
        };
        let res = sqlx::query(
            r#"
            UPDATE users
            SET reset_password_token = $2, reset_password_expire = $3
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(digest)
        .bind(expires_at)
        .execute(&self.db)
        .await?;
        if res.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn update_password(&self, id: Uuid, password_hash: &str) -> StoreResult<User> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            UPDATE users
            SET password_hash = $2, reset_password_token = NULL, reset_password_expire = NULL
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(password_hash)
        .fetch_optional(&self.db)
        .await?
        .ok_or(StoreError::NotFound)?;
        into_user(row)
    }

    async fn update_details(&self, id: Uuid, name: &str, email: &str) -> StoreResult<User> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            UPDATE users
            SET name = $2, email = $3
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(name)
        .bind(email)
        .fetch_optional(&self.db)
        .await
        .map_err(map_unique)?
        .ok_or(StoreError::NotFound)?;
        into_user(row)
    }
}
