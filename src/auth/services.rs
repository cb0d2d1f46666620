use lazy_static::lazy_static;
use regex::Regex;
use time::OffsetDateTime;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    auth::{
        dto::{
            ForgotPasswordRequest, LoginRequest, RegisterRequest, ResetPasswordRequest,
            UpdateDetailsRequest, UpdatePasswordRequest,
        },
        jwt::JwtKeys,
        password::{hash_password, verify_dummy_password, verify_password},
        repo_types::{NewUser, User},
        reset::{digest_reset_token, issue_reset_token, reset_url},
    },
    error::{AppError, AppResult},
    state::AppState,
};

const MAX_NAME_LEN: usize = 50;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

fn required(value: Option<String>, message: &str) -> AppResult<String> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(AppError::Validation(message.into())),
    }
}

fn validate_name(name: Option<String>) -> AppResult<String> {
    let name = required(name, "Please add a name")?.trim().to_string();
    if name.chars().count() > MAX_NAME_LEN {
        return Err(AppError::Validation(
            "Name can not be more than 50 characters".into(),
        ));
    }
    Ok(name)
}

fn validate_email(email: Option<String>) -> AppResult<String> {
    let email = required(email, "Please add an email")?.trim().to_lowercase();
    if !is_valid_email(&email) {
        warn!(email = %email, "invalid email");
        return Err(AppError::Validation("Please add a valid email".into()));
    }
    Ok(email)
}

fn issue_session(st: &AppState, user: &User) -> AppResult<String> {
    Ok(JwtKeys::from(&st.config.jwt).sign(user.id)?)
}

pub async fn register(st: &AppState, req: RegisterRequest) -> AppResult<(User, String)> {
    let name = validate_name(req.name)?;
    let email = validate_email(req.email)?;
    let password = required(req.password, "Please add a password")?;
    let role = req.role.unwrap_or_default();
    if !role.is_self_assignable() {
        warn!(%role, "registration with reserved role");
        return Err(AppError::Validation(format!("{role} is not a valid role")));
    }

    let user = st
        .users
        .create(NewUser {
            name,
            email,
            role,
            password_hash: hash_password(&password)?,
        })
        .await?;

    let token = issue_session(st, &user)?;
    info!(user_id = %user.id, email = %user.email, "user registered");
    Ok((user, token))
}

pub async fn login(st: &AppState, req: LoginRequest) -> AppResult<(User, String)> {
    let (Some(email), Some(password)) = (req.email, req.password) else {
        return Err(AppError::Validation(
            "Please provide an email and password".into(),
        ));
    };
    let email = email.trim().to_lowercase();

    let Some(user) = st.users.find_by_email(&email).await? else {
        verify_dummy_password(&password);
        warn!(email = %email, "login unknown email");
        return Err(AppError::invalid_credentials());
    };

    if !verify_password(&password, &user.password_hash)? {
        warn!(email = %email, user_id = %user.id, "login invalid password");
        return Err(AppError::invalid_credentials());
    }

    let token = issue_session(st, &user)?;
    info!(user_id = %user.id, "user logged in");
    Ok((user, token))
}

pub async fn forgot_password(st: &AppState, req: ForgotPasswordRequest) -> AppResult<()> {
    let email = required(req.email, "Please add an email")?
        .trim()
        .to_lowercase();

    let Some(user) = st.users.find_by_email(&email).await? else {
        warn!(email = %email, "password reset for unknown email");
        return Err(AppError::NotFound("There is no user with that email".into()));
    };

    let issued = issue_reset_token(OffsetDateTime::now_utc(), st.config.reset_token_ttl_minutes);
    st.users
        .set_reset_token(user.id, Some(issued.pending))
        .await?;

    let url = reset_url(&st.config.public_base_url, &issued.plaintext);
    if let Err(e) = st.mailer.send_password_reset(&user.email, &url).await {
        st.users.set_reset_token(user.id, None).await?;
        return Err(AppError::Delivery(e));
    }

    info!(user_id = %user.id, "password reset issued");
    Ok(())
}

pub async fn reset_password(
    st: &AppState,
    reset_token: &str,
    req: ResetPasswordRequest,
) -> AppResult<(User, String)> {
    let digest = digest_reset_token(reset_token);
    let Some(user) = st
        .users
        .find_by_reset_token(&digest, OffsetDateTime::now_utc())
        .await?
    else {
        warn!("invalid or expired reset token");
        return Err(AppError::Unauthorized("Invalid token".into()));
    };

    let password = required(req.password, "Please add a password")?;
    let user = st
        .users
        .update_password(user.id, &hash_password(&password)?)
        .await?;

    let token = issue_session(st, &user)?;
    info!(user_id = %user.id, "password reset completed");
    Ok((user, token))
}

pub async fn update_details(
    st: &AppState,
    user_id: Uuid,
    req: UpdateDetailsRequest,
) -> AppResult<User> {
    let current = st
        .users
        .find_by_id(user_id)
        .await?
        .ok_or_else(AppError::not_authorized)?;

    let name = match req.name {
        Some(_) => validate_name(req.name)?,
        None => current.name,
    };
    let email = match req.email {
        Some(_) => validate_email(req.email)?,
        None => current.email,
    };

    let user = st.users.update_details(user_id, &name, &email).await?;
    info!(user_id = %user.id, "user details updated");
    Ok(user)
}

pub async fn update_password(
    st: &AppState,
    user_id: Uuid,
    req: UpdatePasswordRequest,
) -> AppResult<(User, String)> {
    let current_password = required(req.current_password, "Please provide the current password")?;
    let new_password = required(req.new_password, "Please add a password")?;

    let user = st
        .users
        .find_by_id(user_id)
        .await?
        .ok_or_else(AppError::not_authorized)?;

    if !verify_password(&current_password, &user.password_hash)? {
        warn!(user_id = %user.id, "update password with wrong current password");
        return Err(AppError::Unauthorized("Password is incorrect".into()));
    }

    let user = st
        .users
        .update_password(user.id, &hash_password(&new_password)?)
        .await?;

    let token = issue_session(st, &user)?;
    info!(user_id = %user.id, "password updated");
    Ok((user, token))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        auth::{
            memory::MemoryUserStore,
            repo::UserStore,
            repo_types::{PendingReset, Role},
        },
        mail::{MailError, MockMailer},
    };

    fn register_req(name: &str, email: &str, password: &str) -> RegisterRequest {
        RegisterRequest {
            name: Some(name.into()),
            email: Some(email.into()),
            password: Some(password.into()),
            role: Some(Role::User),
        }
    }

    fn login_req(email: &str, password: &str) -> LoginRequest {
        LoginRequest {
            email: Some(email.into()),
            password: Some(password.into()),
        }
    }

    fn state_with_mailer(mailer: MockMailer) -> (AppState, Arc<MemoryUserStore>) {
        let store = Arc::new(MemoryUserStore::new());
        let fake = AppState::fake();
        let st = AppState::from_parts(store.clone(), Arc::new(mailer), fake.config);
        (st, store)
    }

    #[test]
    fn email_validation() {
        assert!(is_valid_email("a@x.com"));
        assert!(!is_valid_email("a@x"));
        assert!(!is_valid_email("not an email"));
    }

    #[tokio::test]
    async fn register_normalizes_email_and_hashes_password() {
        let st = AppState::fake();
        let (user, token) = register(&st, register_req("Alice", "  A@X.com ", "pw123"))
            .await
            .unwrap();
        assert_eq!(user.email, "a@x.com");
        assert_ne!(user.password_hash, "pw123");
        assert_eq!(JwtKeys::from(&st.config.jwt).verify(&token).unwrap().sub, user.id);
    }

    #[tokio::test]
    async fn register_rejects_duplicate_email() {
        let (st, store) = state_with_mailer(MockMailer::new());
        register(&st, register_req("Alice", "a@x.com", "pw123")).await.unwrap();
        let err = register(&st, register_req("Other", "a@x.com", "pw456"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn register_requires_fields_and_rejects_admin_role() {
        let st = AppState::fake();
        let err = register(&st, RegisterRequest::default()).await.unwrap_err();
        assert_eq!(err.to_string(), "Please add a name");

        let mut req = register_req("Root", "root@x.com", "pw123");
        req.role = Some(Role::Admin);
        assert!(matches!(
            register(&st, req).await.unwrap_err(),
            AppError::Validation(_)
        ));
    }

    #[tokio::test]
    async fn login_failures_share_one_message() {
        let st = AppState::fake();
        register(&st, register_req("Alice", "a@x.com", "pw123")).await.unwrap();

        let wrong_password = login(&st, login_req("a@x.com", "wrong")).await.unwrap_err();
        let unknown_user = login(&st, login_req("nobody@x.com", "pw123")).await.unwrap_err();
        assert!(matches!(wrong_password, AppError::Unauthorized(_)));
        assert!(matches!(unknown_user, AppError::Unauthorized(_)));
        assert_eq!(wrong_password.to_string(), unknown_user.to_string());
    }

    #[tokio::test]
    async fn forgot_password_unknown_email_is_not_found() {
        let mut mailer = MockMailer::new();
        mailer.expect_send_password_reset().never();
        let (st, _) = state_with_mailer(mailer);

        let err = forgot_password(
            &st,
            ForgotPasswordRequest {
                email: Some("ghost@x.com".into()),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn forgot_password_clears_state_when_mail_fails() {
        let mut mailer = MockMailer::new();
        mailer
            .expect_send_password_reset()
            .times(1)
            .returning(|_, _| Err(MailError::SendFailed("smtp down".into())));
        let (st, store) = state_with_mailer(mailer);
        let (user, _) = register(&st, register_req("Alice", "a@x.com", "pw123"))
            .await
            .unwrap();

        let err = forgot_password(
            &st,
            ForgotPasswordRequest {
                email: Some("a@x.com".into()),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Delivery(_)));

        let stored = store.find_by_id(user.id).await.unwrap().unwrap();
        assert!(stored.reset_password_token.is_none());
        assert!(stored.reset_password_expire.is_none());
    }

    #[tokio::test]
    async fn forgot_password_stores_digest_not_plaintext() {
        let mut mailer = MockMailer::new();
        mailer
            .expect_send_password_reset()
            .withf(|to, url| to == "a@x.com" && url.contains("/api/v1/auth/resetpassword/"))
            .times(1)
            .returning(|_, _| Ok(()));
        let (st, store) = state_with_mailer(mailer);
        let (user, _) = register(&st, register_req("Alice", "a@x.com", "pw123"))
            .await
            .unwrap();

        forgot_password(
            &st,
            ForgotPasswordRequest {
                email: Some("a@x.com".into()),
            },
        )
        .await
        .unwrap();

        let stored = store.find_by_id(user.id).await.unwrap().unwrap();
        let digest = stored.reset_password_token.expect("digest stored");
        assert_eq!(digest.len(), 64);
        assert!(stored.reset_password_expire.unwrap() > OffsetDateTime::now_utc());
    }

    #[tokio::test]
    async fn expired_reset_token_is_rejected() {
        let (st, store) = state_with_mailer(MockMailer::new());
        let (user, _) = register(&st, register_req("Alice", "a@x.com", "pw123"))
            .await
            .unwrap();
        store
            .set_reset_token(
                user.id,
                Some(PendingReset {
                    token_digest: digest_reset_token("stale"),
                    expires_at: OffsetDateTime::now_utc() - time::Duration::minutes(1),
                }),
            )
            .await
            .unwrap();

        let err = reset_password(
            &st,
            "stale",
            ResetPasswordRequest {
                password: Some("newpass".into()),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
        assert!(login(&st, login_req("a@x.com", "pw123")).await.is_ok());
    }

    #[tokio::test]
    async fn reset_token_is_single_use() {
        let (st, store) = state_with_mailer(MockMailer::new());
        let (user, _) = register(&st, register_req("Alice", "a@x.com", "pw123"))
            .await
            .unwrap();
        store
            .set_reset_token(
                user.id,
                Some(PendingReset {
                    token_digest: digest_reset_token("fresh"),
                    expires_at: OffsetDateTime::now_utc() + time::Duration::minutes(10),
                }),
            )
            .await
            .unwrap();

        let body = || ResetPasswordRequest {
            password: Some("newpass".into()),
        };
        let (reset_user, _) = reset_password(&st, "fresh", body()).await.unwrap();
        assert_eq!(reset_user.id, user.id);
        assert!(login(&st, login_req("a@x.com", "newpass")).await.is_ok());

        let err = reset_password(&st, "fresh", body()).await.unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn update_password_with_wrong_current_keeps_hash() {
        let (st, store) = state_with_mailer(MockMailer::new());
        let (user, _) = register(&st, register_req("Alice", "a@x.com", "pw123"))
            .await
            .unwrap();

        let err = update_password(
            &st,
            user.id,
            UpdatePasswordRequest {
                current_password: Some("wrong".into()),
                new_password: Some("next".into()),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));

        let stored = store.find_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(stored.password_hash, user.password_hash);
    }

    #[tokio::test]
    async fn update_details_keeps_absent_fields() {
        let st = AppState::fake();
        let (user, _) = register(&st, register_req("Alice", "a@x.com", "pw123"))
            .await
            .unwrap();

        let updated = update_details(
            &st,
            user.id,
            UpdateDetailsRequest {
                name: Some("Alice B".into()),
                email: None,
            },
        )
        .await
        .unwrap();
        assert_eq!(updated.name, "Alice B");
        assert_eq!(updated.email, "a@x.com");

        let err = update_details(
            &st,
            user.id,
            UpdateDetailsRequest {
                name: None,
                email: Some("broken".into()),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }
}
