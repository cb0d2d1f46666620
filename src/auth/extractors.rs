use axum::{
    async_trait,
    extract::{FromRef, FromRequest, FromRequestParts, Request},
    http::request::Parts,
    Json,
};
use axum_extra::extract::cookie::CookieJar;
use serde::de::DeserializeOwned;
use tracing::warn;

use crate::{
    auth::{cookie::SESSION_COOKIE, jwt::JwtKeys, repo_types::User},
    error::AppError,
    state::AppState,
};

/// The authenticated caller, loaded fresh from the store.
///
/// The session token is read from `Authorization: Bearer <token>` first and
/// from the `token` cookie otherwise.
pub struct CurrentUser(pub User);

fn bearer_token(parts: &Parts) -> Option<String> {
    parts
        .headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer ").or_else(|| h.strip_prefix("bearer ")))
        .map(str::to_string)
}

fn cookie_token(parts: &Parts) -> Option<String> {
    CookieJar::from_headers(&parts.headers)
        .get(SESSION_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty() && v != "none")
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)
            .or_else(|| cookie_token(parts))
            .ok_or_else(AppError::not_authorized)?;

        let claims = JwtKeys::from_ref(state).verify(&token).map_err(|e| {
            warn!(error = %e, "invalid or expired session token");
            AppError::not_authorized()
        })?;

        let user = state
            .users
            .find_by_id(claims.sub)
            .await?
            .ok_or_else(|| {
                warn!(user_id = %claims.sub, "session for missing user");
                AppError::not_authorized()
            })?;

        Ok(CurrentUser(user))
    }
}

/// JSON request body whose rejections render as validation errors.
pub struct AppJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for AppJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(AppJson(value))
    }
}
