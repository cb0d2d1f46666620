use axum_extra::extract::cookie::{Cookie, SameSite};
use time::{Duration, OffsetDateTime};

use crate::config::AppConfig;

pub const SESSION_COOKIE: &str = "token";

/// HTTP-only cookie carrying the session JWT. `Secure` only in production.
pub fn session_cookie(config: &AppConfig, token: String) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .secure(config.is_production())
        .same_site(SameSite::Lax)
        .expires(OffsetDateTime::now_utc() + Duration::days(config.jwt.cookie_ttl_days))
        .build()
}

/// Replaces the session cookie with a placeholder that expires in ten seconds.
pub fn logout_cookie(config: &AppConfig) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, "none"))
        .path("/")
        .http_only(true)
        .secure(config.is_production())
        .same_site(SameSite::Lax)
        .expires(OffsetDateTime::now_utc() + Duration::seconds(10))
        .build()
}
