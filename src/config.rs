use std::{ops::RangeInclusive, str::FromStr};

use anyhow::Context;
use serde::Deserialize;

const TTL_DAYS_RANGE: RangeInclusive<i64> = 1..=3650;
const RESET_TTL_MINUTES_RANGE: RangeInclusive<i64> = 1..=7 * 24 * 60;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_days: i64,
    pub cookie_ttl_days: i64,
}

/// Deployment environment. Controls the `Secure` attribute on session cookies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Production,
}

impl FromStr for Environment {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "development" | "dev" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            other => anyhow::bail!("unknown APP_ENV value: {other}"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from_email: String,
    pub from_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub jwt: JwtConfig,
    pub environment: Environment,
    /// Base URL used to build the links sent in password reset emails.
    pub public_base_url: String,
    pub reset_token_ttl_minutes: i64,
    pub smtp: Option<SmtpConfig>,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")?;
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "userauth".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "userauth-users".into()),
            ttl_days: env_bounded("JWT_EXPIRE_DAYS", 30, TTL_DAYS_RANGE)?,
            cookie_ttl_days: env_bounded("JWT_COOKIE_EXPIRE_DAYS", 30, TTL_DAYS_RANGE)?,
        };
        let environment = match std::env::var("APP_ENV") {
            Ok(v) => v.parse()?,
            Err(_) => Environment::Development,
        };
        let smtp = match std::env::var("SMTP_HOST") {
            Ok(host) => Some(SmtpConfig {
                host,
                port: env_parse("SMTP_PORT", 587),
                username: std::env::var("SMTP_USERNAME")?,
                password: std::env::var("SMTP_PASSWORD")?,
                from_email: std::env::var("SMTP_FROM_EMAIL")?,
                from_name: std::env::var("SMTP_FROM_NAME").unwrap_or_else(|_| "userauth".into()),
            }),
            Err(_) => None,
        };

        Ok(Self {
            database_url,
            jwt,
            environment,
            public_base_url: std::env::var("PUBLIC_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:8080".into()),
            reset_token_ttl_minutes: env_bounded(
                "RESET_TOKEN_TTL_MINUTES",
                10,
                RESET_TTL_MINUTES_RANGE,
            )?,
            smtp,
        })
    }

    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

fn env_bounded(key: &str, default: i64, range: RangeInclusive<i64>) -> anyhow::Result<i64> {
    parse_bounded(key, std::env::var(key).ok().as_deref(), default, range)
}

/// Absent keeps `default`; present must parse and fall inside `range`.
fn parse_bounded(
    key: &str,
    raw: Option<&str>,
    default: i64,
    range: RangeInclusive<i64>,
) -> anyhow::Result<i64> {
    let Some(raw) = raw else {
        return Ok(default);
    };
    let value: i64 = raw
        .trim()
        .parse()
        .with_context(|| format!("{key} is not an integer: {raw}"))?;
    if !range.contains(&value) {
        anyhow::bail!(
            "{key}={value} out of range {}..={}",
            range.start(),
            range.end()
        );
    }
    Ok(value)
}
