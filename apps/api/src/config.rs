use anyhow::{Context, Result};
use std::str::FromStr;

use crate::auth::face::DEFAULT_MATCH_THRESHOLD;

/// Application configuration loaded from environment variables.
/// Startup fails if required variables are missing or malformed.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub redis_url: String,
    pub s3_bucket: String,
    pub s3_endpoint: String,
    pub aws_access_key_id: String,
    pub aws_secret_access_key: String,
    pub gemini_api_key: String,
    pub jwt_secret: String,
    /// Unset disables Google sign-in.
    pub google_client_id: Option<String>,
    pub face_match_threshold: f64,
    pub access_token_ttl_secs: i64,
    pub refresh_token_ttl_days: i64,
    pub auth_rate_limit: u64,
    pub ai_rate_limit: u64,
    pub rate_limit_window_secs: u64,
    pub max_avatar_bytes: usize,
    pub reminder_sweep_secs: u64,
    pub cors_origin: Option<String>,
    pub port: u16,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            database_url: require_env("DATABASE_URL")?,
            redis_url: require_env("REDIS_URL")?,
            s3_bucket: require_env("S3_BUCKET")?,
            s3_endpoint: require_env("S3_ENDPOINT")?,
            aws_access_key_id: require_env("AWS_ACCESS_KEY_ID")?,
            aws_secret_access_key: require_env("AWS_SECRET_ACCESS_KEY")?,
            gemini_api_key: require_env("GEMINI_API_KEY")?,
            jwt_secret: require_env("JWT_SECRET")?,
            google_client_id: optional_env("GOOGLE_CLIENT_ID"),
            face_match_threshold: parse_env("FACE_MATCH_THRESHOLD", DEFAULT_MATCH_THRESHOLD)?,
            access_token_ttl_secs: parse_env("ACCESS_TOKEN_TTL_SECS", 3600)?,
            refresh_token_ttl_days: parse_env("REFRESH_TOKEN_TTL_DAYS", 30)?,
            auth_rate_limit: parse_env("AUTH_RATE_LIMIT", 20)?,
            ai_rate_limit: parse_env("AI_RATE_LIMIT", 30)?,
            rate_limit_window_secs: parse_env("RATE_LIMIT_WINDOW_SECS", 900)?,
            max_avatar_bytes: parse_env("MAX_AVATAR_BYTES", 2 * 1024 * 1024)?,
            reminder_sweep_secs: parse_env("REMINDER_SWEEP_SECS", 60)?,
            cors_origin: optional_env("CORS_ORIGIN"),
            port: parse_env("PORT", 8080)?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match optional_env(key) {
        Some(raw) => parse_value(key, &raw),
        None => Ok(default),
    }
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.trim()
        .parse::<T>()
        .with_context(|| format!("Environment variable '{key}' has an invalid value '{raw}'"))
}
