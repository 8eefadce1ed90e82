use aws_sdk_s3::Client as S3Client;
use redis::Client as RedisClient;
use sqlx::PgPool;

use crate::auth::google::GoogleVerifier;
use crate::config::Config;
use crate::llm_client::LlmClient;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    /// Rate-limit counters.
    pub redis: RedisClient,
    /// Avatar storage.
    pub s3: S3Client,
    pub llm: LlmClient,
    pub google: GoogleVerifier,
    pub config: Config,
}
