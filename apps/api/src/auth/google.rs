//! Google sign-in: verifies ID tokens issued to the frontend's client id.

use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;

const TOKENINFO_URL: &str = "https://oauth2.googleapis.com/tokeninfo";
const GOOGLE_ISSUERS: &[&str] = &["accounts.google.com", "https://accounts.google.com"];

#[derive(Debug, Error)]
pub enum GoogleAuthError {
    #[error("Google sign-in is not configured")]
    NotConfigured,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("token rejected by Google (status {0})")]
    Rejected(u16),

    #[error("invalid token: {0}")]
    InvalidClaims(&'static str),
}

/// Subset of the `tokeninfo` response. Google encodes booleans and numbers as strings.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenInfo {
    pub iss: String,
    pub aud: String,
    pub sub: String,
    pub email: Option<String>,
    pub email_verified: Option<String>,
    pub name: Option<String>,
    pub exp: String,
}

/// Identity extracted from a verified ID token.
#[derive(Debug, Clone, PartialEq)]
pub struct GoogleIdentity {
    pub sub: String,
    pub email: String,
    pub name: Option<String>,
}

#[derive(Clone)]
pub struct GoogleVerifier {
    client: Client,
    client_id: Option<String>,
}

impl GoogleVerifier {
    pub fn new(client_id: Option<String>) -> anyhow::Result<Self> {
        Ok(Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(10))
                .build()?,
            client_id,
        })
    }

    pub fn is_configured(&self) -> bool {
        self.client_id.is_some()
    }

    /// Verifies `id_token` with Google and checks it was minted for this app.
    pub async fn verify(&self, id_token: &str) -> Result<GoogleIdentity, GoogleAuthError> {
        let client_id = self
            .client_id
            .as_deref()
            .ok_or(GoogleAuthError::NotConfigured)?;

        let response = self
            .client
            .get(TOKENINFO_URL)
            .query(&[("id_token", id_token)])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(GoogleAuthError::Rejected(status.as_u16()));
        }

        let info: TokenInfo = response.json().await?;
        check_claims(&info, client_id, chrono::Utc::now().timestamp())
    }
}

/// Validates audience, issuer, expiry and email verification.
pub fn check_claims(
    info: &TokenInfo,
    client_id: &str,
    now: i64,
) -> Result<GoogleIdentity, GoogleAuthError> {
    if info.aud != client_id {
        return Err(GoogleAuthError::InvalidClaims("audience mismatch"));
    }
    if !GOOGLE_ISSUERS.contains(&info.iss.as_str()) {
        return Err(GoogleAuthError::InvalidClaims("unexpected issuer"));
    }
    let exp: i64 = info
        .exp
        .parse()
        .map_err(|_| GoogleAuthError::InvalidClaims("malformed expiry"))?;
    if exp <= now {
        return Err(GoogleAuthError::InvalidClaims("token expired"));
    }
    let email = info
        .email
        .as_deref()
        .map(|e| e.trim().to_lowercase())
        .filter(|e| !e.is_empty())
        .ok_or(GoogleAuthError::InvalidClaims("token has no email"))?;
    if info.email_verified.as_deref() != Some("true") {
        return Err(GoogleAuthError::InvalidClaims("email not verified"));
    }

    Ok(GoogleIdentity {
        sub: info.sub.clone(),
        email,
        name: info.name.clone().filter(|n| !n.trim().is_empty()),
    })
}
