use anyhow::{Context, Result};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// JWT claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub email: String,
    pub exp: i64,
    pub iat: i64,
}

/// Create an access token (HS256 JWT) valid for `ttl_secs`.
pub fn create_access_token(
    user_id: Uuid,
    email: &str,
    jwt_secret: &str,
    ttl_secs: i64,
) -> Result<String> {
    let now = chrono::Utc::now().timestamp();
    let claims = Claims {
        sub: user_id.to_string(),
        email: email.to_string(),
        iat: now,
        exp: now + ttl_secs,
    };
    jsonwebtoken::encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(jwt_secret.as_bytes()),
    )
    .context("Failed to create access token")
}

/// Validate an access token and return claims
pub fn validate_access_token(token: &str, jwt_secret: &str) -> Result<Claims> {
    let token_data = jsonwebtoken::decode::<Claims>(
        token,
        &DecodingKey::from_secret(jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .context("Invalid access token")?;
    Ok(token_data.claims)
}

/// Generate a refresh token: returns (raw_token, token_hash)
pub fn generate_refresh_token() -> (String, String) {
    let raw = Uuid::new_v4().to_string();
    let hash = hash_refresh_token(&raw);
    (raw, hash)
}

/// Hash a refresh token using SHA256
pub fn hash_refresh_token(raw_token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw_token.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jwt_create_and_validate() {
        let id = Uuid::new_v4();
        let token = create_access_token(id, "test@example.com", "test-jwt-secret", 60).unwrap();
        let claims = validate_access_token(&token, "test-jwt-secret").unwrap();
        assert_eq!(claims.sub, id.to_string());
        assert_eq!(claims.email, "test@example.com");
        assert_eq!(claims.exp - claims.iat, 60);
    }

    #[test]
    fn test_jwt_wrong_secret_fails() {
        let token = create_access_token(Uuid::new_v4(), "a@b.co", "secret-1", 60).unwrap();
        assert!(validate_access_token(&token, "secret-2").is_err());
    }

    #[test]
    fn test_jwt_expired_fails() {
        // Past the default 60s leeway.
        let token = create_access_token(Uuid::new_v4(), "a@b.co", "secret", -120).unwrap();
        assert!(validate_access_token(&token, "secret").is_err());
    }

    #[test]
    fn test_refresh_token_uniqueness() {
        let (raw1, hash1) = generate_refresh_token();
        let (raw2, hash2) = generate_refresh_token();
        assert_ne!(raw1, raw2);
        assert_ne!(hash1, hash2);
    }

    #[test]
    fn test_refresh_token_hash_determinism() {
        let hash1 = hash_refresh_token("fixed-token-value");
        let hash2 = hash_refresh_token("fixed-token-value");
        assert_eq!(hash1, hash2);
        assert_eq!(hash1.len(), 64);
    }
}
