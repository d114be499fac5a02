//! Bearer token verification against the external identity provider.

use crate::config::AuthConfig;
use async_trait::async_trait;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use service_core::error::AppError;
use std::fs;

/// Capability interface for verifying a bearer token into a user id. The
/// request boundary depends on this, never on a concrete verifier.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<String, AppError>;
}

/// Claims we require from the identity provider's ID tokens.
#[derive(Debug, Deserialize)]
struct IdTokenClaims {
    sub: String,
    #[allow(dead_code)]
    exp: i64,
}

/// Verifies RS256 ID tokens with the identity provider's public key. This
/// service only verifies; issuing is the identity provider's business.
#[derive(Clone)]
pub struct JwtVerifier {
    decoding_key: DecodingKey,
}

impl JwtVerifier {
    pub fn new(config: &AuthConfig) -> Result<Self, AppError> {
        let public_key_pem = fs::read_to_string(&config.jwt_public_key_path).map_err(|e| {
            AppError::ConfigError(anyhow::anyhow!(
                "Failed to read JWT public key from {}: {}",
                config.jwt_public_key_path,
                e
            ))
        })?;

        let decoding_key = DecodingKey::from_rsa_pem(public_key_pem.as_bytes())
            .map_err(|e| AppError::ConfigError(anyhow::anyhow!("Failed to parse public key: {}", e)))?;

        tracing::info!("Token verifier initialized with RS256 public key");

        Ok(Self { decoding_key })
    }
}

#[async_trait]
impl TokenVerifier for JwtVerifier {
    async fn verify(&self, token: &str) -> Result<String, AppError> {
        let mut validation = Validation::new(Algorithm::RS256);
        validation.validate_exp = true;

        let data = decode::<IdTokenClaims>(token, &self.decoding_key, &validation)
            .map_err(|_| AppError::Unauthorized(anyhow::anyhow!("Invalid or expired token")))?;

        Ok(data.claims.sub)
    }
}
