//! Identity verification for management endpoints.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use mediate_common::{AppError, AppResult, config::AuthConfig};
use serde::{Deserialize, Serialize};

/// Turns a bearer credential into a verified subject ID.
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    /// Verify `credential` and return the subject it was issued to.
    async fn verify(&self, credential: &str) -> AppResult<String>;
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    iss: Option<String>,
}

/// HS256 JWT verifier.
#[derive(Clone)]
pub struct JwtVerifier {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: Option<String>,
}

impl JwtVerifier {
    /// Create a verifier for tokens signed with `secret`.
    #[must_use]
    pub fn new(secret: &str, issuer: Option<String>) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            issuer,
        }
    }

    /// Verifier from auth configuration.
    pub fn from_config(config: &AuthConfig) -> AppResult<Self> {
        if config.jwt_secret.len() < 16 {
            return Err(AppError::Config(
                "auth.jwt_secret must be at least 16 bytes".to_string(),
            ));
        }
        Ok(Self::new(&config.jwt_secret, config.issuer.clone()))
    }

    /// Sign a token for `subject`.
    pub fn issue(&self, subject: &str, expires_at: DateTime<Utc>) -> AppResult<String> {
        let claims = Claims {
            sub: subject.to_string(),
            exp: expires_at.timestamp(),
            iss: self.issuer.clone(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AppError::Internal(format!("Failed to sign token: {e}")))
    }
}

#[async_trait]
impl IdentityVerifier for JwtVerifier {
    async fn verify(&self, credential: &str) -> AppResult<String> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_required_spec_claims(&["exp", "sub"]);
        if let Some(issuer) = &self.issuer {
            validation.set_issuer(&[issuer]);
        }

        let data = decode::<Claims>(credential, &self.decoding, &validation).map_err(|e| {
            tracing::debug!(error = %e, "Rejected bearer token");
            AppError::Unauthorized
        })?;

        if data.claims.sub.trim().is_empty() {
            return Err(AppError::Unauthorized);
        }
        Ok(data.claims.sub)
    }
}
