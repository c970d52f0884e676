//! HS256 JWT encoding for access and refresh tokens
//!
//! Access and refresh tokens are signed with separate secrets. Expiry is not
//! checked here; `TokenService` compares `exp` against its injected clock.

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use eventhub_shared::Role;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    pub sub: Uuid,
    pub role: Role,
    pub is_admin: bool,
    pub user_name: String,
    pub email: String,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
    pub typ: TokenType,
}

/// Refresh tokens carry only the user id
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshClaims {
    pub sub: Uuid,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
    pub typ: TokenType,
}

#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    #[error("token could not be signed: {0}")]
    Encode(jsonwebtoken::errors::Error),

    #[error("token rejected")]
    Rejected,
}

#[derive(Clone)]
pub struct JwtManager {
    access_encoding: EncodingKey,
    access_decoding: DecodingKey,
    refresh_encoding: EncodingKey,
    refresh_decoding: DecodingKey,
    validation: Validation,
}

impl JwtManager {
    pub fn new(access_secret: &str, refresh_secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Self {
            access_encoding: EncodingKey::from_secret(access_secret.as_bytes()),
            access_decoding: DecodingKey::from_secret(access_secret.as_bytes()),
            refresh_encoding: EncodingKey::from_secret(refresh_secret.as_bytes()),
            refresh_decoding: DecodingKey::from_secret(refresh_secret.as_bytes()),
            validation,
        }
    }

    pub fn encode_access(&self, claims: &AccessClaims) -> Result<String, JwtError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.access_encoding)
            .map_err(JwtError::Encode)
    }

    pub fn encode_refresh(&self, claims: &RefreshClaims) -> Result<String, JwtError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.refresh_encoding)
            .map_err(JwtError::Encode)
    }

    /// Signature and shape only
    pub fn decode_access(&self, token: &str) -> Result<AccessClaims, JwtError> {
        let claims = decode::<AccessClaims>(token, &self.access_decoding, &self.validation)
            .map_err(|_| JwtError::Rejected)?
            .claims;
        if claims.typ != TokenType::Access {
            return Err(JwtError::Rejected);
        }
        Ok(claims)
    }

    /// Signature and shape only
    pub fn decode_refresh(&self, token: &str) -> Result<RefreshClaims, JwtError> {
        let claims = decode::<RefreshClaims>(token, &self.refresh_decoding, &self.validation)
            .map_err(|_| JwtError::Rejected)?
            .claims;
        if claims.typ != TokenType::Refresh {
            return Err(JwtError::Rejected);
        }
        Ok(claims)
    }
}
