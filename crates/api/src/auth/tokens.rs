//! Access/refresh token pairs with rotation-on-use
//!
//! Every issued refresh token leaves a `RefreshTokenRecord` holding its
//! SHA-256 digest. Rotation consumes the newest live record of the user with
//! a compare-and-set, so a refresh token mints at most one new pair.

use sha2::{Digest, Sha256};
use std::sync::Arc;
use subtle::ConstantTimeEq;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use eventhub_shared::{RefreshTokenRecord, Store, StoreError, TokenStore, UserStore};

use super::jwt::{AccessClaims, JwtError, JwtManager, RefreshClaims, TokenType};
use super::principal::Principal;
use crate::clock::Clock;

pub const ACCESS_TOKEN_TTL: Duration = Duration::days(15);
pub const REFRESH_TOKEN_TTL: Duration = Duration::days(30);

#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub access_expires_at: OffsetDateTime,
    pub refresh_expires_at: OffsetDateTime,
}

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    /// Bad signature, malformed payload, wrong type or expired
    #[error("invalid token")]
    Invalid,

    /// Refresh token valid but not exchangeable
    #[error("refresh denied")]
    Denied,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("token signing failed: {0}")]
    Signing(String),
}

impl From<JwtError> for TokenError {
    fn from(err: JwtError) -> Self {
        match err {
            JwtError::Rejected => TokenError::Invalid,
            JwtError::Encode(e) => TokenError::Signing(e.to_string()),
        }
    }
}

/// Lowercase hex SHA-256 of a refresh token
pub fn refresh_token_digest(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

#[derive(Clone)]
pub struct TokenService {
    jwt: JwtManager,
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
}

impl TokenService {
    pub fn new(jwt: JwtManager, store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Self {
        Self { jwt, store, clock }
    }

    /// Mint a pair for `principal` and record the refresh token
    pub async fn issue(&self, principal: &Principal) -> Result<TokenPair, TokenError> {
        let now = self.clock.now();
        let access_expires_at = now + ACCESS_TOKEN_TTL;
        let refresh_expires_at = now + REFRESH_TOKEN_TTL;

        let access_token = self.jwt.encode_access(&AccessClaims {
            sub: principal.user_id,
            role: principal.role,
            is_admin: principal.is_admin,
            user_name: principal.user_name.clone(),
            email: principal.email.clone(),
            iat: now.unix_timestamp(),
            exp: access_expires_at.unix_timestamp(),
            jti: Uuid::new_v4().to_string(),
            typ: TokenType::Access,
        })?;
        let refresh_token = self.jwt.encode_refresh(&RefreshClaims {
            sub: principal.user_id,
            iat: now.unix_timestamp(),
            exp: refresh_expires_at.unix_timestamp(),
            jti: Uuid::new_v4().to_string(),
            typ: TokenType::Refresh,
        })?;

        self.store
            .insert_refresh_token(RefreshTokenRecord::new(
                principal.user_id,
                refresh_token_digest(&refresh_token),
                now,
            ))
            .await?;

        Ok(TokenPair {
            access_token,
            refresh_token,
            access_expires_at,
            refresh_expires_at,
        })
    }

    pub fn verify_access(&self, token: &str) -> Result<Principal, TokenError> {
        let claims = self.jwt.decode_access(token)?;
        if self.is_expired(claims.exp) {
            return Err(TokenError::Invalid);
        }
        Ok(principal_from_claims(claims))
    }

    pub fn verify_refresh(&self, token: &str) -> Result<Uuid, TokenError> {
        let claims = self.jwt.decode_refresh(token)?;
        if self.is_expired(claims.exp) {
            return Err(TokenError::Invalid);
        }
        Ok(claims.sub)
    }

    /// Principal of a correctly signed access token, expired or not
    pub fn decode_access_ignoring_expiry(&self, token: &str) -> Option<Principal> {
        self.jwt.decode_access(token).ok().map(principal_from_claims)
    }

    /// Exchange a refresh token for a new pair
    pub async fn rotate(
        &self,
        refresh_token: &str,
        current: Option<&Principal>,
    ) -> Result<(TokenPair, Principal), TokenError> {
        let user_id = self.verify_refresh(refresh_token)?;

        let record = self
            .store
            .latest_live_refresh_token(user_id)
            .await?
            .ok_or(TokenError::Denied)?;

        let digest = refresh_token_digest(refresh_token);
        if !bool::from(digest.as_bytes().ct_eq(record.token_hash.as_bytes())) {
            tracing::warn!(user_id = %user_id, "Refresh token does not match newest live record");
            return Err(TokenError::Denied);
        }

        if !self.store.consume_refresh_token(record.id).await? {
            tracing::warn!(user_id = %user_id, "Refresh token consumed concurrently");
            return Err(TokenError::Denied);
        }

        let principal = match current {
            Some(principal) if principal.user_id == user_id => principal.clone(),
            _ => {
                let user = self
                    .store
                    .find_user_by_id(user_id)
                    .await?
                    .ok_or(TokenError::Denied)?;
                if user.is_suspended {
                    return Err(TokenError::Denied);
                }
                Principal::from(&user)
            }
        };

        let pair = self.issue(&principal).await?;
        tracing::debug!(user_id = %user_id, "Rotated session tokens");
        Ok((pair, principal))
    }

    /// Consume every outstanding refresh record of the user
    pub async fn revoke_all(&self, user_id: Uuid) -> Result<u64, StoreError> {
        self.store.consume_all_refresh_tokens(user_id).await
    }

    fn is_expired(&self, exp: i64) -> bool {
        self.clock.now().unix_timestamp() >= exp
    }
}

fn principal_from_claims(claims: AccessClaims) -> Principal {
    Principal {
        user_id: claims.sub,
        role: claims.role,
        is_admin: claims.is_admin,
        user_name: claims.user_name,
        email: claims.email,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use eventhub_shared::{MemoryStore, NewUser, Role, UserStore};
    use time::macros::datetime;

    const NOW: OffsetDateTime = datetime!(2024-05-01 12:00 UTC);

    struct Fixture {
        tokens: TokenService,
        store: Arc<MemoryStore>,
        clock: Arc<ManualClock>,
        principal: Principal,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(NOW));
        let user = store
            .insert_user(
                NewUser::new(
                    "Awais",
                    "awais@example.com",
                    "hash".to_string(),
                    Role::User,
                    NOW,
                )
                .unwrap(),
            )
            .await
            .unwrap();
        let tokens = TokenService::new(
            JwtManager::new("access-secret", "refresh-secret"),
            store.clone(),
            clock.clone(),
        );
        Fixture {
            tokens,
            store,
            clock,
            principal: Principal::from(&user),
        }
    }

    #[tokio::test]
    async fn test_issue_records_digest_not_token() {
        let f = fixture().await;
        let pair = f.tokens.issue(&f.principal).await.unwrap();

        let records = f.store.refresh_tokens_for(f.principal.user_id).await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].token_hash, refresh_token_digest(&pair.refresh_token));
        assert_ne!(records[0].token_hash, pair.refresh_token);
        assert!(!records[0].is_consumed);

        assert_eq!(pair.access_expires_at, NOW + Duration::days(15));
        assert_eq!(pair.refresh_expires_at, NOW + Duration::days(30));
    }

    #[tokio::test]
    async fn test_verify_access_honours_clock() {
        let f = fixture().await;
        let pair = f.tokens.issue(&f.principal).await.unwrap();
        assert_eq!(f.tokens.verify_access(&pair.access_token).unwrap(), f.principal);

        f.clock.advance(Duration::days(15));
        assert!(matches!(
            f.tokens.verify_access(&pair.access_token),
            Err(TokenError::Invalid)
        ));
        assert!(f.tokens.verify_refresh(&pair.refresh_token).is_ok());
        assert_eq!(
            f.tokens.decode_access_ignoring_expiry(&pair.access_token),
            Some(f.principal.clone())
        );

        f.clock.advance(Duration::days(15));
        assert!(matches!(
            f.tokens.verify_refresh(&pair.refresh_token),
            Err(TokenError::Invalid)
        ));
    }

    #[tokio::test]
    async fn test_tokens_minted_in_same_second_differ() {
        let f = fixture().await;
        let a = f.tokens.issue(&f.principal).await.unwrap();
        let b = f.tokens.issue(&f.principal).await.unwrap();
        assert_ne!(a.access_token, b.access_token);
        assert_ne!(a.refresh_token, b.refresh_token);
    }

    #[tokio::test]
    async fn test_rotation_is_single_use() {
        let f = fixture().await;
        let pair = f.tokens.issue(&f.principal).await.unwrap();

        let (next, principal) = f
            .tokens
            .rotate(&pair.refresh_token, Some(&f.principal))
            .await
            .unwrap();
        assert_eq!(principal, f.principal);
        assert_ne!(next.refresh_token, pair.refresh_token);

        assert!(matches!(
            f.tokens.rotate(&pair.refresh_token, Some(&f.principal)).await,
            Err(TokenError::Denied)
        ));

        // The replacement is the newest live record and still works
        assert!(f.tokens.rotate(&next.refresh_token, None).await.is_ok());
    }

    #[tokio::test]
    async fn test_rotation_without_record_is_denied() {
        let f = fixture().await;
        let pair = f.tokens.issue(&f.principal).await.unwrap();
        f.tokens.revoke_all(f.principal.user_id).await.unwrap();

        assert!(matches!(
            f.tokens.rotate(&pair.refresh_token, None).await,
            Err(TokenError::Denied)
        ));
    }

    #[tokio::test]
    async fn test_rotation_reloads_suspended_user() {
        let f = fixture().await;
        let pair = f.tokens.issue(&f.principal).await.unwrap();
        f.store
            .set_user_flags(f.principal.user_id, true, false)
            .await;

        assert!(matches!(
            f.tokens.rotate(&pair.refresh_token, None).await,
            Err(TokenError::Denied)
        ));
    }

    #[tokio::test]
    async fn test_rotation_ignores_principal_of_other_user() {
        let f = fixture().await;
        let pair = f.tokens.issue(&f.principal).await.unwrap();
        let stranger = Principal {
            user_id: Uuid::now_v7(),
            role: Role::Organizer,
            is_admin: true,
            user_name: "Mallory".to_string(),
            email: "mallory@example.com".to_string(),
        };

        let (_, principal) = f
            .tokens
            .rotate(&pair.refresh_token, Some(&stranger))
            .await
            .unwrap();
        assert_eq!(principal, f.principal);
    }

    #[tokio::test]
    async fn test_refresh_token_rejected_as_access() {
        let f = fixture().await;
        let pair = f.tokens.issue(&f.principal).await.unwrap();
        assert!(f.tokens.verify_access(&pair.refresh_token).is_err());
        assert!(f.tokens.rotate(&pair.access_token, None).await.is_err());
    }
}
