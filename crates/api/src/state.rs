//! Application state

use std::sync::Arc;
use std::time::Duration;

use eventhub_shared::Store;

use crate::{
    auth::{
        CookieTransport, CredentialHasher, HashError, HeaderTransport, JwtManager, OtpEngine,
        SessionTransport, TokenService,
    },
    clock::{Clock, SystemClock},
    config::{Config, TransportKind},
    email::Mailer,
    rate_limit::ClientRateLimiter,
};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn Store>,
    pub clock: Arc<dyn Clock>,
    pub hasher: CredentialHasher,
    pub otp: OtpEngine,
    pub tokens: TokenService,
    /// Cookie or header carriage of the session pair
    pub transport: Arc<dyn SessionTransport>,
    pub mailer: Arc<dyn Mailer>,
    pub rate_limiter: ClientRateLimiter,
}

impl AppState {
    pub fn new(
        config: Config,
        store: Arc<dyn Store>,
        mailer: Arc<dyn Mailer>,
    ) -> Result<Self, HashError> {
        Self::with_clock(config, store, mailer, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: Config,
        store: Arc<dyn Store>,
        mailer: Arc<dyn Mailer>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, HashError> {
        let hasher = CredentialHasher::new(config.password_hash)?;
        tracing::info!(
            memory_kib = config.password_hash.memory_kib,
            iterations = config.password_hash.iterations,
            parallelism = config.password_hash.parallelism,
            "Argon2id credential hasher initialized"
        );

        let otp = OtpEngine::new(store.clone(), hasher.clone(), clock.clone());

        let jwt = JwtManager::new(&config.access_token_secret, &config.refresh_token_secret);
        let tokens = TokenService::new(jwt, store.clone(), clock.clone());

        let transport: Arc<dyn SessionTransport> = match config.session_transport {
            TransportKind::Cookie => {
                if !config.cookie_secure {
                    tracing::warn!("Session cookies sent without Secure (COOKIE_SECURE=false)");
                }
                tracing::info!(
                    same_site = config.cookie_same_site.as_str(),
                    "Cookie session transport enabled"
                );
                Arc::new(CookieTransport::new(
                    &config.cookie_secret,
                    config.cookie_secure,
                    config.cookie_same_site,
                ))
            }
            TransportKind::Header => {
                tracing::info!("Header session transport enabled");
                Arc::new(HeaderTransport)
            }
        };

        if config.resend_api_key.is_some() {
            tracing::info!("Email delivery enabled via Resend");
        } else {
            tracing::warn!("Email delivery not configured (missing RESEND_API_KEY)");
        }

        let rate_limiter = ClientRateLimiter::new(
            config.rate_limit_max_requests,
            Duration::from_secs(config.rate_limit_window_secs),
            config.trust_forwarded_for,
        );
        tracing::info!(
            max_requests = config.rate_limit_max_requests.get(),
            window_secs = config.rate_limit_window_secs,
            trust_forwarded_for = config.trust_forwarded_for,
            "Per-client rate limit enabled"
        );

        Ok(Self {
            config,
            store,
            clock,
            hasher,
            otp,
            tokens,
            transport,
            mailer,
            rate_limiter,
        })
    }
}
