//! Server configuration loaded from the environment

use std::fmt;
use std::num::NonZeroU32;

use crate::auth::password::PasswordHashParams;
use crate::auth::transport::SameSite;

/// Where session tokens travel between client and server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Cookie,
    Header,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variables: {}", .0.join(", "))]
    Missing(Vec<&'static str>),

    #[error("invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Clone)]
pub struct Config {
    pub bind_address: String,
    pub database_url: String,
    pub database_max_connections: u32,
    pub access_token_secret: String,
    pub refresh_token_secret: String,
    /// Key for signing session cookies
    pub cookie_secret: String,
    pub allowed_origins: Vec<String>,
    pub session_transport: TransportKind,
    pub cookie_secure: bool,
    pub cookie_same_site: SameSite,
    /// Resend API key; mail is only logged when unset
    pub resend_api_key: Option<String>,
    pub email_from: String,
    pub email_app_name: String,
    pub password_hash: PasswordHashParams,
    pub log_format: LogFormat,
    /// Requests each client may make per window
    pub rate_limit_max_requests: NonZeroU32,
    pub rate_limit_window_secs: u64,
    /// Key the limit on the first X-Forwarded-For entry (behind a proxy)
    pub trust_forwarded_for: bool,
}

const REQUIRED: [&str; 4] = [
    "DATABASE_URL",
    "ACCESS_TOKEN_SECRET",
    "REFRESH_TOKEN_SECRET",
    "COOKIE_SECRET",
];

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key/value source. Every missing required key is reported at once.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let missing: Vec<&'static str> = REQUIRED
            .iter()
            .copied()
            .filter(|key| get(*key).is_none())
            .collect();
        if !missing.is_empty() {
            return Err(ConfigError::Missing(missing));
        }

        let required = |key: &'static str| get(key).ok_or(ConfigError::Missing(vec![key]));

        let session_transport = match get("SESSION_TRANSPORT").as_deref() {
            None | Some("cookie") => TransportKind::Cookie,
            Some("header") => TransportKind::Header,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    key: "SESSION_TRANSPORT",
                    value: other.to_string(),
                })
            }
        };

        let cookie_same_site = match get("COOKIE_SAME_SITE") {
            None => SameSite::None,
            Some(value) => SameSite::parse(&value).ok_or(ConfigError::Invalid {
                key: "COOKIE_SAME_SITE",
                value,
            })?,
        };

        let log_format = match get("LOG_FORMAT").as_deref() {
            Some("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        };

        let defaults = PasswordHashParams::default();
        let password_hash = PasswordHashParams {
            memory_kib: parse_or(&get, "PASSWORD_HASH_MEMORY_KIB", defaults.memory_kib)?,
            iterations: parse_or(&get, "PASSWORD_HASH_ITERATIONS", defaults.iterations)?,
            parallelism: parse_or(&get, "PASSWORD_HASH_PARALLELISM", defaults.parallelism)?,
        };

        let default_max = NonZeroU32::new(500).unwrap_or(NonZeroU32::MIN);
        let rate_limit_max_requests = parse_or(&get, "RATE_LIMIT_MAX_REQUESTS", default_max)?;
        let rate_limit_window_secs: u64 = parse_or(&get, "RATE_LIMIT_WINDOW_SECS", 15 * 60)?;
        if rate_limit_window_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "RATE_LIMIT_WINDOW_SECS",
                value: "0".to_string(),
            });
        }

        Ok(Self {
            bind_address: get("BIND_ADDRESS").unwrap_or_else(|| "0.0.0.0:3000".to_string()),
            database_url: required("DATABASE_URL")?,
            database_max_connections: parse_or(&get, "DATABASE_MAX_CONNECTIONS", 10)?,
            access_token_secret: required("ACCESS_TOKEN_SECRET")?,
            refresh_token_secret: required("REFRESH_TOKEN_SECRET")?,
            cookie_secret: required("COOKIE_SECRET")?,
            allowed_origins: get("ALLOWED_ORIGINS")
                .map(|list| {
                    list.split(',')
                        .map(|o| o.trim().to_string())
                        .filter(|o| !o.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
            session_transport,
            cookie_secure: parse_or(&get, "COOKIE_SECURE", true)?,
            cookie_same_site,
            resend_api_key: get("RESEND_API_KEY"),
            email_from: get("EMAIL_FROM")
                .unwrap_or_else(|| "EventHub <noreply@eventhub.app>".to_string()),
            email_app_name: get("EMAIL_APP_NAME").unwrap_or_else(|| "EventHub".to_string()),
            password_hash,
            log_format,
            rate_limit_max_requests,
            rate_limit_window_secs,
            trust_forwarded_for: parse_or(&get, "TRUST_FORWARDED_FOR", false)?,
        })
    }
}

fn parse_or<T, G>(get: &G, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
    }
}

// Secrets stay out of logs
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("bind_address", &self.bind_address)
            .field("database_max_connections", &self.database_max_connections)
            .field("allowed_origins", &self.allowed_origins)
            .field("session_transport", &self.session_transport)
            .field("cookie_secure", &self.cookie_secure)
            .field("cookie_same_site", &self.cookie_same_site)
            .field("mail_enabled", &self.resend_api_key.is_some())
            .field("email_from", &self.email_from)
            .field("password_hash", &self.password_hash)
            .field("log_format", &self.log_format)
            .field("rate_limit_max_requests", &self.rate_limit_max_requests)
            .field("rate_limit_window_secs", &self.rate_limit_window_secs)
            .field("trust_forwarded_for", &self.trust_forwarded_for)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    const BASE: [(&str, &str); 4] = [
        ("DATABASE_URL", "postgres://localhost/eventhub"),
        ("ACCESS_TOKEN_SECRET", "access-secret"),
        ("REFRESH_TOKEN_SECRET", "refresh-secret"),
        ("COOKIE_SECRET", "cookie-secret"),
    ];

    #[test]
    fn test_reports_every_missing_variable() {
        let err = Config::from_lookup(lookup(&[("DATABASE_URL", "postgres://x")])).unwrap_err();
        match err {
            ConfigError::Missing(keys) => assert_eq!(
                keys,
                vec!["ACCESS_TOKEN_SECRET", "REFRESH_TOKEN_SECRET", "COOKIE_SECRET"]
            ),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&BASE)).unwrap();
        assert_eq!(config.bind_address, "0.0.0.0:3000");
        assert_eq!(config.session_transport, TransportKind::Cookie);
        assert!(config.cookie_secure);
        assert_eq!(config.cookie_same_site, SameSite::None);
        assert!(config.resend_api_key.is_none());
        assert!(config.allowed_origins.is_empty());
        assert_eq!(config.log_format, LogFormat::Pretty);
        assert_eq!(config.rate_limit_max_requests.get(), 500);
        assert_eq!(config.rate_limit_window_secs, 900);
        assert!(!config.trust_forwarded_for);
    }

    #[test]
    fn test_optional_overrides() {
        let mut pairs = BASE.to_vec();
        pairs.extend([
            ("SESSION_TRANSPORT", "header"),
            ("COOKIE_SAME_SITE", "Strict"),
            ("COOKIE_SECURE", "false"),
            ("ALLOWED_ORIGINS", "https://a.example, https://b.example ,"),
            ("PASSWORD_HASH_ITERATIONS", "3"),
        ]);
        let config = Config::from_lookup(lookup(&pairs)).unwrap();
        assert_eq!(config.session_transport, TransportKind::Header);
        assert_eq!(config.cookie_same_site, SameSite::Strict);
        assert!(!config.cookie_secure);
        assert_eq!(
            config.allowed_origins,
            vec!["https://a.example", "https://b.example"]
        );
        assert_eq!(config.password_hash.iterations, 3);
    }

    #[test]
    fn test_rejects_unknown_transport() {
        let mut pairs = BASE.to_vec();
        pairs.push(("SESSION_TRANSPORT", "carrier-pigeon"));
        let err = Config::from_lookup(lookup(&pairs)).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                key: "SESSION_TRANSPORT",
                ..
            }
        ));
    }

    #[test]
    fn test_rate_limit_overrides_and_bounds() {
        let mut pairs = BASE.to_vec();
        pairs.extend([
            ("RATE_LIMIT_MAX_REQUESTS", "20"),
            ("RATE_LIMIT_WINDOW_SECS", "60"),
            ("TRUST_FORWARDED_FOR", "true"),
        ]);
        let config = Config::from_lookup(lookup(&pairs)).unwrap();
        assert_eq!(config.rate_limit_max_requests.get(), 20);
        assert_eq!(config.rate_limit_window_secs, 60);
        assert!(config.trust_forwarded_for);

        for (key, value) in [
            ("RATE_LIMIT_MAX_REQUESTS", "0"),
            ("RATE_LIMIT_WINDOW_SECS", "0"),
        ] {
            let mut pairs = BASE.to_vec();
            pairs.push((key, value));
            let err = Config::from_lookup(lookup(&pairs)).unwrap_err();
            assert!(
                matches!(err, ConfigError::Invalid { key: k, .. } if k == key),
                "{key}: {err:?}"
            );
        }
    }

    #[test]
    fn test_debug_hides_secrets() {
        let config = Config::from_lookup(lookup(&BASE)).unwrap();
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("access-secret"));
        assert!(!rendered.contains("cookie-secret"));
        assert!(!rendered.contains("postgres://"));
    }

    #[test]
    #[serial]
    fn test_from_env_reads_process_environment() {
        for (key, value) in BASE {
            std::env::set_var(key, value);
        }
        std::env::set_var("BIND_ADDRESS", "127.0.0.1:8080");

        let config = Config::from_env().unwrap();
        assert_eq!(config.bind_address, "127.0.0.1:8080");
        assert_eq!(config.refresh_token_secret, "refresh-secret");

        std::env::remove_var("BIND_ADDRESS");
    }
}
