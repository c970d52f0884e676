//! How session tokens travel between client and server
//!
//! The auth core never touches cookies or headers directly; it talks to a
//! `SessionTransport`. Cookies are the default, bearer headers suit
//! non-browser clients.

use axum::http::{
    header::{AUTHORIZATION, COOKIE, SET_COOKIE},
    HeaderMap, HeaderName, HeaderValue,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use time::{macros::format_description, OffsetDateTime, UtcOffset};

use super::tokens::{TokenPair, ACCESS_TOKEN_TTL, REFRESH_TOKEN_TTL};

type HmacSha256 = Hmac<Sha256>;

pub const ACCESS_COOKIE: &str = "access";
pub const REFRESH_COOKIE: &str = "refresh";

pub const ACCESS_TOKEN_HEADER: HeaderName = HeaderName::from_static("x-access-token");
pub const REFRESH_TOKEN_HEADER: HeaderName = HeaderName::from_static("x-refresh-token");

/// Whatever the client presented; either may be absent
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionTokens {
    pub access: Option<String>,
    pub refresh: Option<String>,
}

pub trait SessionTransport: Send + Sync {
    fn extract(&self, headers: &HeaderMap) -> SessionTokens;
    fn attach(&self, headers: &mut HeaderMap, pair: &TokenPair);
    fn revoke(&self, headers: &mut HeaderMap);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

impl SameSite {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "strict" => Some(SameSite::Strict),
            "lax" => Some(SameSite::Lax),
            "none" => Some(SameSite::None),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SameSite::Strict => "Strict",
            SameSite::Lax => "Lax",
            SameSite::None => "None",
        }
    }
}

/// Two HttpOnly cookies whose values are signed as `s:<value>.<signature>`
pub struct CookieTransport {
    secret: Vec<u8>,
    secure: bool,
    same_site: SameSite,
}

impl CookieTransport {
    pub fn new(secret: &str, secure: bool, same_site: SameSite) -> Self {
        Self {
            secret: secret.as_bytes().to_vec(),
            secure,
            same_site,
        }
    }

    fn mac(&self) -> Option<HmacSha256> {
        HmacSha256::new_from_slice(&self.secret).ok()
    }

    pub fn sign(&self, value: &str) -> String {
        let signature = self
            .mac()
            .map(|mut mac| {
                mac.update(value.as_bytes());
                URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes())
            })
            .unwrap_or_default();
        format!("s:{value}.{signature}")
    }

    /// The signed value, or `None` if the signature does not hold
    pub fn unsign(&self, signed: &str) -> Option<String> {
        let (value, signature) = signed.strip_prefix("s:")?.rsplit_once('.')?;
        let signature = URL_SAFE_NO_PAD.decode(signature).ok()?;
        let mut mac = self.mac()?;
        mac.update(value.as_bytes());
        mac.verify_slice(&signature).ok()?;
        Some(value.to_string())
    }

    fn read_cookie(&self, headers: &HeaderMap, name: &str) -> Option<String> {
        headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|h| h.to_str().ok())
            .flat_map(|h| h.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(key, _)| key.trim() == name)
            .and_then(|(_, value)| {
                let signed = value.trim();
                let unsigned = self.unsign(signed);
                if unsigned.is_none() && !signed.is_empty() {
                    tracing::warn!(cookie = name, "Discarding cookie with bad signature");
                }
                unsigned
            })
            .filter(|v| !v.is_empty())
    }

    fn cookie(&self, name: &str, value: &str, expires: OffsetDateTime, max_age: i64) -> String {
        let mut cookie = format!(
            "{name}={value}; Path=/; Expires={}; Max-Age={max_age}; HttpOnly",
            http_date(expires)
        );
        if self.secure {
            cookie.push_str("; Secure");
        }
        cookie.push_str("; SameSite=");
        cookie.push_str(self.same_site.as_str());
        cookie
    }

    fn append(headers: &mut HeaderMap, cookie: String) {
        match HeaderValue::from_str(&cookie) {
            Ok(value) => {
                headers.append(SET_COOKIE, value);
            }
            Err(e) => tracing::error!(error = %e, "Session cookie is not a valid header value"),
        }
    }
}

impl SessionTransport for CookieTransport {
    fn extract(&self, headers: &HeaderMap) -> SessionTokens {
        SessionTokens {
            access: self.read_cookie(headers, ACCESS_COOKIE),
            refresh: self.read_cookie(headers, REFRESH_COOKIE),
        }
    }

    fn attach(&self, headers: &mut HeaderMap, pair: &TokenPair) {
        let access = self.cookie(
            ACCESS_COOKIE,
            &self.sign(&pair.access_token),
            pair.access_expires_at,
            ACCESS_TOKEN_TTL.whole_seconds(),
        );
        let refresh = self.cookie(
            REFRESH_COOKIE,
            &self.sign(&pair.refresh_token),
            pair.refresh_expires_at,
            REFRESH_TOKEN_TTL.whole_seconds(),
        );
        Self::append(headers, access);
        Self::append(headers, refresh);
    }

    fn revoke(&self, headers: &mut HeaderMap) {
        for name in [ACCESS_COOKIE, REFRESH_COOKIE] {
            let cookie = self.cookie(name, "", OffsetDateTime::UNIX_EPOCH, 0);
            Self::append(headers, cookie);
        }
    }
}

/// `Authorization: Bearer` plus `X-Refresh-Token` in, `X-Access-Token` and
/// `X-Refresh-Token` out
#[derive(Debug, Default)]
pub struct HeaderTransport;

impl SessionTransport for HeaderTransport {
    fn extract(&self, headers: &HeaderMap) -> SessionTokens {
        let access = headers
            .get(AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .and_then(|v| {
                let v = v.trim();
                v.strip_prefix("Bearer ").or_else(|| v.strip_prefix("bearer "))
            })
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());
        let refresh = headers
            .get(&REFRESH_TOKEN_HEADER)
            .and_then(|h| h.to_str().ok())
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());
        SessionTokens { access, refresh }
    }

    fn attach(&self, headers: &mut HeaderMap, pair: &TokenPair) {
        for (name, token) in [
            (ACCESS_TOKEN_HEADER, &pair.access_token),
            (REFRESH_TOKEN_HEADER, &pair.refresh_token),
        ] {
            match HeaderValue::from_str(token) {
                Ok(value) => {
                    headers.insert(name, value);
                }
                Err(e) => tracing::error!(error = %e, "Token is not a valid header value"),
            }
        }
    }

    /// Header clients discard tokens themselves
    fn revoke(&self, _headers: &mut HeaderMap) {}
}

/// IMF-fixdate, e.g. `Wed, 01 May 2024 12:00:00 GMT`
fn http_date(at: OffsetDateTime) -> String {
    let format = format_description!(
        "[weekday repr:short], [day] [month repr:short] [year] [hour]:[minute]:[second] GMT"
    );
    at.to_offset(UtcOffset::UTC)
        .format(format)
        .unwrap_or_else(|_| "Thu, 01 Jan 1970 00:00:00 GMT".to_string())
}
