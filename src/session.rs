use crate::{Error, Result};
use std::fmt;

use chrono::{DateTime, NaiveDateTime, Utc};
use http::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use serde::Deserialize;

/// Per-client authentication state
#[derive(Clone)]
pub struct AuthSession {
    /// Empty until a login succeeds
    pub(crate) access_token: String,
    pub(crate) token_expiry: Option<DateTime<Utc>>,
    /// Digest computations made by this client
    pub(crate) nonce_count: u32,
    pub(crate) headers: HeaderMap,
}

impl AuthSession {
    pub fn new() -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        Self {
            access_token: String::new(),
            token_expiry: None,
            nonce_count: 0,
            headers,
        }
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    pub fn token_expiry(&self) -> Option<DateTime<Utc>> {
        self.token_expiry
    }

    pub fn nonce_count(&self) -> u32 {
        self.nonce_count
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// A token is usable when present and not past its expiry
    pub fn has_valid_token(&self, now: DateTime<Utc>) -> bool {
        !self.access_token.is_empty() && self.token_expiry.is_some_and(|expiry| expiry > now)
    }

    /// Store a bearer token and advertise it on outgoing requests
    pub(crate) fn set_bearer(&mut self, token: String, expiry: DateTime<Utc>) -> Result<()> {
        self.headers
            .insert(AUTHORIZATION, sensitive_value(&format!("Bearer {}", token))?);
        self.access_token = token;
        self.token_expiry = Some(expiry);
        Ok(())
    }

    /// Store a digest answer; it is sent as-is on the next request
    pub(crate) fn set_digest(&mut self, authorization: String) -> Result<()> {
        self.headers
            .insert(AUTHORIZATION, sensitive_value(&authorization)?);
        self.access_token = authorization;
        Ok(())
    }

    /// Forget the token so the next `ensure_authenticated` logs in again
    pub(crate) fn expire(&mut self) {
        self.token_expiry = None;
    }

    /// Bump the digest counter and return the value to bind into the next challenge
    pub(crate) fn next_nonce_count(&mut self) -> u32 {
        self.nonce_count = self.nonce_count.wrapping_add(1);
        self.nonce_count
    }
}

impl fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let token = if self.access_token.is_empty() {
            ""
        } else {
            "<redacted>"
        };
        f.debug_struct("AuthSession")
            .field("access_token", &token)
            .field("token_expiry", &self.token_expiry)
            .field("nonce_count", &self.nonce_count)
            .field("headers", &self.headers)
            .finish()
    }
}

fn sensitive_value(value: &str) -> Result<HeaderValue> {
    let mut value = HeaderValue::from_str(value)?;
    value.set_sensitive(true);
    Ok(value)
}

impl Default for AuthSession {
    fn default() -> Self {
        Self::new()
    }
}

/// Body of a successful cloud login
#[derive(Debug, Deserialize, PartialEq)]
pub struct LoginResponse {
    pub access_token: String,
    pub expires_at: String,
}

impl LoginResponse {
    pub fn expiry(&self) -> Result<DateTime<Utc>> {
        parse_expiry(&self.expires_at)
    }
}

/// Parse the API's `YYYY-MM-DD HH:MM:SS` timestamps (UTC); RFC 3339 is accepted too
pub fn parse_expiry(value: &str) -> Result<DateTime<Utc>> {
    if let Ok(naive) = NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S") {
        return Ok(naive.and_utc());
    }
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| Error::InvalidExpiry(value.to_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn test_new_session() {
        let session = AuthSession::new();

        assert_eq!(session.access_token(), "");
        assert_eq!(session.token_expiry(), None);
        assert_eq!(session.nonce_count(), 0);
        assert_eq!(session.headers().len(), 2);
        assert_eq!(session.headers()[CONTENT_TYPE], "application/json");
        assert_eq!(session.headers()[ACCEPT], "application/json");
    }

    #[test]
    fn test_token_validity() {
        let now = Utc::now();
        let mut session = AuthSession::new();
        assert!(!session.has_valid_token(now));

        session.set_bearer("token1".into(), now + Duration::hours(1)).unwrap();
        assert!(session.has_valid_token(now));
        assert_eq!(session.headers()[AUTHORIZATION], "Bearer token1");

        session.set_bearer("token1".into(), now - Duration::hours(1)).unwrap();
        assert!(!session.has_valid_token(now));

        session.set_bearer("token2".into(), now + Duration::hours(1)).unwrap();
        session.expire();
        assert!(!session.has_valid_token(now));
        assert_eq!(session.access_token(), "token2");
    }

    #[test]
    fn test_debug_hides_credentials() {
        let mut session = AuthSession::new();
        session
            .set_bearer("secret-token".into(), Utc::now() + Duration::hours(1))
            .unwrap();
        assert!(session.headers()[AUTHORIZATION].is_sensitive());

        let printed = format!("{:?}", session);
        assert!(!printed.contains("secret-token"), "{}", printed);
        assert!(printed.contains("<redacted>"));

        session.set_digest(r#"Digest username="user", response="abc123""#.into()).unwrap();
        assert!(session.headers()[AUTHORIZATION].is_sensitive());
        assert!(!format!("{:?}", session).contains("abc123"));
    }

    #[test]
    fn test_nonce_count() {
        let mut session = AuthSession::new();
        assert_eq!(session.next_nonce_count(), 1);
        assert_eq!(session.next_nonce_count(), 2);
        assert_eq!(session.nonce_count(), 2);
    }

    #[test]
    fn test_parse_expiry() {
        assert_eq!(
            parse_expiry("2022-01-01 00:00:00").unwrap(),
            Utc.with_ymd_and_hms(2022, 1, 1, 0, 0, 0).unwrap()
        );
        assert_eq!(
            parse_expiry("2030-06-02T23:53:00+02:00").unwrap(),
            Utc.with_ymd_and_hms(2030, 6, 2, 21, 53, 0).unwrap()
        );
        assert!(matches!(
            parse_expiry("tomorrow"),
            Err(Error::InvalidExpiry(v)) if v == "tomorrow"
        ));
    }

    #[test]
    fn test_login_response() {
        let body = r#"{"access_token": "token3", "expires_at": "2022-01-01 00:00:00"}"#;
        let parsed: LoginResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.access_token, "token3");
        assert_eq!(
            parsed.expiry().unwrap(),
            Utc.with_ymd_and_hms(2022, 1, 1, 0, 0, 0).unwrap()
        );
    }
}
