//! Async client for Slide curtain motors.
//!
//! Two transports share one request dispatcher:
//!
//! * the cloud API, authenticated with a bearer token that is fetched from the
//!   login endpoint and refreshed once it expires;
//! * the local device API (JSON-RPC over HTTP), authenticated with an HTTP
//!   Digest handshake whenever the device answers 401.
//!
//! The digest engine is usable on its own.
//!
//! # Examples
//!
//! ```
//! use slide_api::{DigestChallenge, DigestContext, HttpMethod};
//!
//! // Value from the WWW-Authenticate header of a 401 response
//! let www_authenticate = r#"Digest realm="example.com", nonce="1234567890", qop="anything""#;
//!
//! // The client's digest counter; the session bumps it before every computation
//! let challenge = DigestChallenge::parse(www_authenticate, 1).unwrap();
//! assert_eq!(challenge.nc(), "00000001");
//!
//! let mut context = DigestContext::new("john", "password123", "/api/resource", HttpMethod::GET);
//! // For this example we inject a fixed cnonce. A fresh one is generated otherwise.
//! context.set_custom_cnonce("cnonce12");
//!
//! let answer = challenge.respond(&context).unwrap().to_string();
//! assert_eq!(answer, r#"Digest username="john", realm="example.com", nonce="1234567890", uri="/api/resource", algorithm="MD5", qop=anything, nc=00000001, cnonce="cnonce12", response="72e1084c844d652af6622aac994d54f8""#);
//! ```
//!
//! Talking to the cloud:
//!
//! ```no_run
//! use slide_api::{CloudConfig, HttpMethod, RequestOptions, SlideClient};
//!
//! # async fn run() -> slide_api::Result<()> {
//! let mut client = SlideClient::cloud(CloudConfig::new(Some("me@example.com"), Some("secret")))?;
//! let slides = client
//!     .request(HttpMethod::GET, "/slides/overview", None, RequestOptions::default())
//!     .await?;
//! println!("{}", slides);
//! # Ok(())
//! # }
//! ```

mod client;
mod config;
mod digest;
mod enums;
mod error;
mod session;
mod utils;

pub use error::{Error, Result};

pub use crate::client::{
    PriorRequest, RequestOptions, SlideClient, Transport, LOCAL_USERNAME, LOGIN_PATH,
};
pub use crate::config::{
    CloudConfig, LocalConfig, LocalEndpoints, DEFAULT_CLOUD_URL, DEFAULT_TIMEOUT,
    LOCAL_ENDPOINTS, PASSWORD_ENV, USERNAME_ENV,
};
pub use crate::digest::{
    compute_digest, parse_challenge, parse_header_map, AuthorizationHeader, DigestChallenge,
    DigestContext, SUPPORTED_QOP,
};
pub use crate::session::{parse_expiry, AuthSession, LoginResponse};

pub use crate::enums::*;

#[test]
fn test_parse_respond() {
    let src = r#"
    Digest
       realm="example.com",
       nonce="1234567890",
       qop="anything",
       algorithm=MD5
    "#;

    let mut context = DigestContext::new("john", "password123", "/api/resource", HttpMethod::GET);
    context.set_custom_cnonce("cnonce12");

    let prompt = crate::parse_challenge(src, 1).unwrap();
    let answer = prompt.respond(&context).unwrap();

    let str = answer.to_string().replace(", ", ",\n  ");

    assert_eq!(
        str,
        r#"
Digest username="john",
  realm="example.com",
  nonce="1234567890",
  uri="/api/resource",
  algorithm="MD5",
  qop=anything,
  nc=00000001,
  cnonce="cnonce12",
  response="72e1084c844d652af6622aac994d54f8"
"#
        .trim()
    );
}

#[test]
fn test_local_endpoints() {
    assert_eq!(LOCAL_ENDPOINTS.info, "/rpc/Slide.GetInfo");
    assert_eq!(LOCAL_ENDPOINTS.stop, "/rpc/Slide.Stop");
    assert_eq!(LOCAL_ENDPOINTS.position, "/rpc/Slide.SetPos");
    assert_eq!(LOCAL_ENDPOINTS.calibrate, "/rpc/Slide.Calibrate");
    assert_eq!(LOCAL_ENDPOINTS.wifi, "/rpc/Slide.Config.WiFi");
}
