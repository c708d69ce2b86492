use std::result;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// The challenge is missing one of the fields a digest response needs
    #[error("Missing \"{0}\" in challenge: {1}")]
    MalformedChallenge(&'static str, String),
    #[error("Invalid header syntax: {0}")]
    InvalidHeaderSyntax(String),
    #[error("Unsupported digest algorithm: {0}")]
    UnsupportedAlgorithm(String),
    #[error("Unsupported qop value: {0}")]
    UnsupportedQop(String),
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    /// Any status the API contract does not define; never retried
    #[error("Unsupported response status {status}: {body}")]
    UnsupportedStatus { status: u16, body: String },
    #[error("Invalid header value: {0}")]
    InvalidHeaderValue(#[from] http::header::InvalidHeaderValue),
    #[error("Invalid token expiry: {0}")]
    InvalidExpiry(String),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = result::Result<T, Error>;

impl Error {
    /// True for the conditions a caller may fix by changing credentials
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Error::Unauthorized | Error::Forbidden(_))
    }
}
