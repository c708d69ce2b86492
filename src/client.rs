use crate::config::{CloudConfig, LocalConfig};
use crate::digest::{compute_digest, DigestChallenge};
use crate::enums::HttpMethod;
use crate::session::{AuthSession, LoginResponse};
use crate::{Error, Result};
use std::fmt;
use std::time::Duration;

use chrono::Utc;
use http::header::{HeaderMap, AUTHORIZATION, WWW_AUTHENTICATE};
use http::StatusCode;
use serde_json::{json, Value};
use tracing::{debug, warn};

/// Digest username the device expects; the device code is the password
pub const LOCAL_USERNAME: &str = "user";

/// Cloud login path, relative to the API root
pub const LOGIN_PATH: &str = "/auth/login";

/// How many times one call may re-authenticate after a 401
const AUTH_RETRIES: u32 = 1;

/// How the client proves its identity; fixed when the client is built
#[derive(Clone, PartialEq)]
pub enum Transport {
    /// Bearer token from the cloud login endpoint, refreshed on expiry
    Cloud { username: String, password: String },
    /// HTTP Digest handshake against the device itself
    Local { device_code: String },
}

impl fmt::Debug for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transport::Cloud { username, .. } => f
                .debug_struct("Cloud")
                .field("username", username)
                .finish_non_exhaustive(),
            Transport::Local { .. } => f.debug_struct("Local").finish_non_exhaustive(),
        }
    }
}

/// Per-call knobs of [`SlideClient::request`]
#[derive(Debug, Clone)]
pub struct RequestOptions {
    /// Replace same-named session headers for this call
    pub headers: Option<HeaderMap>,
    pub verify_ssl: bool,
    /// Never log in; a 401 fails immediately
    pub skip_login: bool,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            headers: None,
            verify_ssl: true,
            skip_login: false,
        }
    }
}

impl RequestOptions {
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = Some(headers);
        self
    }

    pub fn insecure(mut self) -> Self {
        self.verify_ssl = false;
        self
    }

    pub fn skip_login(mut self) -> Self {
        self.skip_login = true;
        self
    }
}

/// The call that was rejected with 401, replayed for the digest handshake
#[derive(Debug, Clone)]
pub struct PriorRequest {
    pub method: HttpMethod,
    pub url_suffix: String,
    pub headers: Option<HeaderMap>,
    pub verify_ssl: bool,
}

/// Client for one Slide account (cloud) or one device (local)
#[derive(Debug)]
pub struct SlideClient {
    transport: Transport,
    base_url: String,
    timeout: Duration,
    session: AuthSession,
    http: reqwest::Client,
    insecure_http: reqwest::Client,
}

impl SlideClient {
    pub fn cloud(config: CloudConfig) -> Result<Self> {
        Self::new(
            Transport::Cloud {
                username: config.username,
                password: config.password,
            },
            config.base_url,
            config.timeout,
        )
    }

    pub fn local(config: LocalConfig) -> Result<Self> {
        Self::new(
            Transport::Local {
                device_code: config.device_code,
            },
            config.base_url,
            config.timeout,
        )
    }

    fn new(transport: Transport, base_url: String, timeout: Duration) -> Result<Self> {
        Ok(Self {
            transport,
            base_url: base_url.trim_end_matches('/').to_owned(),
            timeout,
            session: AuthSession::new(),
            http: reqwest::Client::builder().build()?,
            insecure_http: reqwest::Client::builder()
                .danger_accept_invalid_certs(true)
                .build()?,
        })
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn session(&self) -> &AuthSession {
        &self.session
    }

    /// Account name for the cloud, the fixed digest user for a device
    pub fn username(&self) -> &str {
        match &self.transport {
            Transport::Cloud { username, .. } => username,
            Transport::Local { .. } => LOCAL_USERNAME,
        }
    }

    /// Make sure a usable credential is in place and return it.
    ///
    /// The cloud transport logs in when the token is missing or expired.
    /// The local transport only authenticates in response to a 401, so this
    /// returns whatever is stored.
    pub async fn ensure_authenticated(&mut self) -> Result<String> {
        match self.transport {
            Transport::Cloud { .. } => {
                if self.session.has_valid_token(Utc::now()) {
                    return Ok(self.session.access_token.clone());
                }
                self.login(None).await
            }
            Transport::Local { .. } => Ok(self.session.access_token.clone()),
        }
    }

    /// Obtain fresh credentials and install them on the session.
    ///
    /// Cloud: posts the account credentials to [`LOGIN_PATH`]; `prior` is ignored.
    /// Local: answers the digest challenge for `prior`; without one the stored
    /// token is returned and nothing is sent.
    pub async fn login(&mut self, prior: Option<&PriorRequest>) -> Result<String> {
        if let Transport::Cloud { .. } = self.transport {
            return self.cloud_login().await;
        }

        match prior {
            None => Ok(self.session.access_token.clone()),
            Some(prior) => {
                let token = self
                    .request_digest_access_token(
                        prior.method,
                        &prior.url_suffix,
                        prior.headers.as_ref(),
                        prior.verify_ssl,
                    )
                    .await?;
                self.session.set_digest(token.clone())?;
                Ok(token)
            }
        }
    }

    async fn cloud_login(&mut self) -> Result<String> {
        let Transport::Cloud { username, password } = &self.transport else {
            return Err(Error::Unauthorized);
        };
        let body = json!({ "email": username, "password": password });

        let mut headers = self.session.headers.clone();
        headers.remove(AUTHORIZATION);

        debug!(base_url = %self.base_url, "logging in to cloud API");
        let response = self
            .send(HttpMethod::POST, LOGIN_PATH, Some(&body), &headers, true)
            .await?;
        let body = classify(response).await?;

        if is_empty_json(&body) {
            debug!("login returned no token, keeping the current one");
            return Ok(self.session.access_token.clone());
        }

        let login: LoginResponse = serde_json::from_value(body)?;
        let expiry = login.expiry()?;
        self.session.set_bearer(login.access_token, expiry)?;
        debug!(%expiry, "cloud token refreshed");

        Ok(self.session.access_token.clone())
    }

    /// Run the digest handshake for one request: send it without credentials,
    /// read the challenge from the 401 and compute the `Authorization` value
    /// to retry with.
    ///
    /// # Errors
    /// [`Error::Unauthorized`] if the server sends no `WWW-Authenticate` header
    pub async fn request_digest_access_token(
        &mut self,
        method: HttpMethod,
        url_suffix: &str,
        headers: Option<&HeaderMap>,
        verify_ssl: bool,
    ) -> Result<String> {
        let mut outgoing = self.outgoing_headers(headers);
        outgoing.remove(AUTHORIZATION);

        let response = self
            .send(method, url_suffix, None, &outgoing, verify_ssl)
            .await?;

        let Some(header) = response.headers().get(WWW_AUTHENTICATE) else {
            warn!(url_suffix, status = %response.status(), "no digest challenge in response");
            return Err(Error::Unauthorized);
        };
        let header = header
            .to_str()
            .map_err(|_| Error::InvalidHeaderSyntax(String::from_utf8_lossy(header.as_bytes()).into()))?
            .to_owned();

        let Transport::Local { device_code } = &self.transport else {
            warn!("digest handshake requested on the cloud transport");
            return Err(Error::Unauthorized);
        };

        let challenge = DigestChallenge::parse(&header, self.session.nonce_count().wrapping_add(1))?;
        self.session.next_nonce_count();
        let uri = format!("{}{}", self.base_url, url_suffix);
        debug!(url_suffix, nc = challenge.nc(), "answering digest challenge");

        compute_digest(LOCAL_USERNAME, device_code, &uri, method, &challenge)
    }

    /// Dispatch one API call and return its JSON body.
    ///
    /// A 401 triggers one re-authentication and one retry unless
    /// `skip_login` is set. Other non-200 statuses map to errors; transport
    /// errors are returned as they are.
    pub async fn request(
        &mut self,
        method: HttpMethod,
        url_suffix: &str,
        data: Option<&Value>,
        options: RequestOptions,
    ) -> Result<Value> {
        let mut retries = 0;

        loop {
            if !options.skip_login {
                self.ensure_authenticated().await?;
            }

            let headers = self.outgoing_headers(options.headers.as_ref());
            debug!(%method, url_suffix, attempt = retries + 1, "dispatching request");
            let response = self
                .send(method, url_suffix, data, &headers, options.verify_ssl)
                .await?;
            let status = response.status();

            if status != StatusCode::UNAUTHORIZED || options.skip_login {
                return classify(response).await;
            }
            drop(response);

            if retries >= AUTH_RETRIES {
                warn!(%method, url_suffix, "still unauthorized after re-authenticating");
                return Err(Error::Unauthorized);
            }
            retries += 1;

            // the server rejected the token, so it must not be trusted again
            self.session.expire();
            let prior = PriorRequest {
                method,
                url_suffix: url_suffix.to_owned(),
                headers: options.headers.clone(),
                verify_ssl: options.verify_ssl,
            };
            self.login(Some(&prior)).await?;
        }
    }

    fn outgoing_headers(&self, extra: Option<&HeaderMap>) -> HeaderMap {
        let mut headers = self.session.headers.clone();
        if let Some(extra) = extra {
            for (name, value) in extra {
                headers.insert(name.clone(), value.clone());
            }
        }
        headers
    }

    fn http_client(&self, verify_ssl: bool) -> &reqwest::Client {
        if verify_ssl {
            &self.http
        } else {
            &self.insecure_http
        }
    }

    /// Issue a single HTTP call; the connection goes back to the pool when the
    /// response is dropped
    async fn send(
        &self,
        method: HttpMethod,
        url_suffix: &str,
        data: Option<&Value>,
        headers: &HeaderMap,
        verify_ssl: bool,
    ) -> Result<reqwest::Response> {
        let mut builder = self
            .http_client(verify_ssl)
            .request(method.into(), format!("{}{}", self.base_url, url_suffix))
            .headers(headers.clone())
            .timeout(self.timeout);
        if let Some(data) = data {
            builder = builder.json(data);
        }

        Ok(builder.send().await?)
    }
}

/// Map a response status onto the body or an error
async fn classify(response: reqwest::Response) -> Result<Value> {
    match response.status() {
        StatusCode::OK => {
            let text = response.text().await?;
            if text.trim().is_empty() {
                Ok(Value::Null)
            } else {
                Ok(serde_json::from_str(&text)?)
            }
        }
        StatusCode::UNAUTHORIZED => Err(Error::Unauthorized),
        StatusCode::BAD_REQUEST => Err(Error::BadRequest(response.text().await?)),
        StatusCode::FORBIDDEN => Err(Error::Forbidden(response.text().await?)),
        other => Err(Error::UnsupportedStatus {
            status: other.as_u16(),
            body: response.text().await?,
        }),
    }
}

fn is_empty_json(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}
