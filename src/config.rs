use std::env;
use std::time::Duration;

/// Cloud API root
pub const DEFAULT_CLOUD_URL: &str = "https://api.goslide.io/api";

/// Total time budget of one dispatched call
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

pub const USERNAME_ENV: &str = "SLIDE_API_USERNAME";
pub const PASSWORD_ENV: &str = "SLIDE_API_PASSWORD";

/// Settings for the cloud transport
#[derive(Debug, Clone, PartialEq)]
pub struct CloudConfig {
    pub base_url: String,
    pub username: String,
    pub password: String,
    pub timeout: Duration,
}

impl CloudConfig {
    /// Credentials not given here are read from `SLIDE_API_USERNAME` / `SLIDE_API_PASSWORD`
    pub fn new(username: Option<&str>, password: Option<&str>) -> Self {
        let pick = |given: Option<&str>, var: &str| match given {
            Some(value) => value.to_owned(),
            None => env::var(var).unwrap_or_default(),
        };

        Self {
            base_url: DEFAULT_CLOUD_URL.to_owned(),
            username: pick(username, USERNAME_ENV),
            password: pick(password, PASSWORD_ENV),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Settings for talking to a device on the local network
#[derive(Debug, Clone, PartialEq)]
pub struct LocalConfig {
    /// e.g. `http://192.168.1.20`
    pub base_url: String,
    /// Code printed on the device; the digest password
    pub device_code: String,
    pub timeout: Duration,
}

impl LocalConfig {
    pub fn new(base_url: impl Into<String>, device_code: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            device_code: device_code.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// JSON-RPC paths served by the device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalEndpoints {
    pub info: &'static str,
    pub stop: &'static str,
    pub position: &'static str,
    pub calibrate: &'static str,
    pub wifi: &'static str,
}

pub const LOCAL_ENDPOINTS: LocalEndpoints = LocalEndpoints {
    info: "/rpc/Slide.GetInfo",
    stop: "/rpc/Slide.Stop",
    position: "/rpc/Slide.SetPos",
    calibrate: "/rpc/Slide.Calibrate",
    wifi: "/rpc/Slide.Config.WiFi",
};
