use std::env;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://sandbox-api-pay.line.me";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_RATE_LIMIT_RPM: u32 = 120;
const DEFAULT_UPSTREAM_TIMEOUT_SECS: u64 = 20;

/// Where `/confirm` reads `transactionId` and `amount` from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConfirmInput {
    /// JSON body on `POST /confirm`
    #[default]
    Body,
    /// Query string on `GET /confirm`
    Query,
}

impl FromStr for ConfirmInput {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "body" | "json" => Ok(ConfirmInput::Body),
            "query" => Ok(ConfirmInput::Query),
            other => Err(ConfigError::InvalidValue("CONFIRM_INPUT", other.to_string())),
        }
    }
}

/// How a successful (or failed) confirmation is presented to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConfirmView {
    /// Upstream JSON relayed as-is
    #[default]
    Json,
    /// Rendered HTML page
    Html,
}

impl FromStr for ConfirmView {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(ConfirmView::Json),
            "html" => Ok(ConfirmView::Html),
            other => Err(ConfigError::InvalidValue("CONFIRM_VIEW", other.to_string())),
        }
    }
}

#[derive(Clone)]
pub struct RelayConfig {
    /// LINE Pay channel id, sent as `X-LINE-ChannelId`
    pub channel_id: String,
    /// LINE Pay channel secret (HMAC key). Never logged.
    pub channel_secret: Vec<u8>,
    /// Upstream API base URL, without trailing slash
    pub base_url: String,
    /// Server port
    pub port: u16,
    pub confirm_input: ConfirmInput,
    pub confirm_view: ConfirmView,
    /// CORS allowed origins
    pub allowed_origins: Vec<String>,
    /// Rate limit requests per minute
    pub rate_limit_rpm: u32,
    /// Timeout for each outbound call to the gateway
    pub upstream_timeout: Duration,
    /// Directory to serve static files from (None = don't serve)
    pub static_dir: Option<String>,
    /// Bearer token required for /metrics endpoint (None = public)
    pub metrics_token: Option<String>,
}

impl std::fmt::Debug for RelayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayConfig")
            .field("channel_id", &self.channel_id)
            .field("channel_secret", &"[REDACTED]")
            .field("base_url", &self.base_url)
            .field("port", &self.port)
            .field("confirm_input", &self.confirm_input)
            .field("confirm_view", &self.confirm_view)
            .field("allowed_origins", &self.allowed_origins)
            .field("rate_limit_rpm", &self.rate_limit_rpm)
            .field("upstream_timeout", &self.upstream_timeout)
            .field("static_dir", &self.static_dir)
            .field(
                "metrics_token",
                &self.metrics_token.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

impl RelayConfig {
    /// Minimal config for a given channel and upstream; everything else defaulted.
    pub fn new(
        channel_id: impl Into<String>,
        channel_secret: impl Into<Vec<u8>>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            channel_id: channel_id.into(),
            channel_secret: channel_secret.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            port: DEFAULT_PORT,
            confirm_input: ConfirmInput::default(),
            confirm_view: ConfirmView::default(),
            allowed_origins: default_origins(),
            rate_limit_rpm: DEFAULT_RATE_LIMIT_RPM,
            upstream_timeout: Duration::from_secs(DEFAULT_UPSTREAM_TIMEOUT_SECS),
            static_dir: None,
            metrics_token: None,
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the config from an arbitrary variable source.
    ///
    /// Empty values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let get_either = |key: &str, alias: &str| get(key).or_else(|| get(alias));

        // Required: channel credentials
        let channel_id = get_either("LINE_CHANNEL_ID", "CHANNEL_ID")
            .ok_or(ConfigError::MissingRequired("LINE_CHANNEL_ID"))?;
        let channel_secret = get_either("LINE_CHANNEL_SECRET", "CHANNEL_SECRET")
            .ok_or(ConfigError::MissingRequired("LINE_CHANNEL_SECRET"))?
            .into_bytes();

        // Optional: upstream base URL
        let base_url = get_either("LINE_PAY_BASE_URL", "BASE_URL")
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let parsed =
            Url::parse(&base_url).map_err(|_| ConfigError::InvalidUrl(base_url.clone()))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidUrl(base_url));
        }
        let base_url = base_url.trim_end_matches('/').to_string();

        let port = parse_or("PORT", get("PORT"), DEFAULT_PORT)?;

        let confirm_input: ConfirmInput = get("CONFIRM_INPUT")
            .map(|v| v.parse())
            .transpose()?
            .unwrap_or_default();
        let confirm_view: ConfirmView = get("CONFIRM_VIEW")
            .map(|v| v.parse())
            .transpose()?
            .unwrap_or_default();

        let allowed_origins: Vec<String> = get("ALLOWED_ORIGINS")
            .map(|s| {
                s.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_else(default_origins);

        let rate_limit_rpm = parse_or(
            "RATE_LIMIT_RPM",
            get("RATE_LIMIT_RPM"),
            DEFAULT_RATE_LIMIT_RPM,
        )?;
        if rate_limit_rpm == 0 {
            return Err(ConfigError::InvalidValue("RATE_LIMIT_RPM", "0".to_string()));
        }

        let timeout_secs = parse_or(
            "UPSTREAM_TIMEOUT_SECS",
            get("UPSTREAM_TIMEOUT_SECS"),
            DEFAULT_UPSTREAM_TIMEOUT_SECS,
        )?;
        if timeout_secs == 0 {
            return Err(ConfigError::InvalidValue("UPSTREAM_TIMEOUT_SECS", "0".to_string()));
        }

        let static_dir = get("STATIC_DIR");
        let metrics_token = get("METRICS_TOKEN");

        if channel_secret.len() < 16 {
            tracing::warn!(
                "LINE_CHANNEL_SECRET is unusually short ({} bytes), check the value copied from the merchant console",
                channel_secret.len()
            );
        }

        if base_url == DEFAULT_BASE_URL {
            tracing::info!("LINE_PAY_BASE_URL not set, using sandbox endpoint");
        }

        if metrics_token.is_none() {
            tracing::warn!("METRICS_TOKEN not set, /metrics endpoint is publicly accessible");
        }

        Ok(Self {
            channel_id,
            channel_secret,
            base_url,
            port,
            confirm_input,
            confirm_view,
            allowed_origins,
            rate_limit_rpm,
            upstream_timeout: Duration::from_secs(timeout_secs),
            static_dir,
            metrics_token,
        })
    }
}

fn default_origins() -> Vec<String> {
    vec![
        "http://localhost:3000".to_string(),
        "http://localhost:5173".to_string(),
    ]
}

fn parse_or<T: FromStr>(
    key: &'static str,
    value: Option<String>,
    default: T,
) -> Result<T, ConfigError> {
    match value {
        Some(v) => v
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(key, v)),
        None => Ok(default),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingRequired(&'static str),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("invalid value for {0}: {1}")]
    InvalidValue(&'static str, String),
}
