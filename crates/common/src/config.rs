//! Application configuration.

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Server configuration.
    pub server: ServerConfig,
    /// Database configuration.
    pub database: DatabaseConfig,
    /// Upload storage configuration.
    #[serde(default)]
    pub storage: StorageSettings,
    /// Outbound mail configuration.
    #[serde(default)]
    pub mail: MailConfig,
    /// Payment gateway configuration.
    #[serde(default)]
    pub payments: PaymentsConfig,
    /// Client cookie configuration.
    #[serde(default)]
    pub cookies: CookieConfig,
    /// Public ratings configuration.
    #[serde(default)]
    pub ratings: RatingsConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to bind to.
    #[serde(default = "default_port")]
    pub port: u16,
    /// External base URL, used for links in emails and gateway callbacks.
    pub url: String,
    /// Log output format: `pretty` or `json`.
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

/// Database connection configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// `PostgreSQL` connection URL.
    pub url: String,
    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Minimum number of connections in the pool.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

/// Upload storage configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageSettings {
    /// Root directory for uploaded files.
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,
    /// Maximum request body size for uploads.
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
    /// Lowercase file extensions accepted for upload.
    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,
    /// Bounding box edge of generated thumbnails, in pixels.
    #[serde(default = "default_thumbnail_size")]
    pub thumbnail_size: u32,
    /// JPEG quality of generated thumbnails.
    #[serde(default = "default_thumbnail_quality")]
    pub thumbnail_quality: u8,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            upload_dir: default_upload_dir(),
            max_upload_bytes: default_max_upload_bytes(),
            allowed_extensions: default_allowed_extensions(),
            thumbnail_size: default_thumbnail_size(),
            thumbnail_quality: default_thumbnail_quality(),
        }
    }
}

/// SMTP mail configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MailConfig {
    /// SMTP relay host.
    #[serde(default = "default_smtp_host")]
    pub smtp_host: String,
    /// SMTP relay port.
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    /// Use STARTTLS on the relay connection.
    #[serde(default = "default_true")]
    pub starttls: bool,
    /// SMTP username.
    #[serde(default)]
    pub username: Option<String>,
    /// SMTP password.
    #[serde(default)]
    pub password: Option<String>,
    /// Default sender, e.g. `TaskDesk <no-reply@example.com>`.
    #[serde(default)]
    pub sender: Option<String>,
    /// Log outgoing mail instead of sending it.
    #[serde(default)]
    pub suppress_send: bool,
    /// SMTP timeout in seconds.
    #[serde(default = "default_mail_timeout")]
    pub timeout_secs: u64,
    /// Logo embedded inline in receipts.
    #[serde(default)]
    pub logo_path: Option<PathBuf>,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            smtp_host: default_smtp_host(),
            smtp_port: default_smtp_port(),
            starttls: true,
            username: None,
            password: None,
            sender: None,
            suppress_send: false,
            timeout_secs: default_mail_timeout(),
            logo_path: None,
        }
    }
}

/// Pesapal gateway configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentsConfig {
    /// Consumer key issued by the gateway.
    #[serde(default)]
    pub consumer_key: String,
    /// Consumer secret issued by the gateway.
    #[serde(default)]
    pub consumer_secret: String,
    /// Use the sandbox environment.
    #[serde(default = "default_true")]
    pub use_sandbox: bool,
    /// Registered IPN notification id.
    #[serde(default)]
    pub ipn_id: String,
    /// URL the payer is returned to. Defaults to `{server.url}/payments/return`.
    #[serde(default)]
    pub callback_url: Option<String>,
    /// URL used when the payer cancels. Defaults to the callback URL.
    #[serde(default)]
    pub cancellation_url: Option<String>,
    /// Default currency for orders without one.
    #[serde(default = "default_currency")]
    pub default_currency: String,
    /// Gateway request timeout in seconds.
    #[serde(default = "default_gateway_timeout")]
    pub timeout_secs: u64,
    /// Lifetime assumed for a gateway token.
    #[serde(default = "default_token_ttl")]
    pub token_ttl_secs: u64,
    /// Tokens are refreshed this many seconds before they expire.
    #[serde(default = "default_token_refresh_margin")]
    pub token_refresh_margin_secs: u64,
}

impl Default for PaymentsConfig {
    fn default() -> Self {
        Self {
            consumer_key: String::new(),
            consumer_secret: String::new(),
            use_sandbox: true,
            ipn_id: String::new(),
            callback_url: None,
            cancellation_url: None,
            default_currency: default_currency(),
            timeout_secs: default_gateway_timeout(),
            token_ttl_secs: default_token_ttl(),
            token_refresh_margin_secs: default_token_refresh_margin(),
        }
    }
}

/// Client cookie configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CookieConfig {
    /// Mark cookies `Secure`.
    #[serde(default)]
    pub secure: bool,
    /// Lifetime of the consent and locale cookies, in days.
    #[serde(default = "default_cookie_days")]
    pub max_age_days: i64,
}

impl Default for CookieConfig {
    fn default() -> Self {
        Self {
            secure: false,
            max_age_days: default_cookie_days(),
        }
    }
}

/// Ratings configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RatingsConfig {
    /// Minimum seconds between two ratings from the same user or IP.
    #[serde(default = "default_rating_throttle")]
    pub throttle_seconds: i64,
    /// How long the public summary is served from cache.
    #[serde(default = "default_rating_summary_ttl")]
    pub summary_ttl_secs: u64,
}

impl Default for RatingsConfig {
    fn default() -> Self {
        Self {
            throttle_seconds: default_rating_throttle(),
            summary_ttl_secs: default_rating_summary_ttl(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

const fn default_port() -> u16 {
    3000
}

fn default_log_format() -> String {
    "pretty".to_string()
}

const fn default_max_connections() -> u32 {
    20
}

const fn default_min_connections() -> u32 {
    2
}

fn default_upload_dir() -> PathBuf {
    PathBuf::from("./uploads")
}

const fn default_max_upload_bytes() -> usize {
    50 * 1024 * 1024
}

fn default_allowed_extensions() -> Vec<String> {
    [
        "pdf", "doc", "docx", "xls", "xlsx", "ppt", "pptx", "txt", "zip", "png", "jpg", "jpeg",
    ]
    .iter()
    .map(ToString::to_string)
    .collect()
}

const fn default_thumbnail_size() -> u32 {
    320
}

const fn default_thumbnail_quality() -> u8 {
    82
}

fn default_smtp_host() -> String {
    "smtp.gmail.com".to_string()
}

const fn default_smtp_port() -> u16 {
    587
}

const fn default_mail_timeout() -> u64 {
    15
}

fn default_currency() -> String {
    "UGX".to_string()
}

const fn default_gateway_timeout() -> u64 {
    20
}

const fn default_token_ttl() -> u64 {
    280
}

const fn default_token_refresh_margin() -> u64 {
    30
}

const fn default_cookie_days() -> i64 {
    365
}

const fn default_rating_throttle() -> i64 {
    60
}

const fn default_rating_summary_ttl() -> u64 {
    60
}

const fn default_true() -> bool {
    true
}

impl Config {
    /// Load configuration from files and environment variables.
    ///
    /// Configuration is loaded in the following order:
    /// 1. `config/default.toml`
    /// 2. `config/{environment}.toml` (based on `TASKDESK_ENV`)
    /// 3. `config/local.toml`
    /// 4. Environment variables with `TASKDESK__` prefix
    pub fn load() -> Result<Self, config::ConfigError> {
        let env = std::env::var("TASKDESK_ENV").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{env}")).required(false))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(
                config::Environment::with_prefix("TASKDESK")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("storage.allowed_extensions")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Load configuration from a specific file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(
                config::Environment::with_prefix("TASKDESK")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Gateway callback URL, falling back to the server's return route.
    #[must_use]
    pub fn payment_callback_url(&self) -> String {
        self.payments.callback_url.clone().unwrap_or_else(|| {
            format!("{}/payments/return", self.server.url.trim_end_matches('/'))
        })
    }
}
