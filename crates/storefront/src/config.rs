//! Storefront configuration loaded from environment variables.
//!
//! The configuration is read once at startup and handed to each adapter;
//! nothing reads the environment after `from_env` returns.
//!
//! # Environment Variables
//!
//! ## Required
//! - `STOREFRONT_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)
//! - `STOREFRONT_BASE_URL` - Public URL for the storefront
//! - `VNPAY_TMN_CODE` - VNPay merchant (terminal) code
//! - `VNPAY_HASH_SECRET` - VNPay shared signing secret
//! - `GHN_TOKEN` - GHN API token
//! - `GHN_SHOP_ID` - GHN shop ID
//! - `GHN_FROM_DISTRICT_ID` - GHN district ID of the warehouse
//!
//! ## Optional
//! - `STOREFRONT_HOST` - Bind address (default: 127.0.0.1)
//! - `STOREFRONT_PORT` - Listen port (default: 3000)
//! - `STOREFRONT_ASSET_DIR` - Root directory for uploaded design assets (default: ./uploads)
//! - `STOREFRONT_ADMIN_TOKEN` - Bearer token for the shipment back-office routes
//!   (unset: those routes refuse every request)
//! - `STOREFRONT_TRUST_PROXY` - Take the client IP from `X-Forwarded-For` /
//!   `X-Real-IP` (default: false; only enable behind a proxy that sets them)
//! - `VNPAY_PAYMENT_URL` - Gateway payment page (default: sandbox)
//! - `VNPAY_RETURN_URL` - Browser return URL (default: `{base_url}/api/payments/vnpay/return`)
//! - `GHN_API_URL` - GHN API base URL (default: GHN dev environment)
//! - `GHN_FROM_WARD_CODE` - GHN ward code of the warehouse
//! - `GHN_TIMEOUT_SECS` - Timeout for each GHN request (default: 15)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name
//! - `SENTRY_SAMPLE_RATE` - Error sample rate (default: 1.0)
//! - `SENTRY_TRACES_SAMPLE_RATE` - Transaction sample rate (default: 0.0)

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;

/// VNPay sandbox payment page.
pub const VNPAY_SANDBOX_URL: &str = "https://sandbox.vnpayment.vn/paymentv2/vpcpay.html";

/// GHN development environment.
pub const GHN_DEV_URL: &str = "https://dev-online-gateway.ghn.vn/shiip/public-api";

const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.0;

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "your_",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "xxx",
    "todo",
    "fixme",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Storefront application configuration.
#[derive(Debug, Clone)]
pub struct StorefrontConfig {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: SecretString,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Public base URL for the storefront (no trailing slash)
    pub base_url: String,
    /// Root directory for uploaded design assets
    pub asset_dir: PathBuf,
    /// Bearer token for shipment back-office routes
    pub admin_token: Option<SecretString>,
    /// Whether forwarding headers carry the real client address
    pub trust_proxy_headers: bool,
    /// VNPay gateway configuration
    pub vnpay: VnpayConfig,
    /// GHN carrier configuration
    pub ghn: GhnConfig,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment name
    pub sentry_environment: Option<String>,
    /// Fraction of errors sent to Sentry
    pub sentry_sample_rate: f32,
    /// Fraction of transactions traced
    pub sentry_traces_sample_rate: f32,
}

/// VNPay payment gateway configuration.
///
/// Implements `Debug` manually to redact the hash secret.
#[derive(Clone)]
pub struct VnpayConfig {
    /// Merchant terminal code (`vnp_TmnCode`)
    pub tmn_code: String,
    /// Shared HMAC secret
    pub hash_secret: SecretString,
    /// Gateway payment page the customer is redirected to
    pub payment_url: String,
    /// Where the gateway sends the customer's browser afterwards
    pub return_url: String,
}

impl std::fmt::Debug for VnpayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VnpayConfig")
            .field("tmn_code", &self.tmn_code)
            .field("hash_secret", &"[REDACTED]")
            .field("payment_url", &self.payment_url)
            .field("return_url", &self.return_url)
            .finish()
    }
}

/// GHN carrier API configuration.
///
/// Implements `Debug` manually to redact the API token.
#[derive(Clone)]
pub struct GhnConfig {
    /// API base URL (no trailing slash)
    pub api_url: String,
    /// API token (`Token` header)
    pub token: SecretString,
    /// Shop ID (`ShopId` header)
    pub shop_id: String,
    /// Warehouse district
    pub from_district_id: i32,
    /// Warehouse ward
    pub from_ward_code: Option<String>,
    /// Per-request timeout
    pub timeout: Duration,
}

impl std::fmt::Debug for GhnConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GhnConfig")
            .field("api_url", &self.api_url)
            .field("token", &"[REDACTED]")
            .field("shop_id", &self.shop_id)
            .field("from_district_id", &self.from_district_id)
            .field("from_ward_code", &self.from_ward_code)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl StorefrontConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if secrets fail validation (placeholder detection, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let database_url = get_database_url("STOREFRONT_DATABASE_URL")?;
        let host = parse_env("STOREFRONT_HOST", "127.0.0.1")?;
        let port = parse_env("STOREFRONT_PORT", "3000")?;
        let base_url = get_required_env("STOREFRONT_BASE_URL")?
            .trim_end_matches('/')
            .to_string();
        let asset_dir = PathBuf::from(get_env_or_default("STOREFRONT_ASSET_DIR", "./uploads"));

        let admin_token = get_optional_env("STOREFRONT_ADMIN_TOKEN")
            .map(|token| {
                validate_secret_strength(&token, "STOREFRONT_ADMIN_TOKEN")?;
                Ok::<_, ConfigError>(SecretString::from(token))
            })
            .transpose()?;
        let trust_proxy_headers = parse_env("STOREFRONT_TRUST_PROXY", "false")?;

        let vnpay = VnpayConfig::from_env(&base_url)?;
        let ghn = GhnConfig::from_env()?;

        Ok(Self {
            database_url,
            host,
            port,
            base_url,
            asset_dir,
            admin_token,
            trust_proxy_headers,
            vnpay,
            ghn,
            sentry_dsn: get_optional_env("SENTRY_DSN"),
            sentry_environment: get_optional_env("SENTRY_ENVIRONMENT"),
            sentry_sample_rate: parse_env("SENTRY_SAMPLE_RATE", "1.0")?,
            sentry_traces_sample_rate: parse_env("SENTRY_TRACES_SAMPLE_RATE", "0.0")?,
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

impl VnpayConfig {
    fn from_env(base_url: &str) -> Result<Self, ConfigError> {
        let payment_url = get_env_or_default("VNPAY_PAYMENT_URL", VNPAY_SANDBOX_URL);

        Ok(Self {
            tmn_code: get_required_env("VNPAY_TMN_CODE")?,
            hash_secret: get_validated_secret("VNPAY_HASH_SECRET")?,
            payment_url,
            return_url: get_optional_env("VNPAY_RETURN_URL")
                .unwrap_or_else(|| format!("{base_url}/api/payments/vnpay/return")),
        })
    }
}

impl GhnConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let timeout_secs: u64 = parse_env("GHN_TIMEOUT_SECS", "15")?;

        Ok(Self {
            api_url: get_env_or_default("GHN_API_URL", GHN_DEV_URL)
                .trim_end_matches('/')
                .to_string(),
            token: get_validated_secret("GHN_TOKEN")?,
            shop_id: get_required_env("GHN_SHOP_ID")?,
            from_district_id: get_required_env("GHN_FROM_DISTRICT_ID")?
                .parse()
                .map_err(|e: std::num::ParseIntError| {
                    ConfigError::InvalidEnvVar("GHN_FROM_DISTRICT_ID".to_string(), e.to_string())
                })?,
            from_ward_code: get_optional_env("GHN_FROM_WARD_CODE"),
            timeout: Duration::from_secs(timeout_secs),
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable. Empty values count as missing.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get database URL with fallback to generic `DATABASE_URL`.
fn get_database_url(primary_key: &str) -> Result<SecretString, ConfigError> {
    if let Ok(value) = std::env::var(primary_key) {
        return Ok(SecretString::from(value));
    }
    if let Ok(value) = std::env::var("DATABASE_URL") {
        return Ok(SecretString::from(value));
    }
    Err(ConfigError::MissingEnvVar(primary_key.to_string()))
}

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    get_optional_env(key).unwrap_or_else(|| default.to_string())
}

/// Parse an environment variable (or its default) into `T`.
fn parse_env<T>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    get_env_or_default(key, default)
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.chars().count() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)]
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
///
/// The signing secret is the only thing standing between a forged callback
/// and a "paid" order, so an empty or sample value must stop startup.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1})"
            ),
        ));
    }

    Ok(())
}

/// Load and validate a secret from environment.
fn get_validated_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    validate_secret_strength(&value, key)?;
    Ok(SecretString::from(value))
}

#[cfg(test)]
pub(crate) const TEST_ADMIN_TOKEN: &str = "R4ZT8WQK2MVN7HPD";

/// Configuration for in-process tests: carrier unreachable, assets under `asset_dir`.
#[cfg(test)]
pub(crate) fn test_config(asset_dir: &std::path::Path) -> StorefrontConfig {
    StorefrontConfig {
        database_url: SecretString::from("postgres://localhost/caseforge_test"),
        host: IpAddr::from([127, 0, 0, 1]),
        port: 3000,
        base_url: "http://localhost:3000".to_string(),
        asset_dir: asset_dir.to_path_buf(),
        admin_token: Some(SecretString::from(TEST_ADMIN_TOKEN)),
        trust_proxy_headers: false,
        vnpay: VnpayConfig {
            tmn_code: "CF2024TM".to_string(),
            hash_secret: SecretString::from("QX7RKM2ZP4VW9TLB8HNC3YDJ6FGS1AE0"),
            payment_url: VNPAY_SANDBOX_URL.to_string(),
            return_url: "http://localhost:3000/api/payments/vnpay/return".to_string(),
        },
        ghn: GhnConfig {
            api_url: "http://127.0.0.1:1".to_string(),
            token: SecretString::from("stub-token-5f1c9a"),
            shop_id: "885".to_string(),
            from_district_id: 1442,
            from_ward_code: Some("20109".to_string()),
            timeout: Duration::from_secs(2),
        },
        sentry_dsn: None,
        sentry_environment: None,
        sentry_sample_rate: 1.0,
        sentry_traces_sample_rate: 0.0,
    }
}
