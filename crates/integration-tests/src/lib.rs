//! Integration tests for Caseforge.
//!
//! These run against a live storefront and are `#[ignore]`d by default.
//!
//! # Running Tests
//!
//! ```bash
//! cargo run -p caseforge-cli -- migrate
//! cargo run -p caseforge-storefront &
//! STOREFRONT_URL=http://localhost:3000 cargo test -p caseforge-integration-tests -- --ignored
//! ```
//!
//! Signed callbacks need the same `VNPAY_HASH_SECRET` the server uses.

use std::time::Duration;

use caseforge_storefront::services::vnpay::Params;
use caseforge_storefront::services::vnpay::signature::{self, SECURE_HASH_FIELD};
use secrecy::{ExposeSecret, SecretString};

/// Shared client and server location for a test.
pub struct TestContext {
    pub client: reqwest::Client,
    pub storefront_url: String,
}

impl TestContext {
    /// Build a context from `STOREFRONT_URL` (default `http://localhost:3000`).
    ///
    /// Redirects are not followed so return-URL tests can inspect them.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client cannot be built.
    #[must_use]
    pub fn new() -> Self {
        let storefront_url = std::env::var("STOREFRONT_URL")
            .unwrap_or_else(|_| "http://localhost:3000".to_string())
            .trim_end_matches('/')
            .to_string();
        let client = reqwest::Client::builder()
            .cookie_store(true)
            .redirect(reqwest::redirect::Policy::none())
            .timeout(Duration::from_secs(10))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            storefront_url,
        }
    }

    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.storefront_url)
    }

    /// The server's hash secret, if the test environment provides it.
    #[must_use]
    pub fn hash_secret() -> Option<SecretString> {
        std::env::var("VNPAY_HASH_SECRET")
            .ok()
            .filter(|s| !s.is_empty())
            .map(SecretString::from)
    }

    /// Query string for `params` with a signature under `secret`.
    ///
    /// # Errors
    ///
    /// Returns an error if the secret cannot key the HMAC.
    pub fn signed_query(
        params: &Params,
        secret: &SecretString,
    ) -> Result<String, signature::SignatureError> {
        let canonical = signature::canonicalize(params);
        let hash = signature::sign(&canonical, secret.expose_secret())?;
        Ok(format!("{canonical}&{SECURE_HASH_FIELD}={hash}"))
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}
