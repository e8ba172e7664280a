//! CLI command implementations.

pub mod migrate;
pub mod seed;

/// Read `STOREFRONT_DATABASE_URL`, loading `.env` first.
fn database_url() -> Result<secrecy::SecretString, &'static str> {
    dotenvy::dotenv().ok();
    std::env::var("STOREFRONT_DATABASE_URL")
        .map(secrecy::SecretString::from)
        .map_err(|_| "STOREFRONT_DATABASE_URL not set")
}
