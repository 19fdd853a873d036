use anyhow::{Context, Result};

/// Application configuration loaded from environment variables.
/// Fails at startup if required variables are missing — never falls back to
/// ambient module-level state at request time.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub anthropic_api_key: String,
    pub mail_api_url: String,
    pub mail_api_key: String,
    pub mail_from: String,
    /// Base URL embedded in invitation emails, e.g. `https://app.devlupa.io`.
    pub registration_base_url: String,
    /// External command used to pull text out of legacy word-processor
    /// files. Invoked with a temp-file path as its only argument; expected
    /// to print extracted text on stdout. When unset, .doc/.docx inputs
    /// degrade with an extraction error instead of failing the batch.
    pub legacy_extractor_cmd: Option<String>,
    pub port: u16,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            database_url: require_env("DATABASE_URL")?,
            anthropic_api_key: require_env("ANTHROPIC_API_KEY")?,
            mail_api_url: require_env("MAIL_API_URL")?,
            mail_api_key: require_env("MAIL_API_KEY")?,
            mail_from: require_env("MAIL_FROM")?,
            registration_base_url: require_env("REGISTRATION_BASE_URL")?,
            legacy_extractor_cmd: std::env::var("LEGACY_EXTRACTOR_CMD").ok(),
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse::<u16>()
                .context("PORT must be a valid port number")?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}
