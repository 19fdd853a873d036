use std::sync::Arc;

use sqlx::PgPool;

use crate::config::Config;
use crate::llm_client::LlmClient;
use crate::mailer::MailSender;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub llm: LlmClient,
    /// Pluggable mail backend. Production uses `HttpMailer`; tests swap in a
    /// recording fake.
    pub mailer: Arc<dyn MailSender>,
    pub config: Config,
}
