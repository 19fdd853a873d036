//! Notification Dispatcher — sends invitation emails and records send-state
//! on the screening record without ever double-inviting a candidate.
//!
//! Send-state transitions are conditional atomic updates (`... AND
//! email_sent = FALSE`), so two concurrent dispatch calls for the same
//! result race on the row and exactly one wins. Counters only ever move via
//! additive `SET x = x + $n` updates, never read-modify-write.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Postgres, Transaction};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::errors::AppError;
use crate::mailer::{invitation_email, MailSender};
use crate::screening::models::EmailType;
use crate::screening::queries::fetch_owned_screening;

static EMAIL_FORMAT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}$").unwrap()
});

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_FORMAT_RE.is_match(email)
}

// ────────────────────────────────────────────────────────────────────────────
// Single send
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SingleSendRequest {
    pub user_id: Uuid,
    pub email: String,
    /// Optional correlation back to an AnalysisResult row.
    pub screening_id: Option<String>,
    pub file_name: Option<String>,
    /// True when the admin typed the address; false when it was extracted
    /// from the CV text.
    #[serde(default)]
    pub is_manual: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SingleSendOutcome {
    pub message: String,
    pub screening_updated: bool,
}

/// Sends one invitation. When a screening + file name correlation is given,
/// marks that result sent and bumps the matching counter, but only if this
/// call is the one that transitions the row.
pub async fn send_single(
    db: &PgPool,
    mailer: &dyn MailSender,
    config: &Config,
    req: SingleSendRequest,
) -> Result<SingleSendOutcome, AppError> {
    let email = req.email.trim();
    if email.is_empty() || !is_valid_email(email) {
        return Err(AppError::Validation(format!(
            "'{email}' is not a valid email address"
        )));
    }

    // Ownership is checked before the external send so a Forbidden request
    // has no side effects.
    if let Some(screening_id) = &req.screening_id {
        fetch_owned_screening(db, screening_id, req.user_id).await?;
    }

    let (subject, body) = invitation_email(&config.registration_base_url, email);
    mailer
        .send(email, &subject, &body)
        .await
        .map_err(|e| AppError::ExternalService(format!("failed to send email: {e}")))?;

    let email_type = if req.is_manual {
        EmailType::Manual
    } else {
        EmailType::Extracted
    };

    let mut screening_updated = false;
    if let (Some(screening_id), Some(file_name)) = (&req.screening_id, &req.file_name) {
        let mut tx = db.begin().await?;
        if mark_result_sent(&mut tx, screening_id, file_name, email, email_type).await? {
            bump_counters(
                &mut tx,
                screening_id,
                if req.is_manual { 0 } else { 1 },
                if req.is_manual { 1 } else { 0 },
            )
            .await?;
            screening_updated = true;
        } else {
            warn!(
                "Screening {screening_id}: no unsent result matched '{file_name}', \
                 counters left untouched"
            );
        }
        tx.commit().await?;
    }

    info!("Invitation sent to {email} (screening updated: {screening_updated})");
    Ok(SingleSendOutcome {
        message: format!("Registration link sent to {email}"),
        screening_updated,
    })
}

// ────────────────────────────────────────────────────────────────────────────
// Bulk send
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkEntry {
    pub email: String,
    pub file_name: Option<String>,
    #[serde(default)]
    pub is_manual: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryStatus {
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    pub sent: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkSendOutcome {
    pub statuses: Vec<EntryStatus>,
    pub sent: i32,
    pub failed: i32,
    pub extracted_sent: i32,
    pub manual_sent: i32,
}

/// A delivery that went out and may still need its persisted state recorded.
#[derive(Debug, Clone)]
pub(crate) struct Delivery {
    pub email: String,
    pub file_name: Option<String>,
    pub is_manual: bool,
}

/// Sends invitations to every entry independently, then records send-state
/// and counter deltas in one transaction.
///
/// The external sends are not transactional: if the commit fails after
/// deliveries went out, persisted state shows nothing sent even though some
/// recipients received mail. That asymmetry is accepted and logged.
pub async fn send_bulk(
    db: &PgPool,
    mailer: &dyn MailSender,
    config: &Config,
    screening_id: &str,
    entries: Vec<BulkEntry>,
    user_id: Uuid,
) -> Result<BulkSendOutcome, AppError> {
    if entries.is_empty() {
        return Err(AppError::Validation("no entries to send".to_string()));
    }
    fetch_owned_screening(db, screening_id, user_id).await?;

    let (statuses, deliveries) = attempt_deliveries(mailer, config, entries).await;

    let mut extracted_delta: i32 = 0;
    let mut manual_delta: i32 = 0;

    let mut tx = db.begin().await?;

    for delivery in &deliveries {
        let email_type = if delivery.is_manual {
            EmailType::Manual
        } else {
            EmailType::Extracted
        };
        // Uncorrelated entries count on delivery alone; correlated ones only
        // when this call actually transitioned the row.
        let counted = match &delivery.file_name {
            None => true,
            Some(file_name) => {
                mark_result_sent(&mut tx, screening_id, file_name, &delivery.email, email_type)
                    .await?
            }
        };
        if counted {
            if delivery.is_manual {
                manual_delta += 1;
            } else {
                extracted_delta += 1;
            }
        }
    }

    // Counters move once with the aggregate deltas, not per entry.
    if extracted_delta > 0 || manual_delta > 0 {
        bump_counters(&mut tx, screening_id, extracted_delta, manual_delta).await?;
    }
    // If the commit fails here, recipients already got mail but no state
    // changed; the log line is the only record of that asymmetry.
    tx.commit().await.map_err(|e| {
        warn!(
            "Screening {screening_id}: {} delivery(ies) went out but persistence failed: {e}",
            deliveries.len()
        );
        AppError::Database(e)
    })?;

    let sent = statuses.iter().filter(|s| s.sent).count() as i32;
    let failed = statuses.len() as i32 - sent;
    info!(
        "Screening {screening_id}: bulk dispatch sent={sent} failed={failed} \
         (extracted +{extracted_delta}, manual +{manual_delta})"
    );

    Ok(BulkSendOutcome {
        statuses,
        sent,
        failed,
        extracted_sent: extracted_delta,
        manual_sent: manual_delta,
    })
}

/// Delivery phase: validates and sends each entry independently. Invalid
/// addresses fail without a delivery attempt; provider failures fail that
/// entry and the loop continues.
pub(crate) async fn attempt_deliveries(
    mailer: &dyn MailSender,
    config: &Config,
    entries: Vec<BulkEntry>,
) -> (Vec<EntryStatus>, Vec<Delivery>) {
    let mut statuses = Vec::with_capacity(entries.len());
    let mut deliveries = Vec::new();

    for entry in entries {
        let email = entry.email.trim().to_string();
        if !is_valid_email(&email) {
            statuses.push(EntryStatus {
                email,
                file_name: entry.file_name,
                sent: false,
                error: Some("invalid email format".to_string()),
            });
            continue;
        }

        let (subject, body) = invitation_email(&config.registration_base_url, &email);
        match mailer.send(&email, &subject, &body).await {
            Ok(()) => {
                deliveries.push(Delivery {
                    email: email.clone(),
                    file_name: entry.file_name.clone(),
                    is_manual: entry.is_manual,
                });
                statuses.push(EntryStatus {
                    email,
                    file_name: entry.file_name,
                    sent: true,
                    error: None,
                });
            }
            Err(e) => {
                warn!("Bulk dispatch: delivery to {email} failed: {e}");
                statuses.push(EntryStatus {
                    email,
                    file_name: entry.file_name,
                    sent: false,
                    error: Some(e.to_string()),
                });
            }
        }
    }

    (statuses, deliveries)
}

// ────────────────────────────────────────────────────────────────────────────
// Persistence primitives
// ────────────────────────────────────────────────────────────────────────────

/// Transitions one unsent result row for `file_name` to sent. The
/// `email_sent = FALSE` guard makes the transition exactly-once under
/// concurrent dispatch; returns whether this call won it. When a batch holds
/// duplicate file names, the earliest unsent position is the one updated.
async fn mark_result_sent(
    tx: &mut Transaction<'_, Postgres>,
    screening_id: &str,
    file_name: &str,
    email: &str,
    email_type: EmailType,
) -> Result<bool, AppError> {
    let updated = sqlx::query(
        r#"
        UPDATE screening_results
        SET email_sent = TRUE, email_sent_to = $1, email_sent_at = now(), email_type = $2
        WHERE screening_id = $3 AND file_name = $4 AND email_sent = FALSE
          AND position = (
              SELECT min(position) FROM screening_results
              WHERE screening_id = $3 AND file_name = $4 AND email_sent = FALSE
          )
        "#,
    )
    .bind(email)
    .bind(email_type.as_str())
    .bind(screening_id)
    .bind(file_name)
    .execute(&mut **tx)
    .await?;

    Ok(updated.rows_affected() == 1)
}

/// Additive counter update, the only way counters ever change.
async fn bump_counters(
    tx: &mut Transaction<'_, Postgres>,
    screening_id: &str,
    extracted_delta: i32,
    manual_delta: i32,
) -> Result<(), AppError> {
    sqlx::query(
        r#"
        UPDATE cv_screenings
        SET invitations_sent = invitations_sent + $1,
            manual_emails_sent = manual_emails_sent + $2
        WHERE screening_id = $3
        "#,
    )
    .bind(extracted_delta)
    .bind(manual_delta)
    .bind(screening_id)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mailer::MailError;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[test]
    fn test_email_validation_accepts_common_shapes() {
        assert!(is_valid_email("jane@example.com"));
        assert!(is_valid_email("jane.doe+cv@mail.example.co"));
        assert!(is_valid_email("a_b-c%d@sub.domain.io"));
    }

    #[test]
    fn test_email_validation_rejects_malformed() {
        assert!(!is_valid_email(""));
        assert!(!is_valid_email("not-an-email"));
        assert!(!is_valid_email("missing@tld"));
        assert!(!is_valid_email("two words@example.com"));
    }

    /// Mail fake that records recipients and fails for chosen addresses.
    struct RecordingMailer {
        sent: Mutex<Vec<String>>,
        fail_for: Vec<String>,
    }

    impl RecordingMailer {
        fn new(fail_for: &[&str]) -> Self {
            Self {
                sent: Mutex::new(vec![]),
                fail_for: fail_for.iter().map(|s| s.to_string()).collect(),
            }
        }
    }

    #[async_trait]
    impl MailSender for RecordingMailer {
        async fn send(&self, to: &str, _subject: &str, _body: &str) -> Result<(), MailError> {
            if self.fail_for.iter().any(|f| f == to) {
                return Err(MailError::Api {
                    status: 502,
                    message: "provider unavailable".to_string(),
                });
            }
            self.sent.lock().unwrap().push(to.to_string());
            Ok(())
        }
    }

    fn test_config() -> Config {
        Config {
            database_url: "postgres://unused".to_string(),
            anthropic_api_key: "unused".to_string(),
            mail_api_url: "http://unused".to_string(),
            mail_api_key: "unused".to_string(),
            mail_from: "noreply@example.com".to_string(),
            registration_base_url: "https://app.example.com".to_string(),
            legacy_extractor_cmd: None,
            port: 0,
            rust_log: "info".to_string(),
        }
    }

    fn entry(email: &str, file_name: Option<&str>, is_manual: bool) -> BulkEntry {
        BulkEntry {
            email: email.to_string(),
            file_name: file_name.map(String::from),
            is_manual,
        }
    }

    #[tokio::test]
    async fn test_attempt_deliveries_skips_invalid_without_sending() {
        let mailer = RecordingMailer::new(&[]);
        let (statuses, deliveries) = attempt_deliveries(
            &mailer,
            &test_config(),
            vec![entry("bogus", Some("a.pdf"), false), entry("ok@x.io", None, true)],
        )
        .await;

        assert_eq!(statuses.len(), 2);
        assert!(!statuses[0].sent);
        assert_eq!(statuses[0].error.as_deref(), Some("invalid email format"));
        assert!(statuses[1].sent);

        assert_eq!(deliveries.len(), 1);
        assert_eq!(mailer.sent.lock().unwrap().as_slice(), ["ok@x.io"]);
    }

    #[tokio::test]
    async fn test_attempt_deliveries_failure_does_not_abort_loop() {
        let mailer = RecordingMailer::new(&["down@x.io"]);
        let (statuses, deliveries) = attempt_deliveries(
            &mailer,
            &test_config(),
            vec![
                entry("first@x.io", Some("a.pdf"), false),
                entry("down@x.io", Some("b.pdf"), false),
                entry("last@x.io", Some("c.pdf"), true),
            ],
        )
        .await;

        let sent_flags: Vec<bool> = statuses.iter().map(|s| s.sent).collect();
        assert_eq!(sent_flags, vec![true, false, true]);
        assert!(statuses[1].error.as_deref().unwrap().contains("502"));

        let delivered: Vec<&str> = deliveries.iter().map(|d| d.email.as_str()).collect();
        assert_eq!(delivered, vec!["first@x.io", "last@x.io"]);
        assert!(deliveries[1].is_manual);
    }

    #[tokio::test]
    async fn test_send_single_rejects_malformed_email_before_any_send() {
        let mailer = RecordingMailer::new(&[]);
        let pool = sqlx::postgres::PgPoolOptions::new()
            .connect_lazy("postgres://localhost/unused")
            .unwrap();

        let err = send_single(
            &pool,
            &mailer,
            &test_config(),
            SingleSendRequest {
                user_id: Uuid::new_v4(),
                email: "   ".to_string(),
                screening_id: None,
                file_name: None,
                is_manual: false,
            },
        )
        .await
        .unwrap_err();

        assert!(matches!(err, AppError::Validation(_)));
        assert!(mailer.sent.lock().unwrap().is_empty());
    }
}
