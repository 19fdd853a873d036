//! Row structs and response views for the screening domain.
//!
//! Rows mirror `schema.sql`; views are the camelCase JSON shapes returned to
//! clients. Persisted result order is input order (`position`); any sorted
//! ordering is produced at response time only.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Origin of a dispatched invitation email.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmailType {
    Extracted,
    Manual,
}

impl EmailType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmailType::Extracted => "extracted",
            EmailType::Manual => "manual",
        }
    }
}

/// One stored CV file. `file_data` lives in its own column and is only
/// fetched for downloads; list queries never select it.
#[derive(Debug, Clone, FromRow)]
pub struct CvFileRow {
    pub id: Uuid,
    pub original_name: String,
    pub media_type: String,
    pub file_size: i64,
    pub uploaded_by: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct ScreeningRow {
    pub screening_id: String,
    pub job_requirement: String,
    pub threshold: i32,
    pub total_analyzed: i32,
    pub eligible_count: i32,
    pub invitations_sent: i32,
    pub manual_emails_sent: i32,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
}

/// One per-document analysis result, embedded in a screening by
/// `(screening_id, position)`. Send-state fields are the only ones mutated
/// after creation, and only ever false→true.
#[derive(Debug, Clone, FromRow)]
pub struct ResultRow {
    pub screening_id: String,
    pub position: i32,
    pub cv_file_id: Uuid,
    pub file_name: String,
    pub match_score: i32,
    pub matching_requirements: Vec<String>,
    pub missing_requirements: Vec<String>,
    pub extracted_email: Option<String>,
    pub eligible: bool,
    pub error: Option<String>,
    pub email_sent: bool,
    pub email_sent_to: Option<String>,
    pub email_sent_at: Option<DateTime<Utc>>,
    pub email_type: Option<String>,
}

// ────────────────────────────────────────────────────────────────────────────
// Response views
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultView {
    pub cv_file_id: Uuid,
    pub file_name: String,
    pub match_score: i32,
    pub matching_requirements: Vec<String>,
    pub missing_requirements: Vec<String>,
    pub extracted_email: Option<String>,
    pub eligible: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub email_sent: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_sent_to: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_sent_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_type: Option<String>,
}

impl From<ResultRow> for ResultView {
    fn from(r: ResultRow) -> Self {
        ResultView {
            cv_file_id: r.cv_file_id,
            file_name: r.file_name,
            match_score: r.match_score,
            matching_requirements: r.matching_requirements,
            missing_requirements: r.missing_requirements,
            extracted_email: r.extracted_email,
            eligible: r.eligible,
            error: r.error,
            email_sent: r.email_sent,
            email_sent_to: r.email_sent_to,
            email_sent_at: r.email_sent_at,
            email_type: r.email_type,
        }
    }
}

/// One line of screening history.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreeningSummaryView {
    pub screening_id: String,
    pub job_requirement: String,
    pub threshold: i32,
    pub total_analyzed: i32,
    pub eligible_count: i32,
    pub invitations_sent: i32,
    pub manual_emails_sent: i32,
    pub total_sent: i32,
    pub remaining: i32,
    pub created_at: DateTime<Utc>,
}

impl From<ScreeningRow> for ScreeningSummaryView {
    fn from(s: ScreeningRow) -> Self {
        let total_sent = s.invitations_sent + s.manual_emails_sent;
        ScreeningSummaryView {
            screening_id: s.screening_id,
            job_requirement: s.job_requirement,
            threshold: s.threshold,
            total_analyzed: s.total_analyzed,
            eligible_count: s.eligible_count,
            invitations_sent: s.invitations_sent,
            manual_emails_sent: s.manual_emails_sent,
            total_sent,
            remaining: s.eligible_count - total_sent,
            created_at: s.created_at,
        }
    }
}

/// Per-screening breakdown counts shown on the detail view.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ScreeningBreakdown {
    pub eligible_with_email: i32,
    pub eligible_without_email: i32,
    pub eligible_email_sent: i32,
    pub extracted_emails_sent: i32,
    pub manual_emails_sent: i32,
}

impl ScreeningBreakdown {
    pub fn compute(screening: &ScreeningRow, results: &[ResultRow]) -> Self {
        let ok_eligible = |r: &&ResultRow| r.eligible && r.error.is_none();
        ScreeningBreakdown {
            eligible_with_email: results
                .iter()
                .filter(ok_eligible)
                .filter(|r| r.extracted_email.is_some())
                .count() as i32,
            eligible_without_email: results
                .iter()
                .filter(ok_eligible)
                .filter(|r| r.extracted_email.is_none())
                .count() as i32,
            eligible_email_sent: results
                .iter()
                .filter(ok_eligible)
                .filter(|r| r.email_sent)
                .count() as i32,
            extracted_emails_sent: screening.invitations_sent,
            manual_emails_sent: screening.manual_emails_sent,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreeningDetailView {
    #[serde(flatten)]
    pub summary: ScreeningSummaryView,
    /// Persisted (input) order.
    pub results: Vec<ResultView>,
    pub breakdown: ScreeningBreakdown,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(eligible: bool, error: Option<&str>, email: Option<&str>, sent: bool) -> ResultRow {
        ResultRow {
            screening_id: "SCR-1".to_string(),
            position: 0,
            cv_file_id: Uuid::new_v4(),
            file_name: "cv.pdf".to_string(),
            match_score: 50,
            matching_requirements: vec![],
            missing_requirements: vec![],
            extracted_email: email.map(String::from),
            eligible,
            error: error.map(String::from),
            email_sent: sent,
            email_sent_to: None,
            email_sent_at: None,
            email_type: None,
        }
    }

    fn screening(invitations_sent: i32, manual: i32, eligible_count: i32) -> ScreeningRow {
        ScreeningRow {
            screening_id: "SCR-1".to_string(),
            job_requirement: "Rust".to_string(),
            threshold: 45,
            total_analyzed: 0,
            eligible_count,
            invitations_sent,
            manual_emails_sent: manual,
            created_by: Uuid::new_v4(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_breakdown_counts_only_error_free_eligible() {
        let results = vec![
            result(true, None, Some("a@x.io"), true),
            result(true, None, None, false),
            // errored rows never count as eligible regardless of the flag
            result(true, Some("boom"), Some("b@x.io"), false),
            result(false, None, Some("c@x.io"), false),
        ];
        let breakdown = ScreeningBreakdown::compute(&screening(1, 0, 2), &results);
        assert_eq!(
            breakdown,
            ScreeningBreakdown {
                eligible_with_email: 1,
                eligible_without_email: 1,
                eligible_email_sent: 1,
                extracted_emails_sent: 1,
                manual_emails_sent: 0,
            }
        );
    }

    #[test]
    fn test_summary_total_sent_and_remaining() {
        let view = ScreeningSummaryView::from(screening(3, 2, 8));
        assert_eq!(view.total_sent, 5);
        assert_eq!(view.remaining, 3);
    }

    #[test]
    fn test_email_type_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&EmailType::Manual).unwrap(), "\"manual\"");
        assert_eq!(EmailType::Extracted.as_str(), "extracted");
    }
}
