//! Report Renderer input — the thin contract between the screening core and
//! the external report renderer: ordered results, threshold, requirement,
//! and a display-only map of manually entered emails.

use std::collections::HashMap;

use serde::Serialize;

use crate::screening::models::{ResultRow, ResultView, ScreeningRow};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportInput {
    pub screening_id: String,
    pub job_requirement: String,
    pub threshold: i32,
    /// Persisted (input) order; the renderer decides its own layout.
    pub results: Vec<ResultView>,
    /// File name → manually entered email. Display only — send-state on the
    /// result rows stays authoritative.
    pub manual_emails: HashMap<String, String>,
}

/// Assembles the renderer input. A caller-supplied manual-email entry wins
/// over one reconstructed from persisted manual sends.
pub fn build_report_input(
    screening: ScreeningRow,
    results: Vec<ResultRow>,
    supplied_manual_emails: Option<HashMap<String, String>>,
) -> ReportInput {
    let mut manual_emails: HashMap<String, String> = results
        .iter()
        .filter(|r| r.email_type.as_deref() == Some("manual"))
        .filter_map(|r| {
            r.email_sent_to
                .clone()
                .map(|email| (r.file_name.clone(), email))
        })
        .collect();
    if let Some(supplied) = supplied_manual_emails {
        manual_emails.extend(supplied);
    }

    ReportInput {
        screening_id: screening.screening_id,
        job_requirement: screening.job_requirement,
        threshold: screening.threshold,
        results: results.into_iter().map(ResultView::from).collect(),
        manual_emails,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn screening() -> ScreeningRow {
        ScreeningRow {
            screening_id: "SCR-9".to_string(),
            job_requirement: "Rust".to_string(),
            threshold: 60,
            total_analyzed: 2,
            eligible_count: 1,
            invitations_sent: 0,
            manual_emails_sent: 1,
            created_by: Uuid::new_v4(),
            created_at: Utc::now(),
        }
    }

    fn sent_result(position: i32, file_name: &str, email_type: Option<&str>, to: Option<&str>) -> ResultRow {
        ResultRow {
            screening_id: "SCR-9".to_string(),
            position,
            cv_file_id: Uuid::new_v4(),
            file_name: file_name.to_string(),
            match_score: 70,
            matching_requirements: vec![],
            missing_requirements: vec![],
            extracted_email: None,
            eligible: true,
            error: None,
            email_sent: email_type.is_some(),
            email_sent_to: to.map(String::from),
            email_sent_at: email_type.map(|_| Utc::now()),
            email_type: email_type.map(String::from),
        }
    }

    #[test]
    fn test_report_preserves_persisted_order() {
        let input = build_report_input(
            screening(),
            vec![
                sent_result(0, "b.pdf", None, None),
                sent_result(1, "a.pdf", None, None),
            ],
            None,
        );
        let order: Vec<&str> = input.results.iter().map(|r| r.file_name.as_str()).collect();
        assert_eq!(order, vec!["b.pdf", "a.pdf"]);
        assert_eq!(input.threshold, 60);
    }

    #[test]
    fn test_manual_map_reconstructed_and_overridden() {
        let supplied = HashMap::from([("a.pdf".to_string(), "typed@x.io".to_string())]);
        let input = build_report_input(
            screening(),
            vec![
                sent_result(0, "a.pdf", Some("manual"), Some("old@x.io")),
                sent_result(1, "b.pdf", Some("extracted"), Some("found@x.io")),
            ],
            Some(supplied),
        );
        // supplied entry wins; extracted sends never enter the manual map
        assert_eq!(input.manual_emails.get("a.pdf").map(String::as_str), Some("typed@x.io"));
        assert!(!input.manual_emails.contains_key("b.pdf"));
    }
}
