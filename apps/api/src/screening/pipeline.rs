//! Screening Aggregator — runs extraction + analysis over a batch of
//! uploaded CVs and persists the whole screening in one transaction.
//!
//! Per-document failures (unsupported format, extraction error, LLM error)
//! become degraded result rows and never abort the batch. Persistence-layer
//! failures roll back every file and the screening record together.

use chrono::Utc;
use serde::Serialize;
use sqlx::PgPool;
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::extraction::{extract_text, MediaType};
use crate::llm_client::LlmClient;
use crate::screening::analyzer::analyze_document;
use crate::screening::models::ResultView;

pub const DEFAULT_THRESHOLD: i32 = 45;

/// One uploaded document as it arrives from the multipart request.
pub struct InputDocument {
    pub file_name: String,
    pub content_type: Option<String>,
    pub data: Vec<u8>,
}

/// In-memory result for one document, before persistence.
#[derive(Debug, Clone)]
pub struct PendingResult {
    pub cv_file_id: Uuid,
    pub file_name: String,
    pub match_score: i32,
    pub matching_requirements: Vec<String>,
    pub missing_requirements: Vec<String>,
    pub extracted_email: Option<String>,
    pub eligible: bool,
    pub error: Option<String>,
}

impl PendingResult {
    /// Degraded result per the failure policy: zeroed analysis fields, the
    /// error message in `error`, never eligible.
    fn degraded(cv_file_id: Uuid, file_name: String, error: String) -> Self {
        PendingResult {
            cv_file_id,
            file_name,
            match_score: 0,
            matching_requirements: vec![],
            missing_requirements: vec![],
            extracted_email: None,
            eligible: false,
            error: Some(error),
        }
    }

    fn into_view(self) -> ResultView {
        ResultView {
            cv_file_id: self.cv_file_id,
            file_name: self.file_name,
            match_score: self.match_score,
            matching_requirements: self.matching_requirements,
            missing_requirements: self.missing_requirements,
            extracted_email: self.extracted_email,
            eligible: self.eligible,
            error: self.error,
            email_sent: false,
            email_sent_to: None,
            email_sent_at: None,
            email_type: None,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreeningOutcome {
    pub screening_id: String,
    /// Sorted for presentation; the persisted list keeps input order.
    pub results: Vec<ResultView>,
    pub total_analyzed: i32,
    pub eligible_count: i32,
    pub threshold_used: i32,
}

/// High-entropy screening identifier, `SCR-<unix-millis>-<suffix>`.
pub fn generate_screening_id() -> String {
    let suffix: String = Uuid::new_v4().simple().to_string().chars().take(9).collect();
    format!("SCR-{}-{}", Utc::now().timestamp_millis(), suffix)
}

pub fn eligible_count(results: &[PendingResult]) -> i32 {
    results
        .iter()
        .filter(|r| r.eligible && r.error.is_none())
        .count() as i32
}

/// Response ordering: eligible error-free results first by descending score,
/// then ineligible by descending score, errored results last in input order.
pub fn sort_for_response(mut results: Vec<ResultView>) -> Vec<ResultView> {
    results.sort_by_key(|r| {
        let rank = match (&r.error, r.eligible) {
            (Some(_), _) => 2,
            (None, true) => 0,
            (None, false) => 1,
        };
        (rank, -r.match_score)
    });
    results
}

/// Runs the full screening pipeline for one batch.
///
/// Documents are processed sequentially in input order; each one is stored,
/// extracted, and analyzed before the next begins. The transaction stays
/// open across the batch so a persistence failure anywhere leaves no file
/// and no screening behind.
pub async fn run_screening(
    db: &PgPool,
    llm: &LlmClient,
    legacy_extractor_cmd: Option<&str>,
    documents: Vec<InputDocument>,
    requirement: &str,
    threshold: Option<i32>,
    created_by: Uuid,
) -> Result<ScreeningOutcome, AppError> {
    let requirement = requirement.trim();
    if requirement.is_empty() {
        return Err(AppError::Validation("requirement is required".to_string()));
    }
    if documents.is_empty() {
        return Err(AppError::Validation(
            "at least one CV file is required".to_string(),
        ));
    }
    let threshold = threshold.unwrap_or(DEFAULT_THRESHOLD);
    if !(0..=100).contains(&threshold) {
        return Err(AppError::Validation(
            "threshold must be between 0 and 100".to_string(),
        ));
    }

    let screening_id = generate_screening_id();
    info!(
        "Screening {screening_id}: analyzing {} document(s), threshold {threshold}",
        documents.len()
    );

    let mut tx = db.begin().await?;
    let mut results: Vec<PendingResult> = Vec::with_capacity(documents.len());

    for doc in documents {
        let cv_file_id = Uuid::new_v4();
        let media_type = MediaType::resolve(doc.content_type.as_deref(), &doc.file_name);
        let stored_media_type = media_type
            .as_ref()
            .map(|m| m.as_str().to_string())
            .unwrap_or_else(|_| {
                doc.content_type
                    .clone()
                    .unwrap_or_else(|| "application/octet-stream".to_string())
            });

        sqlx::query(
            r#"
            INSERT INTO cv_files (id, original_name, file_data, media_type, file_size, uploaded_by)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(cv_file_id)
        .bind(&doc.file_name)
        .bind(&doc.data)
        .bind(&stored_media_type)
        .bind(doc.data.len() as i64)
        .bind(created_by)
        .execute(&mut *tx)
        .await?;

        let result = match media_type {
            Err(e) => {
                warn!("Screening {screening_id}: {}: {e}", doc.file_name);
                PendingResult::degraded(cv_file_id, doc.file_name, e.to_string())
            }
            Ok(media_type) => {
                match extract_text(media_type, &doc.data, legacy_extractor_cmd).await {
                    Err(e) => {
                        warn!("Screening {screening_id}: extraction failed for {}: {e}", doc.file_name);
                        PendingResult::degraded(cv_file_id, doc.file_name, e.to_string())
                    }
                    Ok(text) => match analyze_document(llm, requirement, &text).await {
                        Err(e) => {
                            warn!("Screening {screening_id}: analysis failed for {}: {e}", doc.file_name);
                            PendingResult::degraded(
                                cv_file_id,
                                doc.file_name,
                                format!("analysis failed: {e}"),
                            )
                        }
                        Ok(analysis) => PendingResult {
                            cv_file_id,
                            file_name: doc.file_name,
                            eligible: analysis.match_score >= threshold,
                            match_score: analysis.match_score,
                            matching_requirements: analysis.matching_requirements,
                            missing_requirements: analysis.missing_requirements,
                            extracted_email: analysis.extracted_email,
                            error: None,
                        },
                    },
                }
            }
        };
        results.push(result);
    }

    let total_analyzed = results.len() as i32;
    let eligible = eligible_count(&results);

    sqlx::query(
        r#"
        INSERT INTO cv_screenings
            (screening_id, job_requirement, threshold, total_analyzed, eligible_count, created_by)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(&screening_id)
    .bind(requirement)
    .bind(threshold)
    .bind(total_analyzed)
    .bind(eligible)
    .bind(created_by)
    .execute(&mut *tx)
    .await?;

    for (position, r) in results.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO screening_results
                (screening_id, position, cv_file_id, file_name, match_score,
                 matching_requirements, missing_requirements, extracted_email, eligible, error)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(&screening_id)
        .bind(position as i32)
        .bind(r.cv_file_id)
        .bind(&r.file_name)
        .bind(r.match_score)
        .bind(&r.matching_requirements)
        .bind(&r.missing_requirements)
        .bind(&r.extracted_email)
        .bind(r.eligible)
        .bind(&r.error)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    info!("Screening {screening_id}: persisted, {eligible}/{total_analyzed} eligible");

    let views = results.into_iter().map(PendingResult::into_view).collect();
    Ok(ScreeningOutcome {
        screening_id,
        results: sort_for_response(views),
        total_analyzed,
        eligible_count: eligible,
        threshold_used: threshold,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending(name: &str, score: i32, eligible: bool, error: Option<&str>) -> PendingResult {
        PendingResult {
            cv_file_id: Uuid::new_v4(),
            file_name: name.to_string(),
            match_score: score,
            matching_requirements: vec![],
            missing_requirements: vec![],
            extracted_email: None,
            eligible,
            error: error.map(String::from),
        }
    }

    fn names(views: &[ResultView]) -> Vec<&str> {
        views.iter().map(|v| v.file_name.as_str()).collect()
    }

    #[test]
    fn test_sort_eligible_then_ineligible_then_errored() {
        // Threshold-50 scenario: A scores 80 (eligible), B scores 40, C errored.
        let results = vec![
            pending("c.pdf", 0, false, Some("extraction failed")),
            pending("b.pdf", 40, false, None),
            pending("a.pdf", 80, true, None),
        ];
        let sorted = sort_for_response(results.into_iter().map(PendingResult::into_view).collect());
        assert_eq!(names(&sorted), vec!["a.pdf", "b.pdf", "c.pdf"]);
    }

    #[test]
    fn test_sort_descending_score_within_each_class() {
        let results = vec![
            pending("low.pdf", 50, true, None),
            pending("high.pdf", 90, true, None),
            pending("no1.pdf", 10, false, None),
            pending("no2.pdf", 30, false, None),
        ];
        let sorted = sort_for_response(results.into_iter().map(PendingResult::into_view).collect());
        assert_eq!(names(&sorted), vec!["high.pdf", "low.pdf", "no2.pdf", "no1.pdf"]);
    }

    #[test]
    fn test_sort_errored_keep_input_order() {
        let results = vec![
            pending("e1.pdf", 0, false, Some("x")),
            pending("ok.pdf", 70, true, None),
            pending("e2.pdf", 0, false, Some("y")),
        ];
        let sorted = sort_for_response(results.into_iter().map(PendingResult::into_view).collect());
        assert_eq!(names(&sorted), vec!["ok.pdf", "e1.pdf", "e2.pdf"]);
    }

    #[test]
    fn test_eligible_count_excludes_errored_rows() {
        let results = vec![
            pending("a.pdf", 80, true, None),
            pending("b.pdf", 40, false, None),
            pending("c.pdf", 0, false, Some("boom")),
        ];
        assert_eq!(results.len(), 3);
        assert_eq!(eligible_count(&results), 1);
    }

    #[test]
    fn test_degraded_result_zeroes_analysis_fields() {
        let r = PendingResult::degraded(Uuid::new_v4(), "cv.pdf".to_string(), "bad".to_string());
        assert_eq!(r.match_score, 0);
        assert!(r.matching_requirements.is_empty());
        assert!(r.missing_requirements.is_empty());
        assert!(r.extracted_email.is_none());
        assert!(!r.eligible);
        assert_eq!(r.error.as_deref(), Some("bad"));
    }

    fn lazy_pool() -> PgPool {
        // Never connects: every validation path under test fails before the
        // first database call.
        sqlx::postgres::PgPoolOptions::new()
            .connect_lazy("postgres://localhost/unused")
            .unwrap()
    }

    fn doc(name: &str) -> InputDocument {
        InputDocument {
            file_name: name.to_string(),
            content_type: Some("text/plain".to_string()),
            data: b"plain text cv".to_vec(),
        }
    }

    #[tokio::test]
    async fn test_empty_batch_fails_before_any_persistence() {
        let llm = LlmClient::new("test-key".to_string()).unwrap();
        let err = run_screening(
            &lazy_pool(),
            &llm,
            None,
            vec![],
            "Rust engineer",
            None,
            Uuid::new_v4(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_blank_requirement_fails_fast() {
        let llm = LlmClient::new("test-key".to_string()).unwrap();
        let err = run_screening(
            &lazy_pool(),
            &llm,
            None,
            vec![doc("a.txt")],
            "   ",
            None,
            Uuid::new_v4(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_out_of_range_threshold_fails_fast() {
        let llm = LlmClient::new("test-key".to_string()).unwrap();
        for threshold in [-1, 101] {
            let err = run_screening(
                &lazy_pool(),
                &llm,
                None,
                vec![doc("a.txt")],
                "Rust engineer",
                Some(threshold),
                Uuid::new_v4(),
            )
            .await
            .unwrap_err();
            assert!(matches!(err, AppError::Validation(_)), "threshold {threshold}");
        }
    }

    #[test]
    fn test_screening_id_shape() {
        let id = generate_screening_id();
        let parts: Vec<&str> = id.splitn(3, '-').collect();
        assert_eq!(parts[0], "SCR");
        assert!(parts[1].chars().all(|c| c.is_ascii_digit()));
        assert_eq!(parts[2].len(), 9);
    }

    #[test]
    fn test_screening_ids_are_distinct() {
        assert_ne!(generate_screening_id(), generate_screening_id());
    }
}
