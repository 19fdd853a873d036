//! Axum route handlers for the screening API.

use std::collections::HashMap;

use axum::{
    extract::{Multipart, Path, Query, State},
    http::header,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use sqlx::FromRow;
use uuid::Uuid;

use crate::errors::AppError;
use crate::screening::dispatch::{
    send_bulk, send_single, BulkEntry, BulkSendOutcome, SingleSendOutcome, SingleSendRequest,
};
use crate::screening::models::{
    ResultView, ScreeningBreakdown, ScreeningDetailView, ScreeningSummaryView,
};
use crate::screening::pipeline::{run_screening, InputDocument, ScreeningOutcome};
use crate::screening::queries::{
    fetch_owned_screening, fetch_pending_candidates, fetch_results, fetch_screening_history,
};
use crate::screening::report::{build_report_input, ReportInput};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct UserIdQuery {
    pub user_id: Uuid,
}

/// POST /api/v1/screenings/analyze
///
/// Multipart form: repeated `cv` file parts, `requirement` text,
/// optional `threshold`, and `user_id`. Document-level failures come back
/// inside the results array; only request-shape or persistence failures
/// produce an error status.
pub async fn handle_analyze(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<ScreeningOutcome>, AppError> {
    let mut documents: Vec<InputDocument> = Vec::new();
    let mut requirement: Option<String> = None;
    let mut threshold: Option<i32> = None;
    let mut user_id: Option<Uuid> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("invalid multipart body: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "cv" => {
                let file_name = field
                    .file_name()
                    .map(str::to_string)
                    .ok_or_else(|| AppError::Validation("cv part has no file name".to_string()))?;
                let content_type = field.content_type().map(str::to_string);
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::Validation(format!("failed to read '{file_name}': {e}")))?
                    .to_vec();
                documents.push(InputDocument {
                    file_name,
                    content_type,
                    data,
                });
            }
            "requirement" => {
                requirement = Some(read_text_field(field, "requirement").await?);
            }
            "threshold" => {
                let raw = read_text_field(field, "threshold").await?;
                threshold = Some(raw.trim().parse::<i32>().map_err(|_| {
                    AppError::Validation("threshold must be an integer".to_string())
                })?);
            }
            "user_id" => {
                let raw = read_text_field(field, "user_id").await?;
                user_id = Some(raw.trim().parse::<Uuid>().map_err(|_| {
                    AppError::Validation("user_id must be a UUID".to_string())
                })?);
            }
            _ => {
                // Ordinary form clients attach extra fields; skip them.
                tracing::debug!("Ignoring unexpected multipart field '{name}'");
            }
        }
    }

    let requirement =
        requirement.ok_or_else(|| AppError::Validation("requirement is required".to_string()))?;
    let user_id = user_id.ok_or_else(|| AppError::Validation("user_id is required".to_string()))?;

    let outcome = run_screening(
        &state.db,
        &state.llm,
        state.config.legacy_extractor_cmd.as_deref(),
        documents,
        &requirement,
        threshold,
        user_id,
    )
    .await?;

    Ok(Json(outcome))
}

async fn read_text_field(
    field: axum::extract::multipart::Field<'_>,
    name: &str,
) -> Result<String, AppError> {
    field
        .text()
        .await
        .map_err(|e| AppError::Validation(format!("invalid '{name}' field: {e}")))
}

/// GET /api/v1/screenings
pub async fn handle_history(
    State(state): State<AppState>,
    Query(params): Query<UserIdQuery>,
) -> Result<Json<Vec<ScreeningSummaryView>>, AppError> {
    let rows = fetch_screening_history(&state.db, params.user_id).await?;
    Ok(Json(rows.into_iter().map(ScreeningSummaryView::from).collect()))
}

/// GET /api/v1/screenings/:id
pub async fn handle_detail(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<UserIdQuery>,
) -> Result<Json<ScreeningDetailView>, AppError> {
    let screening = fetch_owned_screening(&state.db, &id, params.user_id).await?;
    let results = fetch_results(&state.db, &id).await?;
    let breakdown = ScreeningBreakdown::compute(&screening, &results);
    Ok(Json(ScreeningDetailView {
        summary: ScreeningSummaryView::from(screening),
        results: results.into_iter().map(ResultView::from).collect(),
        breakdown,
    }))
}

/// GET /api/v1/screenings/:id/candidates/with-email
pub async fn handle_candidates_with_email(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<UserIdQuery>,
) -> Result<Json<Vec<ResultView>>, AppError> {
    fetch_owned_screening(&state.db, &id, params.user_id).await?;
    let rows = fetch_pending_candidates(&state.db, &id, true).await?;
    Ok(Json(rows.into_iter().map(ResultView::from).collect()))
}

/// GET /api/v1/screenings/:id/candidates/without-email
pub async fn handle_candidates_without_email(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<UserIdQuery>,
) -> Result<Json<Vec<ResultView>>, AppError> {
    fetch_owned_screening(&state.db, &id, params.user_id).await?;
    let rows = fetch_pending_candidates(&state.db, &id, false).await?;
    Ok(Json(rows.into_iter().map(ResultView::from).collect()))
}

/// POST /api/v1/screenings/send-link
pub async fn handle_send_link(
    State(state): State<AppState>,
    Json(req): Json<SingleSendRequest>,
) -> Result<Json<SingleSendOutcome>, AppError> {
    let outcome = send_single(&state.db, state.mailer.as_ref(), &state.config, req).await?;
    Ok(Json(outcome))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkSendRequest {
    pub user_id: Uuid,
    pub screening_id: String,
    pub entries: Vec<BulkEntry>,
}

/// POST /api/v1/screenings/send-bulk-links
pub async fn handle_send_bulk_links(
    State(state): State<AppState>,
    Json(req): Json<BulkSendRequest>,
) -> Result<Json<BulkSendOutcome>, AppError> {
    let outcome = send_bulk(
        &state.db,
        state.mailer.as_ref(),
        &state.config,
        &req.screening_id,
        req.entries,
        req.user_id,
    )
    .await?;
    Ok(Json(outcome))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportRequest {
    pub user_id: Uuid,
    pub manual_emails: Option<HashMap<String, String>>,
}

/// POST /api/v1/screenings/:id/report
///
/// Returns the renderer input contract; the renderer itself lives outside
/// this service.
pub async fn handle_report(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<ReportRequest>,
) -> Result<Json<ReportInput>, AppError> {
    let screening = fetch_owned_screening(&state.db, &id, req.user_id).await?;
    let results = fetch_results(&state.db, &id).await?;
    Ok(Json(build_report_input(screening, results, req.manual_emails)))
}

#[derive(FromRow)]
struct CvFileDownloadRow {
    original_name: String,
    media_type: String,
    file_data: Vec<u8>,
    uploaded_by: Uuid,
}

/// GET /api/v1/cv-files/:id/download
///
/// Raw bytes of a stored CV. Allowed for the original uploader or the
/// creator of any screening that references the file.
pub async fn handle_download(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(params): Query<UserIdQuery>,
) -> Result<impl IntoResponse, AppError> {
    let file: Option<CvFileDownloadRow> = sqlx::query_as(
        "SELECT original_name, media_type, file_data, uploaded_by FROM cv_files WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(&state.db)
    .await?;
    let file = file.ok_or_else(|| AppError::NotFound(format!("CV file {id} not found")))?;

    if file.uploaded_by != params.user_id {
        let (owns_screening,): (bool,) = sqlx::query_as(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM screening_results sr
                JOIN cv_screenings s ON s.screening_id = sr.screening_id
                WHERE sr.cv_file_id = $1 AND s.created_by = $2
            )
            "#,
        )
        .bind(id)
        .bind(params.user_id)
        .fetch_one(&state.db)
        .await?;
        if !owns_screening {
            return Err(AppError::Forbidden);
        }
    }

    let headers = [
        (header::CONTENT_TYPE, file.media_type),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", file.original_name.replace('"', "")),
        ),
    ];
    Ok((headers, file.file_data))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use tower::ServiceExt;
    use uuid::Uuid;

    use crate::config::Config;
    use crate::llm_client::LlmClient;
    use crate::mailer::{MailError, MailSender};
    use crate::routes::build_router;
    use crate::state::AppState;

    struct NullMailer;

    #[async_trait]
    impl MailSender for NullMailer {
        async fn send(&self, _to: &str, _subject: &str, _body: &str) -> Result<(), MailError> {
            Ok(())
        }
    }

    fn test_state() -> AppState {
        AppState {
            // Lazy pool: the requests under test fail validation before any
            // database call.
            db: sqlx::postgres::PgPoolOptions::new()
                .connect_lazy("postgres://localhost/unused")
                .unwrap(),
            llm: LlmClient::new("test-key".to_string()).unwrap(),
            mailer: Arc::new(NullMailer),
            config: Config {
                database_url: "postgres://unused".to_string(),
                anthropic_api_key: "unused".to_string(),
                mail_api_url: "http://unused".to_string(),
                mail_api_key: "unused".to_string(),
                mail_from: "noreply@example.com".to_string(),
                registration_base_url: "https://app.example.com".to_string(),
                legacy_extractor_cmd: None,
                port: 0,
                rust_log: "info".to_string(),
            },
        }
    }

    fn text_part(boundary: &str, name: &str, value: &str) -> String {
        format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
        )
    }

    #[tokio::test]
    async fn test_analyze_ignores_unknown_multipart_fields() {
        let boundary = "test-boundary";
        let mut body = String::new();
        body.push_str(&text_part(boundary, "requirement", "Rust engineer"));
        body.push_str(&text_part(boundary, "user_id", &Uuid::new_v4().to_string()));
        // Extra field a form client might attach; must not fail the request.
        body.push_str(&text_part(boundary, "csrf_token", "noise"));
        body.push_str(&format!("--{boundary}--\r\n"));

        let response = build_router(test_state())
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/screenings/analyze")
                    .header(
                        header::CONTENT_TYPE,
                        format!("multipart/form-data; boundary={boundary}"),
                    )
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();

        // The request still fails validation, but on the empty batch —
        // proof the unknown field was skipped rather than rejected.
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8_lossy(&bytes);
        assert!(text.contains("CV file"), "unexpected error body: {text}");
    }
}
