//! Shared sqlx queries for the screening domain. Every read is scoped by the
//! owning admin identity; ownership mismatches surface as `Forbidden`.

use sqlx::PgPool;
use uuid::Uuid;

use crate::errors::AppError;
use crate::screening::models::{ResultRow, ScreeningRow};

/// Loads a screening and enforces that `user_id` created it.
pub async fn fetch_owned_screening(
    db: &PgPool,
    screening_id: &str,
    user_id: Uuid,
) -> Result<ScreeningRow, AppError> {
    let screening: Option<ScreeningRow> =
        sqlx::query_as("SELECT * FROM cv_screenings WHERE screening_id = $1")
            .bind(screening_id)
            .fetch_optional(db)
            .await?;

    let screening = screening
        .ok_or_else(|| AppError::NotFound(format!("Screening {screening_id} not found")))?;
    if screening.created_by != user_id {
        return Err(AppError::Forbidden);
    }
    Ok(screening)
}

/// All result rows of a screening in persisted (input) order.
pub async fn fetch_results(db: &PgPool, screening_id: &str) -> Result<Vec<ResultRow>, AppError> {
    let rows = sqlx::query_as(
        "SELECT * FROM screening_results WHERE screening_id = $1 ORDER BY position",
    )
    .bind(screening_id)
    .fetch_all(db)
    .await?;
    Ok(rows)
}

/// Candidates still awaiting an invitation. The `email_sent = FALSE` filter
/// is the idempotency line: a result that has been invited never shows up
/// in either listing again.
pub async fn fetch_pending_candidates(
    db: &PgPool,
    screening_id: &str,
    with_extracted_email: bool,
) -> Result<Vec<ResultRow>, AppError> {
    let email_clause = if with_extracted_email {
        "extracted_email IS NOT NULL"
    } else {
        "extracted_email IS NULL"
    };
    let sql = format!(
        "SELECT * FROM screening_results \
         WHERE screening_id = $1 AND eligible = TRUE AND error IS NULL \
           AND email_sent = FALSE AND {email_clause} \
         ORDER BY position"
    );
    let rows = sqlx::query_as(&sql).bind(screening_id).fetch_all(db).await?;
    Ok(rows)
}

/// History of screenings created by `user_id`, newest first.
pub async fn fetch_screening_history(
    db: &PgPool,
    user_id: Uuid,
) -> Result<Vec<ScreeningRow>, AppError> {
    let rows = sqlx::query_as(
        "SELECT * FROM cv_screenings WHERE created_by = $1 ORDER BY created_at DESC",
    )
    .bind(user_id)
    .fetch_all(db)
    .await?;
    Ok(rows)
}
