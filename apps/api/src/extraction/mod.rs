//! Text extraction — turns an uploaded binary document into plain UTF-8 text.
//!
//! Dispatch is a closed enum over the supported media types; anything else is
//! an `Unsupported` error that degrades that one document, never the batch.

use std::io::Write;
use std::time::Duration;

use thiserror::Error;
use tracing::debug;

/// How long the legacy-extractor subprocess may run before the document is
/// treated as failed.
const DELEGATE_TIMEOUT_SECS: u64 = 30;

/// The closed set of document formats the pipeline accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaType {
    Pdf,
    PlainText,
    /// Binary .doc
    LegacyDoc,
    /// OpenXML .docx
    OpenXmlDoc,
}

impl MediaType {
    /// Resolves a media type from the declared content type, falling back to
    /// the file extension when the declaration is absent or generic.
    pub fn resolve(content_type: Option<&str>, file_name: &str) -> Result<Self, ExtractError> {
        if let Some(ct) = content_type {
            let ct = ct.split(';').next().unwrap_or(ct).trim();
            match ct {
                "application/pdf" => return Ok(MediaType::Pdf),
                "text/plain" => return Ok(MediaType::PlainText),
                "application/msword" => return Ok(MediaType::LegacyDoc),
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document" => {
                    return Ok(MediaType::OpenXmlDoc)
                }
                _ => {} // fall through to the extension
            }
        }

        let ext = file_name
            .rsplit_once('.')
            .map(|(_, e)| e.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "pdf" => Ok(MediaType::Pdf),
            "txt" => Ok(MediaType::PlainText),
            "doc" => Ok(MediaType::LegacyDoc),
            "docx" => Ok(MediaType::OpenXmlDoc),
            _ => Err(ExtractError::Unsupported(format!(
                "unsupported file type: {file_name}"
            ))),
        }
    }

    /// Canonical content type stored alongside the file bytes.
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Pdf => "application/pdf",
            MediaType::PlainText => "text/plain",
            MediaType::LegacyDoc => "application/msword",
            MediaType::OpenXmlDoc => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("{0}")]
    Unsupported(String),

    #[error("PDF extraction failed: {0}")]
    Pdf(String),

    #[error("legacy extractor failed: {0}")]
    Delegate(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Extracts plain text from `data` according to its media type.
///
/// Empty output is valid (image-only PDFs). `legacy_extractor_cmd` is the
/// configured external command for .doc/.docx; when unset those formats
/// fail with a delegate error.
pub async fn extract_text(
    media_type: MediaType,
    data: &[u8],
    legacy_extractor_cmd: Option<&str>,
) -> Result<String, ExtractError> {
    match media_type {
        MediaType::Pdf => extract_pdf(data).await,
        // Invalid UTF-8 is replaced, not rejected — a lossy decode keeps the
        // document in the batch.
        MediaType::PlainText => Ok(String::from_utf8_lossy(data).into_owned()),
        MediaType::LegacyDoc | MediaType::OpenXmlDoc => {
            let cmd = legacy_extractor_cmd.ok_or_else(|| {
                ExtractError::Delegate("LEGACY_EXTRACTOR_CMD is not configured".to_string())
            })?;
            extract_via_delegate(cmd, media_type, data).await
        }
    }
}

async fn extract_pdf(data: &[u8]) -> Result<String, ExtractError> {
    let data = data.to_vec();
    // pdf-extract is CPU-bound; keep it off the async workers.
    let text = tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&data))
        .await
        .map_err(|e| ExtractError::Pdf(format!("extraction task panicked: {e}")))?
        .map_err(|e| ExtractError::Pdf(e.to_string()))?;
    Ok(text)
}

/// Materializes the bytes into a scoped temp file and runs the external
/// extractor over it. The `NamedTempFile` guard removes the file on every
/// exit path, including delegate failure and timeout.
async fn extract_via_delegate(
    cmd: &str,
    media_type: MediaType,
    data: &[u8],
) -> Result<String, ExtractError> {
    let suffix = match media_type {
        MediaType::LegacyDoc => ".doc",
        MediaType::OpenXmlDoc => ".docx",
        _ => unreachable!("delegate only handles word-processor formats"),
    };

    let mut tmp = tempfile::Builder::new().suffix(suffix).tempfile()?;
    tmp.write_all(data)?;
    tmp.flush()?;

    debug!("Running legacy extractor {cmd} on {}", tmp.path().display());

    let output = tokio::time::timeout(
        Duration::from_secs(DELEGATE_TIMEOUT_SECS),
        tokio::process::Command::new(cmd)
            .arg(tmp.path())
            .kill_on_drop(true)
            .output(),
    )
    .await
    .map_err(|_| {
        ExtractError::Delegate(format!("timed out after {DELEGATE_TIMEOUT_SECS}s"))
    })??;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ExtractError::Delegate(format!(
            "exit status {}: {}",
            output.status,
            stderr.trim()
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}
