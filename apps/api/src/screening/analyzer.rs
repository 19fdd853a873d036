//! Candidate Analyzer — scores one CV's extracted text against a job
//! requirement via the LLM, and heuristically pulls a contact email out of
//! the raw text.
//!
//! The model reply is untrusted text. The rigid SCORE/MATCHING/MISSING
//! template below is the only contract; anything that doesn't match it
//! parses to defaults (score 0, empty lists) rather than panicking.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::llm_client::{LlmClient, LlmError};

pub const ANALYSIS_SYSTEM: &str = "You are a strict technical recruiter. You analyze CVs against \
job requirements and reply only in the exact format requested, with no preamble or commentary.";

const ANALYSIS_PROMPT_TEMPLATE: &str = "Analyze the following CV against the job requirement.

Respond in EXACTLY this format:
SCORE: <integer 0-100>%
MATCHING:
- <requirement the CV satisfies, one per line>
MISSING:
- <requirement the CV does not satisfy, one per line>

Job Requirement:
{requirement}

CV:
{cv_text}";

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    // Permissive on purpose: CV text is messy and a false positive is
    // reviewable by the admin, a false negative is not.
    Regex::new(r"[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}").unwrap()
});

static SCORE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"SCORE:\s*(\d+)%").unwrap());

/// Structured outcome of one successful analysis.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Analysis {
    pub match_score: i32,
    pub matching_requirements: Vec<String>,
    pub missing_requirements: Vec<String>,
    pub extracted_email: Option<String>,
}

/// Returns the first email-looking token in the raw CV text, if any.
pub fn extract_email(text: &str) -> Option<String> {
    EMAIL_RE.find(text).map(|m| m.as_str().to_string())
}

pub fn build_prompt(requirement: &str, cv_text: &str) -> String {
    ANALYSIS_PROMPT_TEMPLATE
        .replace("{requirement}", requirement)
        .replace("{cv_text}", cv_text)
}

/// Parsed fields of the model reply (before email attachment).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedReply {
    pub match_score: i32,
    pub matching_requirements: Vec<String>,
    pub missing_requirements: Vec<String>,
}

/// Parses the rigid three-section reply. Missing pieces degrade to
/// defaults: absent SCORE is 0, absent sections are empty lists.
pub fn parse_reply(reply: &str) -> ParsedReply {
    let match_score = SCORE_RE
        .captures(reply)
        .and_then(|c| c[1].parse::<i32>().ok())
        .unwrap_or(0)
        .min(100);

    let matching_start = reply.find("MATCHING:");
    let missing_start = reply.find("MISSING:");

    let matching_block = match (matching_start, missing_start) {
        (Some(m), Some(n)) if m < n => &reply[m + "MATCHING:".len()..n],
        (Some(m), None) => &reply[m + "MATCHING:".len()..],
        _ => "",
    };
    let missing_block = match missing_start {
        Some(n) => &reply[n + "MISSING:".len()..],
        None => "",
    };

    ParsedReply {
        match_score,
        matching_requirements: dash_items(matching_block),
        missing_requirements: dash_items(missing_block),
    }
}

/// Keeps lines beginning with `-`, stripped of the dash and surrounding
/// whitespace; drops the ones that end up empty.
fn dash_items(block: &str) -> Vec<String> {
    block
        .lines()
        .filter_map(|line| {
            let trimmed = line.trim();
            trimmed.strip_prefix('-').map(|rest| rest.trim().to_string())
        })
        .filter(|item| !item.is_empty())
        .collect()
}

/// Runs one LLM analysis for one document. The caller owns degradation: an
/// `Err` here becomes that document's `error` field, never a batch failure.
pub async fn analyze_document(
    llm: &LlmClient,
    requirement: &str,
    cv_text: &str,
) -> Result<Analysis, LlmError> {
    let extracted_email = extract_email(cv_text);
    let prompt = build_prompt(requirement, cv_text);
    let reply = llm.complete(&prompt, ANALYSIS_SYSTEM).await?;
    let parsed = parse_reply(&reply);

    Ok(Analysis {
        match_score: parsed.match_score,
        matching_requirements: parsed.matching_requirements,
        missing_requirements: parsed.missing_requirements,
        extracted_email,
    })
}
