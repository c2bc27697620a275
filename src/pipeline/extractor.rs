//! Structured extraction: turns a relevant message into a candidate
//! `JobApplication`.
//!
//! The model is untrusted. Its JSON is parsed into `ExtractionResponse` (every
//! field optional) and then repaired:
//! 1. unparseable output → no candidate
//! 2. status title-cased, unknown values → `Applied`
//! 3. empty / "null" / "unknown" role or organization → fixed placeholder
//! 4. empty or "null" link → absent
//! 5. every string trimmed

use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::PipelineError;
use crate::llm::provider::{ChatMessage, CompletionRequest, LlmProvider, ResponseFormat};
use crate::pipeline::classifier::truncate_chars;
use crate::pipeline::types::{
    ApplicationStatus, JobApplication, UNKNOWN_ORGANIZATION, UNKNOWN_ROLE,
};

/// Body characters sent to the model.
pub const EXTRACTOR_BODY_CHARS: usize = 3000;

const EXTRACTOR_TEMPERATURE: f32 = 0.1;

const EXTRACTOR_MAX_TOKENS: u32 = 512;

/// LLM-backed field extractor.
pub struct Extractor {
    llm: Arc<dyn LlmProvider>,
}

impl Extractor {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }

    /// Extract a candidate record.
    ///
    /// `Ok(None)` when the model's answer cannot be parsed; `Err` only when
    /// the model call itself fails.
    pub async fn extract(
        &self,
        subject: &str,
        body: &str,
        date: &str,
    ) -> Result<Option<JobApplication>, PipelineError> {
        let request = CompletionRequest::new(vec![
            ChatMessage::system(build_extractor_system_prompt()),
            ChatMessage::user(build_extractor_user_prompt(subject, body, date)),
        ])
        .with_temperature(EXTRACTOR_TEMPERATURE)
        .with_max_tokens(EXTRACTOR_MAX_TOKENS)
        .with_response_format(ResponseFormat::JsonObject);

        let response = self
            .llm
            .complete(request)
            .await
            .map_err(|e| PipelineError::Extraction(format!("LLM call failed: {e}")))?;

        match parse_extraction_response(&response.content) {
            Ok(application) => {
                debug!(
                    role = %application.role,
                    organization = %application.organization,
                    status = %application.status,
                    "Extracted job application"
                );
                Ok(Some(application))
            }
            Err(e) => {
                warn!(
                    raw_response = %response.content,
                    error = %e,
                    "Failed to parse extraction response"
                );
                Ok(None)
            }
        }
    }
}

// ── Prompt construction ─────────────────────────────────────────────

fn build_extractor_system_prompt() -> &'static str {
    "You are a helpful assistant that extracts structured information from emails. \
     Always return valid JSON only."
}

fn build_extractor_user_prompt(subject: &str, body: &str, date: &str) -> String {
    format!(
        "Extract job application information from this email.\n\n\
         Email Subject: {subject}\n\
         Email Date: {date}\n\n\
         Email Body:\n{}\n\n\
         Extract the following information:\n\
         1. Role/Job Title (the position name)\n\
         2. Organization/Company Name\n\
         3. Job description link/URL (if mentioned, otherwise return null)\n\
         4. Status: one of \"Applied\" (application submitted), \"Interview\" (interview \
         invitation or scheduling), \"Rejected\" (rejection notification). Default to \
         \"Applied\" if unclear.\n\
         5. Date of application, if stated (format: YYYY-MM-DD)\n\n\
         Return a JSON object with these keys: role, organization, job_description_link, \
         status, date.\n\n\
         If any information cannot be found, use null for that field (except status, which \
         should default to \"Applied\").\n\n\
         ONLY return valid JSON, no additional text or explanation.",
        truncate_chars(body, EXTRACTOR_BODY_CHARS)
    )
}

// ── Response parsing ────────────────────────────────────────────────

/// Raw model output. Every field may be missing or null.
///
/// Key fields must be strings when present. Link, status and date are read
/// as loose JSON values, and anything that is not a string is ignored.
#[derive(Debug, Default, Deserialize)]
struct ExtractionResponse {
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    organization: Option<String>,
    #[serde(default)]
    job_description_link: Option<Value>,
    #[serde(default)]
    link: Option<Value>,
    #[serde(default)]
    url: Option<Value>,
    #[serde(default)]
    status: Option<Value>,
    /// Parsed for completeness; dates are not tracked.
    #[serde(default)]
    date: Option<Value>,
}

impl ExtractionResponse {
    /// First usable link, preferring `job_description_link`.
    fn link(&self) -> Option<String> {
        [&self.job_description_link, &self.link, &self.url]
            .into_iter()
            .find_map(|value| link_field(text_of(value)))
    }
}

/// String contents of a loose field; other JSON types read as absent.
fn text_of(value: &Option<Value>) -> Option<&str> {
    value.as_ref().and_then(Value::as_str)
}

/// Parse and repair the model's JSON into a candidate.
fn parse_extraction_response(raw: &str) -> Result<JobApplication, String> {
    let json_str = extract_json_object(raw);
    let value: Value =
        serde_json::from_str(&json_str).map_err(|e| format!("JSON parse error: {e}"))?;
    if !value.is_object() {
        return Err(format!("expected a JSON object, got: {value}"));
    }
    let response: ExtractionResponse =
        serde_json::from_value(value).map_err(|e| format!("unexpected shape: {e}"))?;

    if let Some(date) = response.date.as_ref().filter(|d| !d.is_null()) {
        debug!(date_hint = %date, "Ignoring extracted date hint");
    }

    let link = response.link();
    Ok(JobApplication::candidate(
        key_field(response.role, UNKNOWN_ROLE),
        key_field(response.organization, UNKNOWN_ORGANIZATION),
        link,
        ApplicationStatus::normalize(text_of(&response.status)),
    ))
}

/// Trimmed value, or `placeholder` for empty / "null" / "unknown".
fn key_field(raw: Option<String>, placeholder: &str) -> String {
    match raw.as_deref().map(str::trim) {
        Some(value)
            if !value.is_empty()
                && !value.eq_ignore_ascii_case("null")
                && !value.eq_ignore_ascii_case("unknown") =>
        {
            value.to_string()
        }
        _ => placeholder.to_string(),
    }
}

/// Trimmed link, or `None` for empty / "null". Not validated as a URL.
fn link_field(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim)
        .filter(|link| !link.is_empty() && *link != "null")
        .map(str::to_string)
}

/// Extract a JSON object from LLM output.
///
/// Prefers the contents of a markdown fence, then the span from the first `{`
/// to the last `}`. Text with no braces is returned trimmed so the parser can
/// report it.
fn extract_json_object(text: &str) -> String {
    let trimmed = text.trim();
    let candidate = fenced_block(trimmed).unwrap_or(trimmed);

    match (candidate.find('{'), candidate.rfind('}')) {
        (Some(start), Some(end)) if end > start => candidate[start..=end].to_string(),
        _ => candidate.to_string(),
    }
}

/// Body of the first ```json or bare ``` fence, if it is closed.
fn fenced_block(text: &str) -> Option<&str> {
    let open = text.find("```")?;
    let after = &text[open + 3..];
    let after = after.strip_prefix("json").unwrap_or(after);
    let close = after.find("```")?;
    Some(after[..close].trim())
}
