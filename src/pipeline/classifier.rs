//! Relevance classifier: is this message about a job application?

use std::sync::Arc;

use tracing::debug;

use crate::error::PipelineError;
use crate::llm::provider::{ChatMessage, CompletionRequest, LlmProvider};

/// Body characters sent to the model.
pub const CLASSIFIER_BODY_CHARS: usize = 2000;

const CLASSIFIER_TEMPERATURE: f32 = 0.1;

/// A YES/NO answer never needs more than a few tokens.
const CLASSIFIER_MAX_TOKENS: u32 = 5;

/// Binary LLM classifier. Fails closed: anything but `YES` is a no.
pub struct Classifier {
    llm: Arc<dyn LlmProvider>,
}

impl Classifier {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }

    /// Ask the model whether the message concerns a job application.
    ///
    /// Errors only when the model call itself fails.
    pub async fn is_job_application(
        &self,
        subject: &str,
        body: &str,
    ) -> Result<bool, PipelineError> {
        let request = CompletionRequest::new(vec![
            ChatMessage::system(build_classifier_system_prompt()),
            ChatMessage::user(build_classifier_user_prompt(subject, body)),
        ])
        .with_temperature(CLASSIFIER_TEMPERATURE)
        .with_max_tokens(CLASSIFIER_MAX_TOKENS);

        let response = self
            .llm
            .complete(request)
            .await
            .map_err(|e| PipelineError::Classification(format!("LLM call failed: {e}")))?;

        let relevant = parse_classifier_answer(&response.content);
        debug!(answer = %response.content.trim(), relevant, "Classifier answered");
        Ok(relevant)
    }
}

/// First `max_chars` characters of `text`.
pub(crate) fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

fn build_classifier_system_prompt() -> &'static str {
    "You are a helpful assistant that identifies job application related emails. \
     Be precise - only say YES if the email is clearly related to job applications \
     (confirmations, interviews, rejections, status updates, etc.)."
}

fn build_classifier_user_prompt(subject: &str, body: &str) -> String {
    format!(
        "Analyze the following email and determine if it is related to a job application \
         (either an application submission confirmation, interview invitation, rejection, \
         or any job application status update).\n\n\
         Email Subject: {subject}\n\n\
         Email Body:\n{}\n\n\
         Respond with only \"YES\" or \"NO\" (no explanation).",
        truncate_chars(body, CLASSIFIER_BODY_CHARS)
    )
}

/// Only an exact `YES` (ignoring case and surrounding whitespace) counts.
fn parse_classifier_answer(raw: &str) -> bool {
    raw.trim().eq_ignore_ascii_case("YES")
}
