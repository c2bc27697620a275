//! Bridges a rig `CompletionModel` to our `LlmProvider` trait.
//!
//! System messages become the rig preamble, the last user message becomes the
//! prompt and anything before it is sent as chat history. JSON-object output
//! is requested through rig's additional params.

use async_trait::async_trait;
use rig::completion::{CompletionError, CompletionModel};
use rig::message::{AssistantContent, Message as RigMessage};
use serde_json::{Value, json};

use crate::error::LlmError;
use crate::llm::provider::{
    ChatMessage, CompletionRequest, CompletionResponse, FinishReason, LlmProvider,
    ResponseFormat, Role,
};

/// Adapter from any rig completion model to `LlmProvider`.
pub struct RigAdapter<M> {
    model: M,
    model_name: String,
    provider: &'static str,
}

impl<M: CompletionModel> RigAdapter<M> {
    pub fn new(model: M, model_name: &str, provider: &'static str) -> Self {
        Self {
            model,
            model_name: model_name.to_string(),
            provider,
        }
    }
}

/// Messages split into the shape rig expects.
#[derive(Debug)]
struct RigConversation {
    preamble: Option<String>,
    history: Vec<RigMessage>,
    prompt: RigMessage,
}

fn split_messages(messages: Vec<ChatMessage>) -> Result<RigConversation, String> {
    let mut system = Vec::new();
    let mut turns = Vec::new();
    for message in messages {
        match message.role {
            Role::System => system.push(message.content),
            Role::User => turns.push(RigMessage::user(message.content)),
            Role::Assistant => turns.push(RigMessage::assistant(message.content)),
        }
    }

    let prompt = turns.pop().ok_or("request has no user or assistant message")?;
    Ok(RigConversation {
        preamble: (!system.is_empty()).then(|| system.join("\n\n")),
        history: turns,
        prompt,
    })
}

/// Extra request body fields for the chat-completions endpoint.
fn additional_params(format: ResponseFormat) -> Option<Value> {
    match format {
        ResponseFormat::Text => None,
        ResponseFormat::JsonObject => Some(json!({ "response_format": { "type": "json_object" } })),
    }
}

/// Map a rig error onto our error kinds.
///
/// rig folds HTTP status into the provider message, so auth and rate-limit
/// failures are recognised from its text.
fn map_completion_error(provider: &str, error: CompletionError) -> LlmError {
    let invalid_response = matches!(
        error,
        CompletionError::JsonError(_) | CompletionError::ResponseError(_)
    );
    classify_error_message(provider, &error.to_string(), invalid_response)
}

fn classify_error_message(provider: &str, message: &str, invalid_response: bool) -> LlmError {
    let lower = message.to_ascii_lowercase();
    if lower.contains("429") || lower.contains("rate limit") || lower.contains("rate_limit") {
        return LlmError::RateLimited {
            provider: provider.to_string(),
        };
    }
    if lower.contains("401")
        || lower.contains("unauthorized")
        || lower.contains("invalid_api_key")
        || lower.contains("incorrect api key")
    {
        return LlmError::AuthFailed {
            provider: provider.to_string(),
        };
    }
    if invalid_response {
        return LlmError::InvalidResponse {
            provider: provider.to_string(),
            reason: message.to_string(),
        };
    }
    LlmError::RequestFailed {
        provider: provider.to_string(),
        reason: message.to_string(),
    }
}

fn saturating_u32(n: u64) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

#[async_trait]
impl<M> LlmProvider for RigAdapter<M>
where
    M: CompletionModel + Send + Sync + 'static,
{
    fn model_name(&self) -> &str {
        &self.model_name
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let conversation = split_messages(request.messages).map_err(|reason| {
            LlmError::RequestFailed {
                provider: self.provider.to_string(),
                reason,
            }
        })?;

        let mut builder = self.model.completion_request(conversation.prompt);
        for message in conversation.history {
            builder = builder.message(message);
        }
        if let Some(preamble) = conversation.preamble {
            builder = builder.preamble(preamble);
        }
        if let Some(temperature) = request.temperature {
            builder = builder.temperature(f64::from(temperature));
        }
        if let Some(max_tokens) = request.max_tokens {
            builder = builder.max_tokens(u64::from(max_tokens));
        }
        if let Some(params) = additional_params(request.response_format) {
            builder = builder.additional_params(params);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| map_completion_error(self.provider, e))?;

        let content: String = response
            .choice
            .iter()
            .filter_map(|item| match item {
                AssistantContent::Text(text) => Some(text.text.as_str()),
                _ => None,
            })
            .collect();

        let finish_reason = if content.is_empty() {
            FinishReason::Unknown
        } else {
            FinishReason::Stop
        };

        Ok(CompletionResponse {
            content,
            input_tokens: saturating_u32(response.usage.input_tokens),
            output_tokens: saturating_u32(response.usage.output_tokens),
            finish_reason,
            response_id: None,
        })
    }
}
