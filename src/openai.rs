//! Chat Completions backend for structured completions.
//!
//! Sends one `POST {base_url}/chat/completions` per request with a strict
//! `json_schema` response format and returns the message content. HTTP status
//! and transport failures are mapped onto [`CompletionError`] here so the
//! client above never sees `ureq` types.
use crate::completion::{CompletionBackend, CompletionError, CompletionRequest};
use serde::Deserialize;
use serde_json::{json, Value};
use std::env;
use std::io;
use std::time::Duration;

/// Environment variable holding the API credential.
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Connection settings resolved from configuration.
#[derive(Debug, Clone)]
pub struct BackendSettings {
    pub base_url: String,
    pub model: String,
    pub timeout: Duration,
}

pub struct OpenAiBackend {
    agent: ureq::Agent,
    endpoint: String,
    model: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    refusal: Option<String>,
}

/// Read the API credential, failing with an auth error when it is absent.
pub fn load_api_key() -> Result<String, CompletionError> {
    api_key_from(env::var(API_KEY_ENV).ok())
}

fn api_key_from(raw: Option<String>) -> Result<String, CompletionError> {
    match raw {
        Some(key) if !key.trim().is_empty() => Ok(key.trim().to_string()),
        _ => Err(CompletionError::Auth(format!("{API_KEY_ENV} is not set"))),
    }
}

impl OpenAiBackend {
    pub fn new(settings: &BackendSettings, api_key: String) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(settings.timeout))
            .http_status_as_error(false)
            .build();
        Self {
            agent: config.into(),
            endpoint: format!("{}/chat/completions", settings.base_url.trim_end_matches('/')),
            model: settings.model.clone(),
            api_key,
        }
    }
}

impl CompletionBackend for OpenAiBackend {
    fn send(&self, request: &CompletionRequest<'_>) -> Result<String, CompletionError> {
        let body = request_body(&self.model, request);
        tracing::debug!(
            endpoint = %self.endpoint,
            model = %self.model,
            schema = request.schema_name,
            "sending chat completion"
        );
        let mut response = self
            .agent
            .post(self.endpoint.as_str())
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send_json(&body)
            .map_err(transport_error)?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            return Err(match response.body_mut().read_to_string() {
                Ok(text) => status_error(status, &text),
                Err(err) => status_failure(status, format!("error body unreadable: {err}")),
            });
        }
        let completion: ChatCompletion = response
            .body_mut()
            .read_json()
            .map_err(|err| CompletionError::Backend(format!("decode chat completion: {err}")))?;
        message_content(completion)
    }
}

fn request_body(model: &str, request: &CompletionRequest<'_>) -> Value {
    json!({
        "model": model,
        "temperature": request.temperature,
        "messages": [
            { "role": "system", "content": request.system_instruction },
            { "role": "user", "content": request.user_message }
        ],
        "response_format": {
            "type": "json_schema",
            "json_schema": {
                "name": request.schema_name,
                "strict": true,
                "schema": request.schema
            }
        }
    })
}

fn transport_error(err: ureq::Error) -> CompletionError {
    match err {
        ureq::Error::Timeout(timeout) => {
            CompletionError::Backend(format!("request timed out ({timeout:?})"))
        }
        ureq::Error::Io(err) if err.kind() == io::ErrorKind::TimedOut => {
            CompletionError::Backend(format!("request timed out ({err})"))
        }
        other => CompletionError::Backend(format!("request failed: {other}")),
    }
}

/// Map a non-success HTTP status onto the completion error taxonomy.
fn status_error(status: u16, body: &str) -> CompletionError {
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| {
            value
                .pointer("/error/message")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.trim().chars().take(200).collect());
    status_failure(status, message)
}

fn status_failure(status: u16, message: String) -> CompletionError {
    match status {
        401 | 403 => CompletionError::Auth(format!("HTTP {status}: {message}")),
        _ => CompletionError::Backend(format!("HTTP {status}: {message}")),
    }
}

fn message_content(completion: ChatCompletion) -> Result<String, CompletionError> {
    let Some(choice) = completion.choices.into_iter().next() else {
        return Err(CompletionError::Backend(
            "chat completion has no choices".to_string(),
        ));
    };
    if let Some(refusal) = choice.message.refusal {
        return Err(CompletionError::Backend(format!("model refused: {refusal}")));
    }
    Ok(choice.message.content.unwrap_or_default())
}
