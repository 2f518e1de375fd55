//! Structured completion client.
//!
//! A structured completion is one request to the text-generation backend that
//! carries a system instruction, a user message, and a JSON schema the answer
//! must conform to. The client decodes the answer into the shape's record and
//! re-checks it, so callers either get a conformant value or one of the three
//! [`CompletionError`] kinds. Nothing is retried here; retrying is the
//! caller's decision.
use crate::shape::ResponseShape;
use serde_json::Value;
use std::time::Instant;

/// Failure of a single structured completion.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompletionError {
    /// Credential missing or rejected by the backend.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Network failure, timeout, refusal, or backend-side error.
    #[error("backend error: {0}")]
    Backend(String),

    /// The backend answered with content that does not fit the requested shape.
    #[error("schema violation in {shape} response: {detail}")]
    SchemaViolation { shape: String, detail: String },
}

impl CompletionError {
    /// Auth failures end the session; the others only fail one submission.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Auth(_))
    }
}

/// Everything a backend needs to issue one constrained request.
#[derive(Debug, Clone, Copy)]
pub struct CompletionRequest<'a> {
    pub system_instruction: &'a str,
    pub user_message: &'a str,
    pub schema_name: &'a str,
    pub schema: &'a Value,
    pub temperature: f64,
}

/// Transport for structured completions.
///
/// Implementations send exactly one request per call and return the raw JSON
/// text the model produced.
pub trait CompletionBackend: Send + Sync {
    fn send(&self, request: &CompletionRequest<'_>) -> Result<String, CompletionError>;
}

/// Issues schema-constrained requests and decodes their answers.
pub struct StructuredClient<B> {
    backend: B,
    temperature: f64,
}

impl<B: CompletionBackend> StructuredClient<B> {
    pub fn new(backend: B, temperature: f64) -> Self {
        Self {
            backend,
            temperature,
        }
    }

    #[cfg(test)]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Run one completion and return a value conforming to `shape`.
    pub fn complete<S: ResponseShape>(
        &self,
        system_instruction: &str,
        user_message: &str,
        shape: &S,
    ) -> Result<S::Output, CompletionError> {
        let request = CompletionRequest {
            system_instruction,
            user_message,
            schema_name: shape.name(),
            schema: shape.schema(),
            temperature: self.temperature,
        };
        let start = Instant::now();
        let content = self.backend.send(&request)?;
        let elapsed_ms = start.elapsed().as_millis();
        tracing::info!(
            shape = shape.name(),
            elapsed_ms,
            response_bytes = content.len(),
            "completion complete"
        );
        decode(shape, &content)
    }
}

/// Decode backend content into the shape's record and apply its checks.
fn decode<S: ResponseShape>(shape: &S, content: &str) -> Result<S::Output, CompletionError> {
    let violation = |detail: String| CompletionError::SchemaViolation {
        shape: shape.name().to_string(),
        detail,
    };
    let json_text = extract_json(content);
    if json_text.is_empty() {
        return Err(violation("empty response".to_string()));
    }
    let output: S::Output = serde_json::from_str(json_text).map_err(|err| {
        violation(format!(
            "{err}; first 200 chars: {}",
            &json_text[..floor_char_boundary(json_text, 200)]
        ))
    })?;
    shape.check(&output).map_err(violation)?;
    Ok(output)
}

/// Extract JSON from text that might have markdown code fences.
///
/// Content that already opens with `{` is returned as is; fences inside its
/// string values belong to the data.
fn extract_json(text: &str) -> &str {
    let text = text.trim();
    if text.starts_with('{') {
        return text;
    }

    if let Some(start) = text.find("```json") {
        let start = start + 7;
        if let Some(end) = text[start..].find("```") {
            return text[start..start + end].trim();
        }
    }

    if let Some(start) = text.find("```") {
        let start = start + 3;
        // Skip language identifier if present
        let start = text[start..]
            .find('\n')
            .map(|i| start + i + 1)
            .unwrap_or(start);
        if let Some(end) = text[start..].find("```") {
            return text[start..start + end].trim();
        }
    }

    text
}

fn floor_char_boundary(text: &str, max: usize) -> usize {
    if text.len() <= max {
        return text.len();
    }
    (0..=max)
        .rev()
        .find(|index| text.is_char_boundary(*index))
        .unwrap_or(0)
}
