use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};

use super::types::SimplificationCapability;
use super::LensError;
use crate::config::LensConfig;

/// Model families this backend knows how to prompt.
const SUPPORTED_MODEL_FAMILIES: &[&str] = &["llama3"];

/// Ollama HTTP client for local LLM inference.
pub struct OllamaClient {
    base_url: String,
    client: reqwest::blocking::Client,
    timeout_secs: u64,
    keep_alive: String,
}

impl OllamaClient {
    /// Create a new OllamaClient pointing at an Ollama instance.
    pub fn new(base_url: &str, timeout_secs: u64, keep_alive: &str) -> Result<Self, LensError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| LensError::HttpClient(e.to_string()))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            timeout_secs,
            keep_alive: keep_alive.to_string(),
        })
    }

    pub fn from_config(config: &LensConfig) -> Result<Self, LensError> {
        Self::new(&config.model_url, config.timeout_secs, &config.keep_alive)
    }

    /// Default Ollama instance at localhost:11434.
    pub fn default_local() -> Result<Self, LensError> {
        Self::from_config(&LensConfig::default())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

/// Request body for Ollama /api/chat
#[derive(Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    stream: bool,
    keep_alive: &'a str,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

/// Response body from Ollama /api/chat
#[derive(Deserialize)]
struct OllamaChatResponse {
    message: OllamaChatReply,
}

#[derive(Deserialize)]
struct OllamaChatReply {
    content: String,
}

/// Resolve a selector against the supported families.
///
/// A selector naming a tag of a family ("llama3:8b") is used as-is; one that
/// merely mentions a family ("my-llama3") resolves to the family.
fn resolve_family(selector: &str) -> Result<String, LensError> {
    let selector = selector.trim();
    SUPPORTED_MODEL_FAMILIES
        .iter()
        .find(|family| selector.contains(**family))
        .map(|family| {
            if selector.starts_with(family) {
                selector.to_string()
            } else {
                family.to_string()
            }
        })
        .ok_or_else(|| LensError::UnsupportedModel(selector.to_string()))
}

impl SimplificationCapability for OllamaClient {
    fn resolve_model(&self, selector: &str) -> Result<String, LensError> {
        resolve_family(selector)
    }

    fn simplify(
        &self,
        system_instruction: &str,
        prompt: &str,
        model: &str,
    ) -> Result<String, LensError> {
        let url = format!("{}/api/chat", self.base_url);
        let body = OllamaChatRequest {
            model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: system_instruction,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            stream: false,
            keep_alive: &self.keep_alive,
        };

        tracing::debug!(model = %model, url = %url, "Sending simplification request");

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .map_err(|e| {
                if e.is_connect() {
                    LensError::ServiceUnavailable(self.base_url.clone())
                } else if e.is_timeout() {
                    LensError::HttpClient(format!(
                        "Request timed out after {}s",
                        self.timeout_secs
                    ))
                } else {
                    LensError::HttpClient(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(LensError::ServiceError {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: OllamaChatResponse = response
            .json()
            .map_err(|e| LensError::MalformedResponse(e.to_string()))?;

        Ok(parsed.message.content)
    }
}

/// What a [`MockSimplifier`] does when called.
#[derive(Debug, Clone)]
enum MockOutcome {
    Respond(String),
    Unavailable,
}

/// A recorded call to [`MockSimplifier::simplify`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockCall {
    pub system_instruction: String,
    pub prompt: String,
    pub model: String,
}

/// Mock backend for testing: returns a configured response and records calls.
pub struct MockSimplifier {
    outcome: MockOutcome,
    calls: Mutex<Vec<MockCall>>,
}

impl MockSimplifier {
    pub fn new(response: &str) -> Self {
        Self {
            outcome: MockOutcome::Respond(response.to_string()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// A backend whose every call fails as unreachable.
    pub fn unavailable() -> Self {
        Self {
            outcome: MockOutcome::Unavailable,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl SimplificationCapability for MockSimplifier {
    fn resolve_model(&self, selector: &str) -> Result<String, LensError> {
        resolve_family(selector)
    }

    fn simplify(
        &self,
        system_instruction: &str,
        prompt: &str,
        model: &str,
    ) -> Result<String, LensError> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(MockCall {
                system_instruction: system_instruction.to_string(),
                prompt: prompt.to_string(),
                model: model.to_string(),
            });
        match &self.outcome {
            MockOutcome::Respond(response) => Ok(response.clone()),
            MockOutcome::Unavailable => Err(LensError::ServiceUnavailable("mock://ollama".into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_returns_configured_response_and_records_call() {
        let mock = MockSimplifier::new("simple|");
        let result = mock.simplify("system", "prompt", "llama3").unwrap();
        assert_eq!(result, "simple|");
        assert_eq!(
            mock.calls(),
            vec![MockCall {
                system_instruction: "system".into(),
                prompt: "prompt".into(),
                model: "llama3".into(),
            }]
        );
    }

    #[test]
    fn mock_keeps_recording_after_poisoned_lock() {
        let mock = std::sync::Arc::new(MockSimplifier::new("ok"));
        mock.simplify("s", "first", "llama3").unwrap();

        let holder = mock.clone();
        let poisoned = std::thread::spawn(move || {
            let _guard = holder.calls.lock().unwrap();
            panic!("poison the call log");
        })
        .join();
        assert!(poisoned.is_err());
        assert!(mock.calls.is_poisoned());

        mock.simplify("s", "second", "llama3").unwrap();
        let prompts: Vec<String> = mock.calls().into_iter().map(|c| c.prompt).collect();
        assert_eq!(prompts, vec!["first", "second"]);
    }

    #[test]
    fn unavailable_mock_fails() {
        let mock = MockSimplifier::unavailable();
        assert!(matches!(
            mock.simplify("s", "p", "llama3"),
            Err(LensError::ServiceUnavailable(_))
        ));
    }

    #[test]
    fn resolves_supported_selectors() {
        assert_eq!(resolve_family("llama3").unwrap(), "llama3");
        assert_eq!(resolve_family("llama3:8b").unwrap(), "llama3:8b");
        assert_eq!(resolve_family("ollama-llama3").unwrap(), "llama3");
    }

    #[test]
    fn rejects_unsupported_selectors() {
        assert!(matches!(
            resolve_family("gpt-4"),
            Err(LensError::UnsupportedModel(m)) if m == "gpt-4"
        ));
        assert!(resolve_family("").is_err());
    }

    #[test]
    fn ollama_client_constructor() {
        let client = OllamaClient::new("http://localhost:11434", 120, "-1m").unwrap();
        assert_eq!(client.base_url, "http://localhost:11434");
        assert_eq!(client.timeout_secs, 120);
        assert_eq!(client.keep_alive, "-1m");
    }

    #[test]
    fn ollama_client_trims_trailing_slash() {
        let client = OllamaClient::new("http://localhost:11434/", 60, "-1m").unwrap();
        assert_eq!(client.base_url(), "http://localhost:11434");
    }

    #[test]
    fn unreachable_server_is_service_unavailable() {
        // Port 9 (discard) on localhost is closed in test environments.
        let client = OllamaClient::new("http://127.0.0.1:9", 5, "-1m").unwrap();
        let err = client.simplify("s", "p", "llama3").unwrap_err();
        assert!(matches!(
            err,
            LensError::ServiceUnavailable(_) | LensError::HttpClient(_)
        ));
    }

    #[test]
    fn chat_request_serializes_system_then_user() {
        let body = OllamaChatRequest {
            model: "llama3",
            messages: [
                ChatMessage {
                    role: "system",
                    content: "sys",
                },
                ChatMessage {
                    role: "user",
                    content: "usr",
                },
            ],
            stream: false,
            keep_alive: "-1m",
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "usr");
        assert_eq!(json["stream"], false);
        assert_eq!(json["keep_alive"], "-1m");
    }
}
