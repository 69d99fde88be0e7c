use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::IntelligenceError;

/// Blocking text-generation backend. Called from `spawn_blocking`.
pub trait LlmClient: Send + Sync {
    fn generate(&self, model: &str, prompt: &str, system: &str) -> Result<String, IntelligenceError>;

    fn is_model_available(&self, model: &str) -> Result<bool, IntelligenceError>;

    fn list_models(&self) -> Result<Vec<String>, IntelligenceError>;
}

/// Client for a local Ollama server.
pub struct OllamaClient {
    base_url: String,
    client: reqwest::blocking::Client,
    timeout_secs: u64,
}

impl OllamaClient {
    pub fn new(base_url: &str, timeout_secs: u64) -> Result<Self, IntelligenceError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| IntelligenceError::HttpClient(e.to_string()))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            timeout_secs,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn map_send_error(&self, e: reqwest::Error) -> IntelligenceError {
        if e.is_connect() {
            IntelligenceError::OllamaConnection(self.base_url.clone())
        } else if e.is_timeout() {
            IntelligenceError::Timeout(self.timeout_secs)
        } else {
            IntelligenceError::HttpClient(e.to_string())
        }
    }
}

/// Summaries are short and should read the same on every call.
const SUMMARY_TEMPERATURE: f32 = 0.2;
const SUMMARY_MAX_TOKENS: u32 = 400;

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f32,
    num_predict: u32,
}

/// `POST /api/generate`, non-streaming.
#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    system: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

/// `GET /api/tags`
#[derive(Deserialize)]
struct TagsResponse {
    models: Vec<TagEntry>,
}

#[derive(Deserialize)]
struct TagEntry {
    name: String,
}

impl OllamaClient {
    /// Decode a successful response body, or surface the server's error text.
    fn read_json<T: serde::de::DeserializeOwned>(
        response: reqwest::blocking::Response,
    ) -> Result<T, IntelligenceError> {
        let status = response.status();
        if !status.is_success() {
            return Err(IntelligenceError::OllamaError {
                status: status.as_u16(),
                body: response.text().unwrap_or_default(),
            });
        }
        response
            .json()
            .map_err(|e| IntelligenceError::ResponseParsing(e.to_string()))
    }
}

impl LlmClient for OllamaClient {
    fn generate(&self, model: &str, prompt: &str, system: &str) -> Result<String, IntelligenceError> {
        let body = GenerateRequest {
            model,
            prompt,
            system,
            stream: false,
            options: GenerateOptions {
                temperature: SUMMARY_TEMPERATURE,
                num_predict: SUMMARY_MAX_TOKENS,
            },
        };
        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&body)
            .send()
            .map_err(|e| self.map_send_error(e))?;

        let parsed: GenerateResponse = Self::read_json(response)?;
        if parsed.response.trim().is_empty() {
            return Err(IntelligenceError::EmptyResponse);
        }
        Ok(parsed.response)
    }

    /// Tags carry a `:variant` suffix, so `medgemma` matches `medgemma:latest`.
    fn is_model_available(&self, model: &str) -> Result<bool, IntelligenceError> {
        Ok(self.list_models()?.iter().any(|m| m.starts_with(model)))
    }

    fn list_models(&self) -> Result<Vec<String>, IntelligenceError> {
        let response = self
            .client
            .get(format!("{}/api/tags", self.base_url))
            .send()
            .map_err(|e| self.map_send_error(e))?;

        let parsed: TagsResponse = Self::read_json(response)?;
        Ok(parsed.models.into_iter().map(|m| m.name).collect())
    }
}

/// Mock LLM client for testing. Returns a fixed response, or fails when
/// built with [`MockLlmClient::failing`].
pub struct MockLlmClient {
    response: Option<String>,
    delay: Option<Duration>,
    available_models: Vec<String>,
}

impl MockLlmClient {
    pub fn new(response: &str) -> Self {
        Self {
            response: Some(response.to_string()),
            delay: None,
            available_models: vec!["medgemma:latest".to_string()],
        }
    }

    pub fn failing() -> Self {
        Self {
            response: None,
            delay: None,
            available_models: Vec::new(),
        }
    }

    /// Sleep before answering, to exercise timeouts.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_models(mut self, models: Vec<String>) -> Self {
        self.available_models = models;
        self
    }
}

impl LlmClient for MockLlmClient {
    fn generate(&self, _model: &str, _prompt: &str, _system: &str) -> Result<String, IntelligenceError> {
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        self.response
            .clone()
            .ok_or_else(|| IntelligenceError::OllamaConnection("mock".into()))
    }

    fn is_model_available(&self, model: &str) -> Result<bool, IntelligenceError> {
        Ok(self.available_models.iter().any(|m| m.starts_with(model)))
    }

    fn list_models(&self) -> Result<Vec<String>, IntelligenceError> {
        Ok(self.available_models.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_trims_trailing_slash() {
        let client = OllamaClient::new("http://localhost:11434/", 5).unwrap();
        assert_eq!(client.base_url(), "http://localhost:11434");
    }

    #[test]
    fn unreachable_server_is_connection_error() {
        let client = OllamaClient::new("http://127.0.0.1:1", 2).unwrap();
        let err = client.list_models().unwrap_err();
        assert!(matches!(
            err,
            IntelligenceError::OllamaConnection(_) | IntelligenceError::HttpClient(_)
        ));
    }

    #[test]
    fn mock_returns_response() {
        let mock = MockLlmClient::new("hello");
        assert_eq!(mock.generate("m", "p", "s").unwrap(), "hello");
        assert!(mock.is_model_available("medgemma").unwrap());
    }

    #[test]
    fn mock_model_list_configurable() {
        let mock = MockLlmClient::new("x").with_models(vec!["llama3:8b".into()]);
        assert!(!mock.is_model_available("medgemma").unwrap());
        assert!(mock.is_model_available("llama3").unwrap());
    }

    #[test]
    fn failing_mock_errors() {
        assert!(MockLlmClient::failing().generate("m", "p", "s").is_err());
    }

    #[test]
    fn request_serializes_non_streaming() {
        let body = GenerateRequest {
            model: "medgemma",
            prompt: "p",
            system: "s",
            stream: false,
            options: GenerateOptions {
                temperature: SUMMARY_TEMPERATURE,
                num_predict: SUMMARY_MAX_TOKENS,
            },
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["stream"], false);
        assert_eq!(json["model"], "medgemma");
        assert_eq!(json["options"]["num_predict"], 400);
    }
}
