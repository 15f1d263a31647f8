//! Text generation upstream
//!
//! [`TextGenerator`] is the seam the content generator talks to.
//! [`GeminiClient`] speaks the `generateContent` wire format, with the API key
//! passed as a `?key=` query parameter.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::GenerationConfig;
use crate::services::generator::GenerationError;

const TEMPERATURE: f32 = 0.7;
const MAX_OUTPUT_TOKENS: u32 = 4096;

/// A large-language-model completion endpoint
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Send a prompt and return the model's free-text answer
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError>;

    /// Whether the endpoint and key are configured
    fn is_configured(&self) -> bool;
}

/// Gemini `generateContent` client
pub struct GeminiClient {
    client: Client,
    api_url: Option<String>,
    api_key: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationParams,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationParams {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

impl GeminiClient {
    /// Build a client from the `generation` config section.
    ///
    /// A missing URL or key is not an error here; it surfaces on the first
    /// [`TextGenerator::generate`] call.
    pub fn from_config(config: &GenerationConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build HTTP client: {}", e))?;

        Ok(Self {
            client,
            api_url: non_empty(config.api_url.as_deref()),
            api_key: non_empty(config.api_key.as_deref()),
        })
    }
}

#[async_trait]
impl TextGenerator for GeminiClient {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let api_url = self
            .api_url
            .as_deref()
            .ok_or(GenerationError::NotConfigured("generation API URL"))?;
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(GenerationError::NotConfigured("generation API key"))?;

        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part { text: prompt }],
            }],
            generation_config: GenerationParams {
                temperature: TEMPERATURE,
                max_output_tokens: MAX_OUTPUT_TOKENS,
            },
        };

        let response = self
            .client
            .post(api_url)
            .query(&[("key", api_key)])
            .json(&request)
            .send()
            .await
            .map_err(|e| GenerationError::Upstream(format!("Generation request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(GenerationError::Upstream(format!(
                "Generation API returned {}: {}",
                status, error_text
            )));
        }

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::Upstream(format!("Invalid generation response: {}", e)))?;

        body.candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .and_then(|c| c.parts.into_iter().next())
            .and_then(|p| p.text)
            .ok_or(GenerationError::EmptyResponse)
    }

    fn is_configured(&self) -> bool {
        self.api_url.is_some() && self.api_key.is_some()
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(url: Option<String>, key: Option<&str>) -> GenerationConfig {
        GenerationConfig {
            api_url: url,
            api_key: key.map(str::to_string),
            ..GenerationConfig::default()
        }
    }

    #[tokio::test]
    async fn test_generate_reads_first_candidate() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/generate"))
            .and(query_param("key", "secret"))
            .and(body_partial_json(serde_json::json!({
                "contents": [{"parts": [{"text": "hello"}]}],
                "generationConfig": {"maxOutputTokens": 4096}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "candidates": [
                    {"content": {"parts": [{"text": "first"}]}},
                    {"content": {"parts": [{"text": "second"}]}}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client =
            GeminiClient::from_config(&config(Some(format!("{}/v1/generate", server.uri())), Some("secret")))
                .unwrap();
        assert!(client.is_configured());
        assert_eq!(client.generate("hello").await.unwrap(), "first");
    }

    #[tokio::test]
    async fn test_missing_key_is_reported_at_call_time() {
        let client = GeminiClient::from_config(&config(Some("http://localhost:1".into()), None)).unwrap();
        assert!(!client.is_configured());

        let err = client.generate("hi").await.unwrap_err();
        assert!(matches!(err, GenerationError::NotConfigured(_)));
    }

    #[tokio::test]
    async fn test_blank_url_counts_as_missing() {
        let client = GeminiClient::from_config(&config(Some("  ".into()), Some("k"))).unwrap();
        let err = client.generate("hi").await.unwrap_err();
        assert!(matches!(err, GenerationError::NotConfigured(_)));
    }

    #[tokio::test]
    async fn test_upstream_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("quota exceeded"))
            .mount(&server)
            .await;

        let client = GeminiClient::from_config(&config(Some(server.uri()), Some("k"))).unwrap();
        match client.generate("hi").await.unwrap_err() {
            GenerationError::Upstream(msg) => {
                assert!(msg.contains("429"));
                assert!(msg.contains("quota exceeded"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_no_candidates_is_empty_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"candidates": []})))
            .mount(&server)
            .await;

        let client = GeminiClient::from_config(&config(Some(server.uri()), Some("k"))).unwrap();
        assert!(matches!(
            client.generate("hi").await.unwrap_err(),
            GenerationError::EmptyResponse
        ));
    }
}
