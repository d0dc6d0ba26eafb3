//! HTTP adapter for the Gemini generateContent API.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{self, BoxStream};
use futures_util::StreamExt;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, error, info};

use super::error::ClientError;
use super::sse::SseDecoder;
use super::types::{ErrorEnvelope, GenerateContentResponse, GenerationRequest};
use super::{GenerationClient, TextStream};
use crate::config::{resolve_api_key, ApiMode, StudioConfig};
use crate::error::ConfigError;

/// Public endpoint used in official mode or when no base URL is configured.
pub const OFFICIAL_BASE_URL: &str = "https://generativelanguage.googleapis.com";

const API_VERSION: &str = "v1beta";

/// Connect timeout only: streaming reads have no deadline.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Maximum length of an error body carried into error messages.
const MAX_ERROR_BODY_LENGTH: usize = 300;

pub struct GeminiClient {
    http: Client,
    base_url: String,
    api_key: Option<SecretString>,
}

impl GeminiClient {
    pub fn new(api_key: Option<SecretString>, base_url: Option<&str>) -> Result<Self, ClientError> {
        let http = Client::builder()
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .build()?;
        let base_url = base_url
            .map(|u| u.trim_end_matches('/').to_string())
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| OFFICIAL_BASE_URL.to_string());

        Ok(Self {
            http,
            base_url,
            api_key,
        })
    }

    /// Builds the client from the studio configuration. A missing key is not
    /// an error here; calls report [`ClientError::MissingApiKey`] instead.
    pub fn from_config(config: &StudioConfig) -> Result<Self, ConfigError> {
        let api_key = resolve_api_key(&config.api)?;
        let base_url = match config.api.mode {
            ApiMode::Custom => config.api.base_url.as_deref(),
            ApiMode::Official => None,
        };
        Self::new(api_key, base_url).map_err(|e| ConfigError::Validation {
            message: format!("Failed to create HTTP client: {}", e),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn key(&self) -> Result<&str, ClientError> {
        self.api_key
            .as_ref()
            .map(|k| k.expose_secret())
            .filter(|k| !k.is_empty())
            .ok_or(ClientError::MissingApiKey)
    }

    fn endpoint(&self, model: &str, method: &str) -> String {
        format!("{}/{}/models/{}:{}", self.base_url, API_VERSION, model, method)
    }

    async fn post(
        &self,
        url: &str,
        request: &GenerationRequest,
    ) -> Result<reqwest::Response, ClientError> {
        let key = self.key()?;
        let response = self
            .http
            .post(url)
            .header("x-goog-api-key", key)
            .json(&request.body())
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorEnvelope>(&body)
            .map(|e| e.error.message)
            .unwrap_or_else(|_| truncate(&body));
        error!(status = %status, model = %request.model, "Generation API error: {}", message);
        Err(ClientError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

fn truncate(body: &str) -> String {
    if body.len() > MAX_ERROR_BODY_LENGTH {
        let mut end = MAX_ERROR_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... (truncated)", &body[..end])
    } else {
        body.to_string()
    }
}

/// Turns decoded SSE payloads into text chunks, skipping empty ones.
fn chunk_texts(payloads: Vec<String>, out: &mut VecDeque<Result<String, ClientError>>) {
    for payload in payloads {
        match serde_json::from_str::<GenerateContentResponse>(&payload) {
            Ok(chunk) => {
                if let Some(text) = chunk.text() {
                    out.push_back(Ok(text));
                }
            }
            Err(e) => out.push_back(Err(ClientError::Decode(e.to_string()))),
        }
    }
}

struct SseState {
    bytes: BoxStream<'static, Result<Vec<u8>, reqwest::Error>>,
    decoder: SseDecoder,
    pending: VecDeque<Result<String, ClientError>>,
    finished: bool,
}

#[async_trait]
impl GenerationClient for GeminiClient {
    fn has_credentials(&self) -> bool {
        self.key().is_ok()
    }

    async fn generate(
        &self,
        request: GenerationRequest,
    ) -> Result<GenerateContentResponse, ClientError> {
        let url = self.endpoint(&request.model, "generateContent");
        debug!(model = %request.model, parts = request.parts.len(), "generateContent");
        let response = self.post(&url, &request).await?;
        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| ClientError::Decode(e.to_string()))
    }

    async fn stream(&self, request: GenerationRequest) -> Result<TextStream, ClientError> {
        let url = format!(
            "{}?alt=sse",
            self.endpoint(&request.model, "streamGenerateContent")
        );
        let response = self.post(&url, &request).await?;
        info!(model = %request.model, "SSE stream established");

        let state = SseState {
            bytes: response
                .bytes_stream()
                .map(|chunk| chunk.map(|b| b.to_vec()))
                .boxed(),
            decoder: SseDecoder::new(),
            pending: VecDeque::new(),
            finished: false,
        };

        let texts = stream::unfold(state, |mut st| async move {
            loop {
                if let Some(item) = st.pending.pop_front() {
                    return Some((item, st));
                }
                if st.finished {
                    return None;
                }
                match st.bytes.next().await {
                    Some(Ok(bytes)) => {
                        let payloads = st.decoder.push(&bytes);
                        chunk_texts(payloads, &mut st.pending);
                    }
                    Some(Err(e)) => {
                        st.finished = true;
                        st.pending.push_back(Err(ClientError::Http(e)));
                    }
                    None => {
                        st.finished = true;
                        let payloads = st.decoder.finish();
                        chunk_texts(payloads, &mut st.pending);
                    }
                }
            }
        });

        Ok(texts.boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_uses_base_url() {
        let client = GeminiClient::new(None, Some("https://proxy.example.com/")).unwrap();
        assert_eq!(
            client.endpoint("gemini-3-flash-preview", "generateContent"),
            "https://proxy.example.com/v1beta/models/gemini-3-flash-preview:generateContent"
        );
    }

    #[test]
    fn test_missing_key_reported() {
        let client = GeminiClient::new(None, None).unwrap();
        assert!(!client.has_credentials());
        assert!(matches!(client.key(), Err(ClientError::MissingApiKey)));
        assert_eq!(client.base_url(), OFFICIAL_BASE_URL);

        let client = GeminiClient::new(Some(SecretString::from("k-123")), None).unwrap();
        assert!(client.has_credentials());
    }

    #[test]
    fn test_chunk_texts_skips_empty_and_reports_garbage() {
        let mut out = VecDeque::new();
        chunk_texts(
            vec![
                r#"{"candidates":[{"content":{"parts":[{"text":"Hel"}]}}]}"#.to_string(),
                r#"{"candidates":[{"content":{"parts":[]}}]}"#.to_string(),
                "not json".to_string(),
            ],
            &mut out,
        );
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].as_ref().unwrap(), "Hel");
        assert!(matches!(out[1], Err(ClientError::Decode(_))));
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        let body = "错".repeat(200);
        let truncated = truncate(&body);
        assert!(truncated.ends_with("... (truncated)"));
    }
}
