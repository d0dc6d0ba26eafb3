//! Scripted [`GenerationClient`] used by tests and `--dry-run`.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use tokio::sync::Notify;

use super::error::ClientError;
use super::types::{GenerateContentResponse, GenerationRequest, Part};
use super::{GenerationClient, TextStream};

/// 1x1 transparent PNG returned when no image reply is scripted.
pub const PLACEHOLDER_PNG: &str = "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNkYPhfDwAChwGA60e6kgAAAABJRU5ErkJggg==";

/// One scripted reply, consumed in FIFO order by either call kind.
#[derive(Debug, Clone)]
pub enum StubReply {
    /// Streamed as the given chunks; joined for `generate`.
    Chunks(Vec<String>),
    /// The call itself fails.
    Fail(String),
    /// Yields `chunks`, then fails with `message`.
    FailMidStream { chunks: Vec<String>, message: String },
    /// Yields `before`, waits until `gate` is notified, then yields `after`.
    Gated {
        before: Vec<String>,
        gate: Arc<Notify>,
        after: Vec<String>,
    },
    /// Single text reply.
    Text(String),
    /// Image reply; `None` produces a response without image data.
    Image(Option<String>),
}

pub struct StubClient {
    replies: Mutex<VecDeque<StubReply>>,
    requests: Mutex<Vec<GenerationRequest>>,
    credentials: bool,
}

impl Default for StubClient {
    fn default() -> Self {
        Self::new()
    }
}

impl StubClient {
    pub fn new() -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            credentials: true,
        }
    }

    pub fn with_replies(replies: impl IntoIterator<Item = StubReply>) -> Self {
        let client = Self::new();
        client.push_all(replies);
        client
    }

    /// A client that reports no credential, like an unconfigured key.
    pub fn without_credentials(mut self) -> Self {
        self.credentials = false;
        self
    }

    pub fn push(&self, reply: StubReply) {
        self.replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(reply);
    }

    pub fn push_all(&self, replies: impl IntoIterator<Item = StubReply>) {
        let mut queue = self.replies.lock().unwrap_or_else(PoisonError::into_inner);
        queue.extend(replies);
    }

    /// Every request received so far, in call order.
    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn next(&self, request: &GenerationRequest) -> Option<StubReply> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());
        self.replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
    }
}

fn fallback_text(request: &GenerationRequest) -> String {
    let json_requested = request
        .config
        .as_ref()
        .and_then(|c| c.response_mime_type.as_deref())
        == Some("application/json");
    if json_requested {
        "[]".to_string()
    } else {
        format!("[dry-run] response from {}", request.model)
    }
}

fn wants_image(request: &GenerationRequest) -> bool {
    request
        .config
        .as_ref()
        .is_some_and(|c| c.image_config.is_some())
}

fn api_error(message: String) -> ClientError {
    ClientError::Api {
        status: 500,
        message,
    }
}

#[async_trait]
impl GenerationClient for StubClient {
    fn has_credentials(&self) -> bool {
        self.credentials
    }

    async fn generate(
        &self,
        request: GenerationRequest,
    ) -> Result<GenerateContentResponse, ClientError> {
        if !self.credentials {
            return Err(ClientError::MissingApiKey);
        }
        match self.next(&request) {
            Some(StubReply::Text(text)) => Ok(GenerateContentResponse::from_text(text)),
            Some(StubReply::Chunks(chunks)) => {
                Ok(GenerateContentResponse::from_text(chunks.concat()))
            }
            Some(StubReply::Gated { before, after, .. }) => Ok(
                GenerateContentResponse::from_text(before.concat() + &after.concat()),
            ),
            Some(StubReply::Image(Some(data))) => Ok(GenerateContentResponse::from_parts(vec![
                Part::inline("image/png", &data),
            ])),
            Some(StubReply::Image(None)) => Ok(GenerateContentResponse::default()),
            Some(StubReply::Fail(message)) | Some(StubReply::FailMidStream { message, .. }) => {
                Err(api_error(message))
            }
            None if wants_image(&request) => Ok(GenerateContentResponse::from_parts(vec![
                Part::inline("image/png", PLACEHOLDER_PNG),
            ])),
            None => Ok(GenerateContentResponse::from_text(fallback_text(&request))),
        }
    }

    async fn stream(&self, request: GenerationRequest) -> Result<TextStream, ClientError> {
        if !self.credentials {
            return Err(ClientError::MissingApiKey);
        }
        let ok = |chunks: Vec<String>| chunks.into_iter().map(Ok::<String, ClientError>);
        match self.next(&request) {
            Some(StubReply::Chunks(chunks)) => Ok(stream::iter(ok(chunks)).boxed()),
            Some(StubReply::Text(text)) => Ok(stream::iter(ok(vec![text])).boxed()),
            Some(StubReply::Fail(message)) => Err(api_error(message)),
            Some(StubReply::FailMidStream { chunks, message }) => Ok(stream::iter(ok(chunks))
                .chain(stream::once(async move { Err(api_error(message)) }))
                .boxed()),
            Some(StubReply::Gated {
                before,
                gate,
                after,
            }) => {
                let tail = stream::once(async move {
                    gate.notified().await;
                    stream::iter(ok(after))
                })
                .flatten();
                Ok(stream::iter(ok(before)).chain(tail).boxed())
            }
            Some(StubReply::Image(_)) => Err(ClientError::Decode(
                "image reply scripted for a streaming call".to_string(),
            )),
            None => {
                let text = fallback_text(&request);
                let chunks: Vec<String> = text.split_inclusive(' ').map(String::from).collect();
                Ok(stream::iter(ok(chunks)).boxed())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::TryStreamExt;

    fn request() -> GenerationRequest {
        GenerationRequest::new("model-x", vec![Part::text("hello")])
    }

    #[tokio::test]
    async fn test_replies_consumed_in_order() {
        let client = StubClient::with_replies([
            StubReply::Chunks(vec!["a".into(), "b".into()]),
            StubReply::Text("done".into()),
        ]);

        let chunks: Vec<String> = client
            .stream(request())
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        assert_eq!(chunks, vec!["a", "b"]);

        let response = client.generate(request()).await.unwrap();
        assert_eq!(response.text().as_deref(), Some("done"));
        assert_eq!(client.requests().len(), 2);
        assert_eq!(client.requests()[0].prompt_text(), "hello");
    }

    #[tokio::test]
    async fn test_fail_mid_stream_yields_chunks_then_error() {
        let client = StubClient::with_replies([StubReply::FailMidStream {
            chunks: vec!["partial".into()],
            message: "boom".into(),
        }]);
        let items: Vec<_> = client.stream(request()).await.unwrap().collect().await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap(), "partial");
        assert!(items[1].is_err());
    }

    #[tokio::test]
    async fn test_gated_waits_for_notify() {
        let gate = Arc::new(Notify::new());
        let client = StubClient::with_replies([StubReply::Gated {
            before: vec!["x".into()],
            gate: gate.clone(),
            after: vec!["y".into()],
        }]);
        let mut stream = client.stream(request()).await.unwrap();
        assert_eq!(stream.next().await.unwrap().unwrap(), "x");
        gate.notify_one();
        assert_eq!(stream.next().await.unwrap().unwrap(), "y");
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_without_credentials_rejects_calls() {
        let client = StubClient::new().without_credentials();
        assert!(!client.has_credentials());
        assert!(matches!(
            client.generate(request()).await,
            Err(ClientError::MissingApiKey)
        ));
        assert!(client.requests().is_empty());
    }

    #[tokio::test]
    async fn test_fallback_image_when_unscripted() {
        let client = StubClient::new();
        let req = request().with_config(crate::client::GenerationConfig::image("1:1"));
        let response = client.generate(req).await.unwrap();
        assert_eq!(
            response.inline_data().map(|d| d.data.as_str()),
            Some(PLACEHOLDER_PNG)
        );
    }
}
