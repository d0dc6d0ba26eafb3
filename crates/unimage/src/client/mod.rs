//! Boundary to the hosted multimodal generation API.
//!
//! The studio only talks to [`GenerationClient`]; [`GeminiClient`] is the
//! HTTP adapter and [`StubClient`] a scripted stand-in for offline runs.

pub mod error;
pub mod gemini;
pub mod sse;
pub mod stub;
pub mod types;

use async_trait::async_trait;
use futures_util::stream::BoxStream;

pub use error::ClientError;
pub use gemini::GeminiClient;
pub use stub::{StubClient, StubReply};
pub use types::{
    Candidate, Content, GenerateContentResponse, GenerationConfig, GenerationRequest,
    ImageConfig, InlineData, Part,
};

/// Progressive text output of a streaming request, in arrival order.
pub type TextStream = BoxStream<'static, Result<String, ClientError>>;

#[async_trait]
pub trait GenerationClient: Send + Sync {
    /// Whether a credential is available. Checked before any call is issued.
    fn has_credentials(&self) -> bool;

    /// Single request/response call.
    async fn generate(
        &self,
        request: GenerationRequest,
    ) -> Result<GenerateContentResponse, ClientError>;

    /// Streaming call yielding partial text chunks.
    async fn stream(&self, request: GenerationRequest) -> Result<TextStream, ClientError>;
}
