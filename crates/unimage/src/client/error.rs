use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("API key missing: configure one or set API_KEY / GEMINI_API_KEY")]
    MissingApiKey,

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Failed to decode response: {0}")]
    Decode(String),
}
