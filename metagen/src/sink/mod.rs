//! Destinations for metadata that changed since the last committed baseline.

use std::sync::Arc;

use async_trait::async_trait;

use common::MetadataUpdate;

use crate::config;

pub mod log;
pub mod webhook;

pub use log::LogSink;
pub use webhook::WebhookSink;

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("HTTP status error: {status} - Body: {body}")]
    HttpStatus {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type SinkResult<T> = Result<T, SinkError>;

#[async_trait]
pub trait MetadataSink: Send + Sync {
    async fn put(&self, update: &MetadataUpdate) -> SinkResult<()>;
    fn name(&self) -> &'static str;
}

pub fn from_config(sink: &config::Sink) -> SinkResult<Arc<dyn MetadataSink>> {
    Ok(match sink {
        config::Sink::Log => Arc::new(LogSink),
        config::Sink::Webhook { url, token } => {
            Arc::new(WebhookSink::new(url.clone(), token.clone())?)
        }
    })
}
