use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue, USER_AGENT};
use tracing::{error, info};

use common::{MetadataUpdate, Namespace};

use crate::sink::{MetadataSink, SinkError, SinkResult};

const CLIENT_TIMEOUT: u64 = 5;

/// Uploads metadata with `PUT {url}/{namespace}`, the body being the
/// metadata value itself.
#[derive(Debug, Clone)]
pub struct WebhookSink {
    url: String,
    token: Option<String>,
    client: Client,
}

impl WebhookSink {
    pub fn new(url: String, token: Option<String>) -> Result<Self, SinkError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!(
                env!("CARGO_PKG_NAME"),
                "/",
                env!("CARGO_PKG_VERSION")
            )),
        );

        let client = Client::builder()
            .timeout(Duration::from_secs(CLIENT_TIMEOUT))
            .default_headers(headers)
            .build()?;

        Ok(Self { url, token, client })
    }

    fn endpoint(&self, namespace: &Namespace) -> String {
        format!("{}/{}", self.url.trim_end_matches('/'), namespace)
    }
}

#[async_trait]
impl MetadataSink for WebhookSink {
    async fn put(&self, update: &MetadataUpdate) -> SinkResult<()> {
        let endpoint = self.endpoint(&update.namespace);
        let mut request = self.client.put(&endpoint).json(&update.metadata);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let resp = request.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            error!("{endpoint} returned {status}");
            return Err(SinkError::HttpStatus { status, body });
        }

        info!("Metadata {} uploaded to {endpoint}", update.namespace);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "webhook"
    }
}
