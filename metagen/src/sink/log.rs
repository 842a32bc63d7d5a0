use async_trait::async_trait;
use tracing::info;

use common::MetadataUpdate;

use crate::sink::{MetadataSink, SinkResult};

/// Writes changed metadata to the log instead of uploading it.
pub struct LogSink;

#[async_trait]
impl MetadataSink for LogSink {
    async fn put(&self, update: &MetadataUpdate) -> SinkResult<()> {
        let metadata = serde_json::to_string(&update.metadata)?;
        info!(
            namespace = %update.namespace,
            fetched_at = %update.fetched_at.to_rfc3339(),
            "metadata updated: {metadata}"
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log"
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use common::Namespace;
    use serde_json::json;

    #[tokio::test]
    async fn test_log_sink_accepts_any_value() {
        let namespace = Namespace::try_from("inventory").unwrap();
        for value in [json!(null), json!({"a": [1, null]}), json!("x")] {
            let update = MetadataUpdate::new(namespace.clone(), value);
            assert!(LogSink.put(&update).await.is_ok());
        }
        assert_eq!(LogSink.name(), "log");
    }
}
