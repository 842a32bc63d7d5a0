use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::debug;

use common::{MetadataPlugin, Namespace, parse_metadata, structurally_equal};

use crate::runner::{CommandRunner, ShellRunner};

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("metadata {namespace}: {message}")]
    Execution { namespace: Namespace, message: String },
    #[error("metadata {namespace}: command output is not a single JSON value: {source}")]
    Parse {
        namespace: Namespace,
        #[source]
        source: serde_json::Error,
    },
}

/// Runs one plugin command and tracks the last committed metadata.
pub struct Generator {
    namespace: Namespace,
    config: MetadataPlugin,
    runner: Arc<dyn CommandRunner>,
    previous: Option<Value>,
}

impl Generator {
    #[must_use]
    pub fn new(namespace: Namespace, config: MetadataPlugin) -> Self {
        let runner = Arc::new(ShellRunner::for_plugin(&config));
        Self::with_runner(namespace, config, runner)
    }

    #[must_use]
    pub fn with_runner(
        namespace: Namespace,
        config: MetadataPlugin,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        Self {
            namespace,
            config,
            runner,
            previous: None,
        }
    }

    #[must_use]
    pub const fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// Runs the command once and decodes its stdout as exactly one JSON
    /// value. A non-zero exit fails even when stdout holds valid JSON.
    pub async fn fetch(&self) -> Result<Value, FetchError> {
        let output = self
            .runner
            .run(&self.config.command)
            .await
            .map_err(|e| FetchError::Execution {
                namespace: self.namespace.clone(),
                message: e.to_string(),
            })?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        let stderr = stderr.trim();
        if !stderr.is_empty() {
            debug!(namespace = %self.namespace, "command stderr: {stderr}");
        }

        if !output.success() {
            let status = output
                .exit_code
                .map_or_else(|| "a signal".to_string(), |code| format!("code {code}"));
            return Err(FetchError::Execution {
                namespace: self.namespace.clone(),
                message: format!("command exited with {status}, stderr: {stderr:?}"),
            });
        }

        parse_metadata(&output.stdout).map_err(|source| FetchError::Parse {
            namespace: self.namespace.clone(),
            source,
        })
    }

    /// Makes `metadata` the baseline for [`Generator::differs`].
    pub fn save(&mut self, metadata: Value) {
        self.previous = Some(metadata);
    }

    /// True unless a baseline was saved and is structurally equal to `metadata`.
    #[must_use]
    pub fn differs(&self, metadata: &Value) -> bool {
        self.previous
            .as_ref()
            .is_none_or(|previous| !structurally_equal(previous, metadata))
    }

    #[must_use]
    pub fn interval(&self) -> Duration {
        self.config.interval()
    }
}
