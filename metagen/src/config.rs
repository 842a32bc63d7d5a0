use std::collections::BTreeMap;
use std::fs;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{Builder, Rotation};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt as tracing_fmt;
use tracing_subscriber::prelude::*;
use url::Url;

use common::{MetadataPlugin, Namespace};

use crate::generator::Generator;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    #[default]
    Daily,
    Weekly,
    Never,
}

impl LogRotation {
    #[must_use]
    pub fn to_rotation(self) -> Rotation {
        match self {
            LogRotation::Daily => Rotation::DAILY,
            LogRotation::Weekly => Rotation::WEEKLY,
            LogRotation::Never => Rotation::NEVER,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

fn default_max_log_files() -> usize {
    7
}

fn default_initial_delay() -> u64 {
    10
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub logging: Logging,
    #[serde(default)]
    pub worker: Worker,
    #[serde(default)]
    pub sink: Sink,
    #[serde(default)]
    pub plugin: Plugins,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Logging {
    /// Directory of the rolling log file; stdout only when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<String>,
    #[serde(default)]
    pub rotation: LogRotation,
    #[serde(default = "default_max_log_files")]
    pub max_log_files: usize,
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for Logging {
    fn default() -> Self {
        Self {
            dir: None,
            rotation: LogRotation::default(),
            max_log_files: default_max_log_files(),
            format: LogFormat::default(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Worker {
    #[serde(default = "default_initial_delay")]
    pub initial_delay_secs: u64,
}

impl Worker {
    #[must_use]
    pub const fn initial_delay(&self) -> Duration {
        Duration::from_secs(self.initial_delay_secs)
    }
}

impl Default for Worker {
    fn default() -> Self {
        Self {
            initial_delay_secs: default_initial_delay(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Sink {
    #[default]
    Log,
    Webhook {
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        token: Option<String>,
    },
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Plugins {
    #[serde(default)]
    pub metadata: BTreeMap<Namespace, MetadataPlugin>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Failed to setup logging: {0}")]
    LoggingSetup(tracing_appender::rolling::InitError),
    #[error("Failed to install logger: {0}")]
    LoggerInit(#[from] tracing_subscriber::util::TryInitError),
}

impl Config {
    pub fn new(path: &str) -> Result<Self, ConfigError> {
        let config_file = fs::read_to_string(path)?;
        let cfg: Self = toml::from_str(&config_file)?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.plugin.metadata.is_empty() {
            return Err(ConfigError::Validation(
                "at least one [plugin.metadata.<name>] section is required".to_string(),
            ));
        }

        for (namespace, plugin) in &self.plugin.metadata {
            plugin.validate().map_err(|e| {
                ConfigError::Validation(format!("plugin.metadata.{namespace}: {e}"))
            })?;
        }

        if let Sink::Webhook { url, .. } = &self.sink {
            let parsed = Url::parse(url)
                .map_err(|e| ConfigError::Validation(format!("sink.url {url:?}: {e}")))?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(ConfigError::Validation(format!(
                    "sink.url must use http or https (got '{}')",
                    parsed.scheme()
                )));
            }
        }

        Ok(())
    }

    /// One generator per configured metadata plugin, ordered by namespace.
    #[must_use]
    pub fn generators(&self) -> Vec<Generator> {
        self.plugin
            .metadata
            .iter()
            .map(|(namespace, plugin)| Generator::new(namespace.clone(), plugin.clone()))
            .collect()
    }

    pub fn init_logger(&self) -> Result<Vec<WorkerGuard>, ConfigError> {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        let (stdout_nb, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());

        let registry = tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_fmt::layer().with_writer(stdout_nb));

        let Some(dir) = &self.logging.dir else {
            registry.try_init()?;
            return Ok(vec![stdout_guard]);
        };

        let file_appender = Builder::new()
            .rotation(self.logging.rotation.to_rotation())
            .filename_prefix("metagen")
            .filename_suffix("log")
            .max_log_files(self.logging.max_log_files)
            .build(dir)
            .map_err(ConfigError::LoggingSetup)?;
        let (file_nb, file_guard) = tracing_appender::non_blocking(file_appender);

        match self.logging.format {
            LogFormat::Text => {
                registry
                    .with(tracing_fmt::layer().with_writer(file_nb))
                    .try_init()?;
            }
            LogFormat::Json => {
                registry
                    .with(tracing_fmt::layer().json().with_writer(file_nb))
                    .try_init()?;
            }
        }

        Ok(vec![stdout_guard, file_guard])
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn load(content: &str) -> Result<Config, ConfigError> {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(content.as_bytes()).unwrap();
        Config::new(temp_file.path().to_str().unwrap())
    }

    #[test]
    fn test_config_minimal() {
        let config = load(
            r#"
[plugin.metadata.hostinfo]
command = "hostinfo --json"
"#,
        )
        .unwrap();

        assert!(config.logging.dir.is_none());
        assert_eq!(config.logging.rotation, LogRotation::Daily);
        assert_eq!(config.logging.max_log_files, 7);
        assert_eq!(config.logging.format, LogFormat::Text);
        assert_eq!(config.worker.initial_delay(), Duration::from_secs(10));
        assert_eq!(config.sink, Sink::Log);

        let ns = Namespace::try_from("hostinfo").unwrap();
        let plugin = &config.plugin.metadata[&ns];
        assert_eq!(plugin.command, "hostinfo --json");
        assert_eq!(plugin.execution_interval, None);
        assert_eq!(plugin.interval(), Duration::from_secs(600));
    }

    #[test]
    fn test_config_full() {
        let config = load(
            r#"
[logging]
dir = "/var/log/metagen"
rotation = "weekly"
max_log_files = 3
format = "json"

[worker]
initial_delay_secs = 0

[sink]
kind = "webhook"
url = "https://example.com/api/v0/hosts/abc/metadata"
token = "s3cret"

[plugin.metadata.hostinfo]
command = "hostinfo --json"
execution_interval = 30
timeout_seconds = 5
env = { LANG = "C" }

[plugin.metadata."disk.usage"]
command = "df --output=pcent / | tail -n1"
execution_interval = 0
"#,
        )
        .unwrap();

        assert_eq!(config.logging.dir.as_deref(), Some("/var/log/metagen"));
        assert_eq!(config.logging.rotation, LogRotation::Weekly);
        assert_eq!(config.logging.max_log_files, 3);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.worker.initial_delay(), Duration::ZERO);
        assert_eq!(
            config.sink,
            Sink::Webhook {
                url: "https://example.com/api/v0/hosts/abc/metadata".to_string(),
                token: Some("s3cret".to_string()),
            }
        );

        let hostinfo = &config.plugin.metadata[&Namespace::try_from("hostinfo").unwrap()];
        assert_eq!(hostinfo.interval(), Duration::from_secs(30 * 60));
        assert_eq!(hostinfo.timeout(), Duration::from_secs(5));
        assert_eq!(hostinfo.env.get("LANG").map(String::as_str), Some("C"));

        let disk = &config.plugin.metadata[&Namespace::try_from("disk.usage").unwrap()];
        assert_eq!(disk.interval(), Duration::from_secs(60));

        let generators = config.generators();
        let names: Vec<&str> = generators.iter().map(|g| g.namespace().as_str()).collect();
        assert_eq!(names, vec!["disk.usage", "hostinfo"]);
        assert_eq!(generators[0].interval(), Duration::from_secs(60));
    }

    #[test]
    fn test_config_serialization() {
        let mut config = Config::default();
        config.plugin.metadata.insert(
            Namespace::try_from("hostinfo").unwrap(),
            MetadataPlugin::new("hostinfo --json"),
        );

        let toml_string = toml::to_string(&config).unwrap();
        assert!(toml_string.contains("command = \"hostinfo --json\""));
        assert!(toml_string.contains("kind = \"log\""));

        let deserialized: Config = toml::from_str(&toml_string).unwrap();
        assert_eq!(deserialized.plugin.metadata, config.plugin.metadata);
        assert_eq!(deserialized.sink, Sink::Log);
    }

    #[test]
    fn test_config_requires_plugins() {
        let err = load("[worker]\ninitial_delay_secs = 1\n").unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn test_config_empty_command() {
        let err = load("[plugin.metadata.empty]\ncommand = \"  \"\n").unwrap_err();
        match err {
            ConfigError::Validation(msg) => assert!(msg.contains("plugin.metadata.empty")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_config_invalid_namespace() {
        let err = load("[plugin.metadata.\"bad name\"]\ncommand = \"true\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Toml(_)));
    }

    #[test]
    fn test_config_missing_command() {
        let err = load("[plugin.metadata.hostinfo]\nexecution_interval = 5\n").unwrap_err();
        assert!(matches!(err, ConfigError::Toml(_)));
    }

    #[test]
    fn test_config_invalid_webhook_url() {
        let base = "[plugin.metadata.hostinfo]\ncommand = \"true\"\n";

        let err = load(&format!("{base}[sink]\nkind = \"webhook\"\nurl = \"not a url\"\n"))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));

        let err = load(&format!(
            "{base}[sink]\nkind = \"webhook\"\nurl = \"ftp://example.com/\"\n"
        ))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn test_log_rotation_mapping() {
        assert_eq!(LogRotation::Daily.to_rotation(), Rotation::DAILY);
        assert_eq!(LogRotation::Weekly.to_rotation(), Rotation::WEEKLY);
        assert_eq!(LogRotation::Never.to_rotation(), Rotation::NEVER);
    }

    #[test]
    fn test_shipped_config() {
        let config = load(include_str!("../../configs/metagen.toml")).unwrap();
        assert_eq!(config.sink, Sink::Log);
        assert_eq!(config.plugin.metadata.len(), 2);
    }

    #[test]
    fn test_config_missing_file() {
        let err = Config::new("/nonexistent/metagen.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
