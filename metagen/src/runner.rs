//! Execution of plugin commands.
//!
//! The generator never spawns processes itself: it goes through a
//! [`CommandRunner`], which lets tests script command outputs.

use std::collections::BTreeMap;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use nix::sys::signal::{Signal, killpg};
use nix::unistd::Pid;
use tokio::process::Command;
use tracing::debug;

use common::MetadataPlugin;

const SHELL: &str = "/bin/sh";

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("failed to spawn command: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("failed to collect command output: {0}")]
    Io(#[source] std::io::Error),
    #[error("command timed out after {}s", .0.as_secs())]
    Timeout(Duration),
}

/// Captured result of a finished command. Stdout and stderr are kept apart.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
}

impl CommandOutput {
    #[must_use]
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, command: &str) -> Result<CommandOutput, RunError>;
}

/// Runs command lines through `/bin/sh -c` in a process group of their
/// own. On timeout the whole group is killed, including anything the
/// shell forked.
#[derive(Debug, Clone)]
pub struct ShellRunner {
    timeout: Duration,
    env: BTreeMap<String, String>,
}

impl ShellRunner {
    #[must_use]
    pub const fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            env: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_env(mut self, env: BTreeMap<String, String>) -> Self {
        self.env = env;
        self
    }

    #[must_use]
    pub fn for_plugin(plugin: &MetadataPlugin) -> Self {
        Self::new(plugin.timeout()).with_env(plugin.env.clone())
    }
}

#[async_trait]
impl CommandRunner for ShellRunner {
    async fn run(&self, command: &str) -> Result<CommandOutput, RunError> {
        let child = Command::new(SHELL)
            .arg("-c")
            .arg(command)
            .envs(&self.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0)
            .kill_on_drop(true)
            .spawn()
            .map_err(RunError::Spawn)?;

        // The shell leads its group, so the group id is its pid.
        let group = child
            .id()
            .and_then(|id| i32::try_from(id).ok())
            .map(Pid::from_raw);

        let Ok(output) = tokio::time::timeout(self.timeout, child.wait_with_output()).await
        else {
            if let Some(group) = group {
                if let Err(e) = killpg(group, Signal::SIGKILL) {
                    debug!("failed to kill process group {group}: {e}");
                }
            }
            return Err(RunError::Timeout(self.timeout));
        };
        let output = output.map_err(RunError::Io)?;

        Ok(CommandOutput {
            stdout: output.stdout,
            stderr: output.stderr,
            exit_code: output.status.code(),
        })
    }
}

#[cfg(test)]
pub mod fake {
    use std::sync::Mutex;

    use super::*;

    /// Returns the same scripted output for every command and records
    /// the command lines it was given.
    pub struct ScriptedRunner {
        stdout: Vec<u8>,
        stderr: Vec<u8>,
        exit_code: Option<i32>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedRunner {
        pub fn new(stdout: &str, exit_code: i32) -> Self {
            Self {
                stdout: stdout.as_bytes().to_vec(),
                stderr: Vec::new(),
                exit_code: Some(exit_code),
                calls: Mutex::new(Vec::new()),
            }
        }

        pub fn with_stderr(mut self, stderr: &str) -> Self {
            self.stderr = stderr.as_bytes().to_vec();
            self
        }

        pub fn killed() -> Self {
            Self {
                exit_code: None,
                ..Self::new("", 0)
            }
        }

        #[allow(clippy::unwrap_used)]
        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CommandRunner for ScriptedRunner {
        #[allow(clippy::unwrap_used)]
        async fn run(&self, command: &str) -> Result<CommandOutput, RunError> {
            self.calls.lock().unwrap().push(command.to_string());
            Ok(CommandOutput {
                stdout: self.stdout.clone(),
                stderr: self.stderr.clone(),
                exit_code: self.exit_code,
            })
        }
    }

    /// Fails every run as if the shell could not be started.
    pub struct UnavailableRunner;

    #[async_trait]
    impl CommandRunner for UnavailableRunner {
        async fn run(&self, _command: &str) -> Result<CommandOutput, RunError> {
            Err(RunError::Spawn(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "no such file or directory",
            )))
        }
    }
}
