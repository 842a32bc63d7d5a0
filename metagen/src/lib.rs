//! Periodic metadata collection from external commands.
//!
//! Each configured plugin gets a [`Generator`] that runs its command,
//! decodes stdout as one JSON value and remembers the last value a
//! [`MetadataSink`] accepted, so unchanged metadata is not stored twice.

pub mod config;
pub mod generator;
pub mod runner;
pub mod sink;
pub mod worker;

pub use generator::{FetchError, Generator};
pub use runner::{CommandOutput, CommandRunner, RunError, ShellRunner};
pub use sink::{MetadataSink, SinkError};
