pub const MAX_NAMESPACE_LENGTH: usize = 128;
pub const DEFAULT_INTERVAL_MINUTES: u64 = 10;
pub const MIN_INTERVAL_MINUTES: u64 = 1;
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const MAX_METADATA_DEPTH: usize = 10_000;
