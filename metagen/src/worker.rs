use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use common::{MetadataUpdate, Namespace};

use crate::{
    generator::{FetchError, Generator},
    sink::MetadataSink,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Unchanged,
    Published,
    SinkFailed,
}

/// Delay until the next fetch so fetches stay aligned on `interval` even
/// when one ran `lag` late (e.g. the host was suspended).
#[must_use]
pub fn next_delay(interval: Duration, lag: Duration) -> Duration {
    let rem = lag
        .as_nanos()
        .checked_rem(interval.as_nanos())
        .and_then(|rem| u64::try_from(rem).ok())
        .unwrap_or(0);
    interval.saturating_sub(Duration::from_nanos(rem))
}

/// Hands changed metadata to the sink and commits it as the new baseline
/// once the sink accepted it.
pub async fn publish_if_changed(
    generator: &mut Generator,
    sink: &dyn MetadataSink,
    metadata: Value,
) -> Outcome {
    if !generator.differs(&metadata) {
        debug!("metadata {} unchanged", generator.namespace());
        return Outcome::Unchanged;
    }

    let update = MetadataUpdate::new(generator.namespace().clone(), metadata);
    match sink.put(&update).await {
        Ok(()) => {
            info!("[{}] metadata {} stored", sink.name(), update.namespace);
            generator.save(update.metadata);
            Outcome::Published
        }
        Err(e) => {
            error!(
                "[{}] failed to store metadata {}: {e}",
                sink.name(),
                update.namespace
            );
            Outcome::SinkFailed
        }
    }
}

/// Drives one generator forever: fetch every `generator.interval()`,
/// starting after `initial_delay`. Failed fetches are logged and skipped.
pub async fn run_generator(
    mut generator: Generator,
    sink: Arc<dyn MetadataSink>,
    initial_delay: Duration,
) {
    let interval = generator.interval();
    info!(
        "metadata {} scheduled every {}s",
        generator.namespace(),
        interval.as_secs()
    );

    let mut delay = initial_delay;
    let mut planned = Instant::now()
        .checked_add(initial_delay)
        .unwrap_or_else(Instant::now);

    loop {
        tokio::time::sleep(delay).await;

        let result = generator.fetch().await;

        let now = Instant::now();
        delay = next_delay(interval, now.saturating_duration_since(planned));
        planned = now.checked_add(delay).unwrap_or(now);

        match result {
            Ok(metadata) => {
                publish_if_changed(&mut generator, sink.as_ref(), metadata).await;
            }
            Err(e) => warn!("{e}"),
        }
    }
}

/// Fetches every generator once, in order.
pub async fn fetch_all(generators: &[Generator]) -> Vec<(Namespace, Result<Value, FetchError>)> {
    let mut results = Vec::with_capacity(generators.len());
    for generator in generators {
        results.push((generator.namespace().clone(), generator.fetch().await));
    }
    results
}
