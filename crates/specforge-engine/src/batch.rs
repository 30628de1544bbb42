//! Concurrency-bounded, rate-limited batch execution
//!
//! [`BatchRunner::run`] spawns one tokio task per item and collects results in
//! input order. Dispatch happens from the calling task, so the concurrency
//! bound and the spacing between starts are enforced in one place.

use futures::FutureExt;
use futures::stream::{FuturesUnordered, StreamExt};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinError;
use tokio::time::Instant;
use tracing::{Instrument, debug, warn};

/// Dispatch policy for a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BatchOptions {
    /// Maximum tasks in flight; 0 means unbounded
    pub max_concurrency: usize,
    /// Minimum spacing between successive task starts
    pub delay: Duration,
    /// Stop dispatching at the first failure and return it
    pub fail_fast: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BatchRunner {
    options: BatchOptions,
}

impl BatchRunner {
    #[must_use]
    pub const fn new(options: BatchOptions) -> Self {
        Self { options }
    }

    /// Map `f` over `items`.
    ///
    /// Without fail-fast this always returns `Ok` with one result per item,
    /// in input order. With fail-fast the first failure observed is returned
    /// as `Err`; items not yet dispatched never start, and tasks already
    /// running are detached with their results discarded.
    ///
    /// A panicking task is reported as that item's error via `E: From<JoinError>`.
    pub async fn run<I, T, E, F, Fut>(&self, items: Vec<I>, f: F) -> Result<Vec<Result<T, E>>, E>
    where
        I: Send + 'static,
        T: Send + 'static,
        E: From<JoinError> + Send + 'static,
        F: Fn(I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let total = items.len();
        let limit = (self.options.max_concurrency > 0).then_some(self.options.max_concurrency);
        let fail_fast = self.options.fail_fast;
        let f = Arc::new(f);

        let mut slots: Vec<Option<Result<T, E>>> = (0..total).map(|_| None).collect();
        let mut running = FuturesUnordered::new();
        let mut next_start: Option<Instant> = None;

        debug!(
            items = total,
            max_concurrency = self.options.max_concurrency,
            delay_ms = u64::try_from(self.options.delay.as_millis()).unwrap_or(u64::MAX),
            fail_fast,
            "Starting batch"
        );

        for (index, item) in items.into_iter().enumerate() {
            // Wait for a free slot and the dispatch spacing, recording
            // completions in the meantime.
            loop {
                if fail_fast {
                    while let Some(Some(done)) = running.next().now_or_never() {
                        record(&mut slots, done, fail_fast)?;
                    }
                }
                let slot_free = limit.is_none_or(|l| running.len() < l);
                let due = next_start.is_none_or(|t| Instant::now() >= t);
                if slot_free && due {
                    break;
                }
                let wake_at = next_start.unwrap_or_else(Instant::now);
                tokio::select! {
                    Some(done) = running.next(), if !running.is_empty() => {
                        record(&mut slots, done, fail_fast)?;
                    }
                    () = tokio::time::sleep_until(wake_at), if !due => {}
                }
            }

            let f = Arc::clone(&f);
            let handle = tokio::spawn(async move { f(item).await }.in_current_span());
            running.push(async move { (index, handle.await) });
            if !self.options.delay.is_zero() {
                next_start = Some(Instant::now() + self.options.delay);
            }
        }

        while let Some(done) = running.next().await {
            record(&mut slots, done, fail_fast)?;
        }

        Ok(slots.into_iter().flatten().collect())
    }
}

fn record<T, E: From<JoinError>>(
    slots: &mut [Option<Result<T, E>>],
    (index, joined): (usize, Result<Result<T, E>, JoinError>),
    fail_fast: bool,
) -> Result<(), E> {
    let result = joined.unwrap_or_else(|join_err| {
        warn!(index, error = %join_err, "Batch task did not complete");
        Err(E::from(join_err))
    });
    match result {
        Err(e) if fail_fast => {
            debug!(index, "Batch item failed; fail-fast stops dispatch");
            Err(e)
        }
        other => {
            if let Some(slot) = slots.get_mut(index) {
                *slot = Some(other);
            }
            Ok(())
        }
    }
}
