// ── Batch state fetcher ──
//
// Pulls current values over HTTP without tripping the controller's
// connection limits: the full load is strictly sequential with a pause
// between requests, the room variant runs small concurrent batches with a
// pause between batches. Individual failures are recorded, never fatal.

use std::future::Future;
use std::time::Duration;

use futures_util::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use hausync_api::HttpClient;

use crate::store::StateStore;

/// Anything that can read a single state value.
pub trait StateSource: Send + Sync {
    fn fetch_state(&self, id: &str) -> impl Future<Output = Result<f64, hausync_api::Error>> + Send;
}

impl StateSource for HttpClient {
    fn fetch_state(&self, id: &str) -> impl Future<Output = Result<f64, hausync_api::Error>> + Send {
        HttpClient::fetch_state(self, id)
    }
}

/// Pacing for batch loads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchSettings {
    /// Pause between sequential requests in [`BatchFetcher::fetch_all`].
    pub request_delay: Duration,
    /// Concurrent requests per batch in [`BatchFetcher::fetch_room`].
    pub room_batch_size: usize,
    /// Pause between room batches.
    pub room_batch_delay: Duration,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            request_delay: Duration::from_millis(50),
            room_batch_size: 4,
            room_batch_delay: Duration::from_millis(100),
        }
    }
}

/// One id that could not be fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchFailure {
    pub id: String,
    pub message: String,
}

/// Outcome of a batch load.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FetchReport {
    /// Values written to the store.
    pub observed: usize,
    pub errors: Vec<FetchFailure>,
    /// The load stopped early because it was cancelled.
    pub cancelled: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BatchFetcher {
    settings: FetchSettings,
}

impl BatchFetcher {
    pub fn new(settings: FetchSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> FetchSettings {
        self.settings
    }

    /// Fetch every id one at a time, pausing between requests.
    pub async fn fetch_all<S: StateSource>(
        &self,
        source: &S,
        ids: &[String],
        store: &StateStore,
        cancel: &CancellationToken,
    ) -> FetchReport {
        let mut report = FetchReport::default();
        info!(count = ids.len(), "starting sequential state load");

        for (i, id) in ids.iter().enumerate() {
            if i > 0 && !pause(cancel, self.settings.request_delay).await {
                report.cancelled = true;
                break;
            }

            let result = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    report.cancelled = true;
                    break;
                }
                r = source.fetch_state(id) => r,
            };
            record(&mut report, store, id, result);
        }

        info!(
            observed = report.observed,
            failed = report.errors.len(),
            cancelled = report.cancelled,
            "sequential state load finished"
        );
        report
    }

    /// Fetch ids in small concurrent batches, pausing between batches.
    pub async fn fetch_room<S: StateSource>(
        &self,
        source: &S,
        ids: &[String],
        store: &StateStore,
        cancel: &CancellationToken,
    ) -> FetchReport {
        let mut report = FetchReport::default();
        let batch_size = self.settings.room_batch_size.max(1);

        for (i, batch) in ids.chunks(batch_size).enumerate() {
            if i > 0 && !pause(cancel, self.settings.room_batch_delay).await {
                report.cancelled = true;
                break;
            }

            let results = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    report.cancelled = true;
                    break;
                }
                r = join_all(batch.iter().map(|id| source.fetch_state(id))) => r,
            };
            for (id, result) in batch.iter().zip(results) {
                record(&mut report, store, id, result);
            }
        }

        debug!(
            observed = report.observed,
            failed = report.errors.len(),
            "room state batch finished"
        );
        report
    }
}

/// Sleep for `delay`; `false` if cancelled first.
async fn pause(cancel: &CancellationToken, delay: Duration) -> bool {
    if delay.is_zero() {
        return !cancel.is_cancelled();
    }
    tokio::select! {
        biased;
        () = cancel.cancelled() => false,
        () = tokio::time::sleep(delay) => true,
    }
}

fn record(
    report: &mut FetchReport,
    store: &StateStore,
    id: &str,
    result: Result<f64, hausync_api::Error>,
) {
    match result {
        Ok(value) => {
            store.update(id, value);
            report.observed += 1;
        }
        Err(e) => {
            warn!(id, error = %e, "state fetch failed");
            report.errors.push(FetchFailure {
                id: id.to_owned(),
                message: e.to_string(),
            });
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tokio::time::Instant;

    use super::*;

    /// Source that tracks concurrency and request start times.
    #[derive(Default)]
    struct CountingSource {
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        starts: Mutex<Vec<Instant>>,
        latency: Duration,
    }

    impl CountingSource {
        fn with_latency(latency: Duration) -> Self {
            Self {
                latency,
                ..Self::default()
            }
        }
    }

    impl StateSource for CountingSource {
        fn fetch_state(
            &self,
            id: &str,
        ) -> impl Future<Output = Result<f64, hausync_api::Error>> + Send {
            let id = id.to_owned();
            async move {
                self.starts.lock().unwrap().push(Instant::now());
                let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                self.max_in_flight.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(self.latency).await;
                self.in_flight.fetch_sub(1, Ordering::SeqCst);

                if id.starts_with("bad") {
                    Err(hausync_api::Error::Api {
                        status: 500,
                        message: "boom".into(),
                    })
                } else {
                    Ok(1.0)
                }
            }
        }
    }

    fn ids(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("id-{i}")).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn fetch_all_keeps_one_request_in_flight() {
        let source = CountingSource::with_latency(Duration::from_millis(10));
        let store = StateStore::new();
        let fetcher = BatchFetcher::default();

        let report = fetcher
            .fetch_all(&source, &ids(6), &store, &CancellationToken::new())
            .await;

        assert_eq!(report.observed, 6);
        assert_eq!(source.max_in_flight.load(Ordering::SeqCst), 1);
        assert_eq!(store.len(), 6);

        let starts = source.starts.lock().unwrap().clone();
        for pair in starts.windows(2) {
            // latency + inter-request delay between consecutive starts
            assert!(pair[1] - pair[0] >= Duration::from_millis(60));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn fetch_room_runs_bounded_batches() {
        let source = CountingSource::with_latency(Duration::from_millis(10));
        let store = StateStore::new();
        let fetcher = BatchFetcher::default();

        let report = fetcher
            .fetch_room(&source, &ids(10), &store, &CancellationToken::new())
            .await;

        assert_eq!(report.observed, 10);
        assert_eq!(source.max_in_flight.load(Ordering::SeqCst), 4);

        let starts = source.starts.lock().unwrap().clone();
        // Batches start at 0, 110ms and 220ms.
        assert!(starts[4] - starts[0] >= Duration::from_millis(110));
        assert!(starts[8] - starts[4] >= Duration::from_millis(110));
    }

    #[tokio::test(start_paused = true)]
    async fn failures_are_recorded_not_fatal() {
        let source = CountingSource::default();
        let store = StateStore::new();
        let ids = vec!["a".to_owned(), "bad-1".to_owned(), "c".to_owned()];

        let report = BatchFetcher::default()
            .fetch_all(&source, &ids, &store, &CancellationToken::new())
            .await;

        assert_eq!(report.observed, 2);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].id, "bad-1");
        assert!(store.get("c").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_the_load() {
        let source = CountingSource::with_latency(Duration::from_millis(10));
        let store = StateStore::new();
        let cancel = CancellationToken::new();

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(130)).await;
            canceller.cancel();
        });

        let report = BatchFetcher::default()
            .fetch_all(&source, &ids(100), &store, &cancel)
            .await;

        assert!(report.cancelled);
        assert!(report.observed < 100);
        assert!(report.observed >= 2);
    }
}
