//! The refresh cache: the single owner of the dashboard's current snapshot.
//!
//! Snapshots are immutable and published whole through a `watch` channel, so
//! readers only ever see the previous or the next one. Refreshes are
//! serialized by a mutex; a trigger that queued up behind a refresh that has
//! since finished takes that result instead of starting another one.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Local};
use log::{debug, error, info, warn};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::dashboard::Snapshot;
use crate::error::DashboardError;
use crate::providers::jenkins::{
    dedupe_running, latest_per_job, normalize_build, normalize_queue_item, sort_queue, BuildKind,
    Fetcher,
};

/// Appended to the snapshot error when an on-demand refresh outlives its wait.
pub const INCOMPLETE_NOTE: &str = "Some data may be incomplete (refresh still in progress)";

/// The three upstream queries a refresh is made of.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Query {
    Running,
    Queued,
    Latest,
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Running => "running builds",
            Self::Queued => "queued builds",
            Self::Latest => "latest builds",
        })
    }
}

/// One failed query of an otherwise published refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryFailure {
    pub query: Query,
    pub message: String,
}

impl QueryFailure {
    fn new(query: Query, err: &DashboardError) -> Self {
        error!("Error fetching {query}: {err}");
        Self {
            query,
            message: err.to_string(),
        }
    }
}

impl fmt::Display for QueryFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Error fetching {}: {}", self.query, self.message)
    }
}

/// Result of an on-demand refresh with a bounded wait.
#[derive(Debug, Clone)]
pub struct RefreshOutcome {
    pub snapshot: Arc<Snapshot>,
    /// `false` when the wait ran out and `snapshot` is the previous one
    pub completed: bool,
}

struct Inner<F> {
    fetcher: F,
    latest_limit: usize,
    snapshot: watch::Sender<Arc<Snapshot>>,
    refresh_lock: tokio::sync::Mutex<()>,
    /// Bumped after every published snapshot
    generation: AtomicU64,
    shutdown: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

/// Shared handle to the dashboard cache. Clones refer to the same cache.
pub struct RefreshCache<F> {
    inner: Arc<Inner<F>>,
}

impl<F> Clone for RefreshCache<F> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<F: Fetcher + 'static> RefreshCache<F> {
    /// Creates a cache holding an empty snapshot. Nothing is fetched until
    /// [`RefreshCache::start`] or a refresh is triggered.
    pub fn new(fetcher: F, latest_limit: usize) -> Self {
        let (snapshot, _) = watch::channel(Arc::new(Snapshot::empty(Local::now())));
        let (shutdown, _) = watch::channel(false);

        Self {
            inner: Arc::new(Inner {
                fetcher,
                latest_limit,
                snapshot,
                refresh_lock: tokio::sync::Mutex::new(()),
                generation: AtomicU64::new(0),
                shutdown,
                task: Mutex::new(None),
            }),
        }
    }

    /// The most recently published snapshot.
    pub fn current(&self) -> Arc<Snapshot> {
        Arc::clone(&self.inner.snapshot.borrow())
    }

    /// Receiver that is notified whenever a new snapshot is published.
    pub fn subscribe(&self) -> watch::Receiver<Arc<Snapshot>> {
        self.inner.snapshot.subscribe()
    }

    /// Refreshes and returns the resulting snapshot.
    ///
    /// If another refresh completes while this call waits for its turn, that
    /// refresh's snapshot is returned and no new one is built.
    pub async fn refresh_now(&self) -> Arc<Snapshot> {
        let observed = self.inner.generation.load(Ordering::Acquire);
        let _guard = self.inner.refresh_lock.lock().await;

        if self.inner.generation.load(Ordering::Acquire) != observed {
            debug!("Joined a refresh that finished while waiting");
            return self.current();
        }

        let snapshot = Arc::new(
            build_snapshot(&self.inner.fetcher, self.inner.latest_limit, Local::now()).await,
        );
        self.inner.snapshot.send_replace(Arc::clone(&snapshot));
        self.inner.generation.fetch_add(1, Ordering::AcqRel);
        snapshot
    }

    /// Triggers a refresh and waits at most `timeout` for it.
    ///
    /// When the wait runs out the refresh keeps going in the background and
    /// the previous snapshot is returned with [`INCOMPLETE_NOTE`] attached.
    pub async fn refresh_with_timeout(&self, timeout: Duration) -> RefreshOutcome {
        let cache = self.clone();
        let refresh = tokio::spawn(async move { cache.refresh_now().await });

        match tokio::time::timeout(timeout, refresh).await {
            Ok(Ok(snapshot)) => RefreshOutcome {
                snapshot,
                completed: true,
            },
            Ok(Err(e)) => {
                error!("Refresh task failed: {e}");
                RefreshOutcome {
                    snapshot: self.current(),
                    completed: false,
                }
            }
            Err(_) => {
                warn!("Refresh still running after {timeout:?}, serving previous snapshot");
                RefreshOutcome {
                    snapshot: Arc::new(self.current().with_note(INCOMPLETE_NOTE)),
                    completed: false,
                }
            }
        }
    }

    /// Starts the periodic refresh loop. The first refresh runs immediately.
    pub fn start(&self, interval: Duration) {
        let cache = self.clone();
        let mut stop = self.inner.shutdown.subscribe();

        let handle = tokio::spawn(async move {
            info!("Refreshing dashboard every {}s", interval.as_secs_f64());
            while !*stop.borrow() {
                cache.refresh_now().await;

                tokio::select! {
                    () = tokio::time::sleep(interval) => {}
                    changed = stop.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }
            debug!("Refresh loop stopped");
        });

        if let Ok(mut task) = self.inner.task.lock() {
            if let Some(previous) = task.replace(handle) {
                previous.abort();
            }
        }
    }

    /// Stops the periodic loop and waits up to `grace` for in-flight refreshes.
    ///
    /// Returns `false` if a refresh was still running when the grace period ended.
    /// Upstream queries are never cancelled.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        self.inner.shutdown.send_replace(true);
        let task = self.inner.task.lock().ok().and_then(|mut task| task.take());

        let drained = async {
            if let Some(task) = task {
                if let Err(e) = task.await {
                    warn!("Refresh loop ended abnormally: {e}");
                }
            }
            drop(self.inner.refresh_lock.lock().await);
        };

        if tokio::time::timeout(grace, drained).await.is_ok() {
            info!("Refresh cache stopped");
            true
        } else {
            warn!("Refresh still in flight after {}s, stopping anyway", grace.as_secs_f64());
            false
        }
    }
}

/// Runs the three queries independently and assembles a snapshot from
/// whatever succeeded.
pub async fn build_snapshot<F: Fetcher + ?Sized>(
    fetcher: &F,
    latest_limit: usize,
    now: DateTime<Local>,
) -> Snapshot {
    let (running, queued, latest) = tokio::join!(
        fetcher.fetch_running_builds(),
        fetcher.fetch_queue(),
        fetcher.fetch_latest_builds(latest_limit),
    );

    let now_millis = now.timestamp_millis();
    let mut failures = Vec::new();

    let running_builds = match running {
        Ok(records) => dedupe_running(
            records
                .iter()
                .map(|r| normalize_build(r, BuildKind::Running, now_millis))
                .collect(),
        ),
        Err(e) => {
            failures.push(QueryFailure::new(Query::Running, &e));
            Vec::new()
        }
    };

    let queued_builds = match queued {
        Ok(records) => sort_queue(
            records
                .iter()
                .map(|r| normalize_queue_item(r, now_millis))
                .collect(),
        ),
        Err(e) => {
            failures.push(QueryFailure::new(Query::Queued, &e));
            Vec::new()
        }
    };

    let latest_builds = match latest {
        Ok(records) => latest_per_job(
            records
                .iter()
                .map(|r| normalize_build(r, BuildKind::Completed, now_millis))
                .collect(),
            latest_limit,
        ),
        Err(e) => {
            failures.push(QueryFailure::new(Query::Latest, &e));
            Vec::new()
        }
    };

    info!(
        "Dashboard data refreshed: {} running, {} queued, {} latest",
        running_builds.len(),
        queued_builds.len(),
        latest_builds.len()
    );

    let error = (!failures.is_empty()).then(|| {
        failures
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ")
    });

    Snapshot {
        running_builds,
        queued_builds,
        latest_builds,
        captured_at: now,
        error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::providers::jenkins::RawRecord;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::atomic::AtomicUsize;

    /// In-memory upstream with canned answers, an optional delay and a call counter.
    #[derive(Default)]
    struct ScriptedFetcher {
        running: Vec<Value>,
        queue: Vec<Value>,
        latest: Vec<Value>,
        failing: Vec<Query>,
        delay: Duration,
        refreshes: AtomicUsize,
    }

    impl ScriptedFetcher {
        fn healthy() -> Self {
            let now = Local::now().timestamp_millis();
            Self {
                running: vec![
                    json!({"url": "https://ci/job/api/7/", "number": 7, "jobName": "api",
                           "estimatedDuration": 60_000, "timestamp": now - 30_000}),
                    json!({"url": "https://ci/job/api/7/", "number": 7, "jobName": "api",
                           "estimatedDuration": 60_000, "timestamp": now - 30_000}),
                ],
                queue: vec![json!({"id": 1, "task": {"name": "web"}, "why": "Waiting",
                                   "inQueueSince": now - 5_000})],
                latest: vec![json!({"jobName": "docs", "number": 3, "result": "SUCCESS",
                                    "timestamp": now - 60_000, "duration": 1_000})],
                ..Self::default()
            }
        }

        fn failing(mut self, query: Query) -> Self {
            self.failing.push(query);
            self
        }

        fn slow(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        async fn answer(&self, query: Query, records: &[Value]) -> Result<Vec<RawRecord>> {
            tokio::time::sleep(self.delay).await;
            if self.failing.contains(&query) {
                return Err(DashboardError::Api {
                    status: 503,
                    message: format!("{query} unavailable"),
                });
            }
            Ok(records.iter().cloned().map(RawRecord::new).collect())
        }
    }

    #[async_trait]
    impl Fetcher for ScriptedFetcher {
        async fn fetch_running_builds(&self) -> Result<Vec<RawRecord>> {
            self.refreshes.fetch_add(1, Ordering::SeqCst);
            self.answer(Query::Running, &self.running).await
        }

        async fn fetch_queue(&self) -> Result<Vec<RawRecord>> {
            self.answer(Query::Queued, &self.queue).await
        }

        async fn fetch_latest_builds(&self, _limit: usize) -> Result<Vec<RawRecord>> {
            self.answer(Query::Latest, &self.latest).await
        }
    }

    fn refresh_count(cache: &RefreshCache<ScriptedFetcher>) -> usize {
        cache.inner.fetcher.refreshes.load(Ordering::SeqCst)
    }

    #[tokio::test]
    async fn test_healthy_refresh_publishes_full_snapshot() {
        let cache = RefreshCache::new(ScriptedFetcher::healthy(), 20);
        let snapshot = cache.refresh_now().await;

        assert_eq!(snapshot.running_builds.len(), 1);
        assert_eq!(snapshot.running_builds[0].progress_percent, 50);
        assert_eq!(snapshot.queued_builds.len(), 1);
        assert_eq!(snapshot.latest_builds.len(), 1);
        assert_eq!(snapshot.error, None);
        assert_eq!(cache.current(), snapshot);
    }

    #[tokio::test]
    async fn test_queue_failure_keeps_sibling_queries() {
        let fetcher = ScriptedFetcher::healthy().failing(Query::Queued);
        let cache = RefreshCache::new(fetcher, 20);

        let snapshot = cache.refresh_now().await;

        assert!(!snapshot.running_builds.is_empty());
        assert!(!snapshot.latest_builds.is_empty());
        assert!(snapshot.queued_builds.is_empty());
        let error = snapshot.error.as_deref().unwrap();
        assert!(error.starts_with("Error fetching queued builds:"));
        assert!(error.contains("queued builds unavailable"));
    }

    #[tokio::test]
    async fn test_all_failures_are_joined() {
        let fetcher = ScriptedFetcher::healthy()
            .failing(Query::Running)
            .failing(Query::Queued)
            .failing(Query::Latest);
        let snapshot = RefreshCache::new(fetcher, 20).refresh_now().await;

        let error = snapshot.error.as_deref().unwrap();
        let parts: Vec<&str> = error.split("; ").collect();
        assert_eq!(parts.len(), 3);
        assert!(parts[0].starts_with("Error fetching running builds"));
        assert!(parts[1].starts_with("Error fetching queued builds"));
        assert!(parts[2].starts_with("Error fetching latest builds"));
    }

    #[tokio::test]
    async fn test_build_snapshot_uses_given_time() {
        let now = Local::now();
        let snapshot = build_snapshot(&ScriptedFetcher::healthy(), 20, now).await;
        assert_eq!(snapshot.captured_at, now);
    }

    #[tokio::test]
    async fn test_concurrent_triggers_coalesce() {
        let fetcher = ScriptedFetcher::healthy().slow(Duration::from_millis(100));
        let cache = RefreshCache::new(fetcher, 20);

        let (first, second) = tokio::join!(cache.refresh_now(), cache.refresh_now());

        assert_eq!(refresh_count(&cache), 1);
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn test_bounded_wait_returns_stale_snapshot_with_note() {
        let fetcher = ScriptedFetcher::healthy().slow(Duration::from_millis(300));
        let cache = RefreshCache::new(fetcher, 20);

        let outcome = cache.refresh_with_timeout(Duration::from_millis(20)).await;

        assert!(!outcome.completed);
        assert!(outcome.snapshot.running_builds.is_empty());
        assert_eq!(outcome.snapshot.error.as_deref(), Some(INCOMPLETE_NOTE));
        // the published snapshot itself carries no note
        assert_eq!(cache.current().error, None);

        // the refresh keeps running and lands on its own
        let mut updates = cache.subscribe();
        tokio::time::timeout(Duration::from_secs(2), updates.changed())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(cache.current().running_builds.len(), 1);
    }

    #[tokio::test]
    async fn test_bounded_wait_completes_in_time() {
        let cache = RefreshCache::new(ScriptedFetcher::healthy(), 20);
        let outcome = cache.refresh_with_timeout(Duration::from_secs(2)).await;

        assert!(outcome.completed);
        assert_eq!(outcome.snapshot.running_builds.len(), 1);
        assert_eq!(outcome.snapshot.error, None);
    }

    #[tokio::test]
    async fn test_readers_never_see_partial_snapshot() {
        let fetcher = ScriptedFetcher::healthy().slow(Duration::from_millis(50));
        let cache = RefreshCache::new(fetcher, 20);

        let writer = {
            let cache = cache.clone();
            tokio::spawn(async move {
                for _ in 0..3 {
                    cache.refresh_now().await;
                }
            })
        };

        while !writer.is_finished() {
            let snapshot = cache.current();
            let empty = snapshot.running_builds.is_empty();
            assert_eq!(empty, snapshot.queued_builds.is_empty());
            assert_eq!(empty, snapshot.latest_builds.is_empty());
            tokio::task::yield_now().await;
        }
        writer.await.unwrap();
        assert_eq!(refresh_count(&cache), 3);
    }

    #[tokio::test]
    async fn test_periodic_loop_refreshes_until_shutdown() {
        let cache = RefreshCache::new(ScriptedFetcher::healthy(), 20);
        cache.start(Duration::from_millis(10));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(cache.shutdown(Duration::from_secs(1)).await);

        let stopped_at = refresh_count(&cache);
        assert!(stopped_at >= 2);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(refresh_count(&cache), stopped_at);
    }

    #[tokio::test]
    async fn test_shutdown_waits_for_in_flight_refresh() {
        let fetcher = ScriptedFetcher::healthy().slow(Duration::from_millis(100));
        let cache = RefreshCache::new(fetcher, 20);
        cache.start(Duration::from_secs(60));
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(cache.shutdown(Duration::from_secs(2)).await);
        assert_eq!(cache.current().running_builds.len(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_grace_is_bounded() {
        let fetcher = ScriptedFetcher::healthy().slow(Duration::from_millis(500));
        let cache = RefreshCache::new(fetcher, 20);
        cache.start(Duration::from_secs(60));
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(!cache.shutdown(Duration::from_millis(20)).await);
    }

    #[test]
    fn test_query_failure_display() {
        let failure = QueryFailure {
            query: Query::Latest,
            message: "timeout".to_string(),
        };
        assert_eq!(failure.to_string(), "Error fetching latest builds: timeout");
    }
}
