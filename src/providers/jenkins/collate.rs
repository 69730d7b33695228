use std::cmp::Reverse;
use std::collections::{HashMap, HashSet};

use super::raw::RawRecord;
use crate::dashboard::{CanonicalBuild, CanonicalQueueItem};

/// Executor collections of a Jenkins node that can hold a running build.
const EXECUTOR_KINDS: [&str; 2] = ["executors", "oneOffExecutors"];

/// Walks the `/computer` topology and returns every build currently executing.
///
/// Each node lists regular and one-off executors; an executor's
/// `currentExecutable` is the build it runs. The same build may be listed
/// more than once, see [`dedupe_running`].
pub fn collect_executables(computers: &RawRecord) -> Vec<RawRecord> {
    computers
        .view()
        .list("computer")
        .flat_map(|node| EXECUTOR_KINDS.into_iter().flat_map(move |kind| node.list(kind)))
        .filter_map(|executor| executor.child("currentExecutable"))
        .map(|build| build.to_record())
        .collect()
}

/// Keeps the first occurrence of every build URL and orders by progress, highest first.
///
/// Builds without a URL cannot be matched against each other and are always kept.
pub fn dedupe_running(builds: Vec<CanonicalBuild>) -> Vec<CanonicalBuild> {
    let mut seen = HashSet::new();
    let mut unique: Vec<CanonicalBuild> = builds
        .into_iter()
        .filter(|build| build.url.is_empty() || seen.insert(build.url.clone()))
        .collect();

    unique.sort_by_key(|build| Reverse(build.progress_percent));
    unique
}

/// Orders queue items by time spent waiting, longest first.
pub fn sort_queue(mut items: Vec<CanonicalQueueItem>) -> Vec<CanonicalQueueItem> {
    items.sort_by_key(|item| Reverse(item.waiting_millis));
    items
}

/// Reduces completed builds to the newest one per job, newest first, capped at `limit`.
pub fn latest_per_job(builds: Vec<CanonicalBuild>, limit: usize) -> Vec<CanonicalBuild> {
    let mut newest: HashMap<String, CanonicalBuild> = HashMap::new();
    for build in builds {
        let is_newer = newest
            .get(&build.job_name)
            .map_or(true, |kept| build.timestamp_millis > kept.timestamp_millis);
        if is_newer {
            newest.insert(build.job_name.clone(), build);
        }
    }

    let mut latest: Vec<CanonicalBuild> = newest.into_values().collect();
    latest.sort_by(|a, b| {
        b.timestamp_millis
            .cmp(&a.timestamp_millis)
            .then_with(|| a.job_name.cmp(&b.job_name))
    });
    latest.truncate(limit);
    latest
}
