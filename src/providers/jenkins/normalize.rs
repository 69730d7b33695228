//! Mapping of raw Jenkins records onto the dashboard's canonical records.
//!
//! Every function here is pure and total: missing or wrong-typed fields
//! degrade to documented defaults, and "now" is always passed in.

use chrono::{DateTime, Local};
use log::debug;

use super::branch::{annotate_label, extract_branch};
use super::links::job_name_from_url;
use super::raw::{RawRecord, RawView};
use crate::dashboard::{BuildNumber, CanonicalBuild, CanonicalQueueItem, Remaining, TIMESTAMP_FORMAT};

pub const UNKNOWN_JOB: &str = "Unknown";
pub const UNKNOWN_BUILD_ID: &str = "unknown";
pub const UNKNOWN_QUEUE_ID: &str = "N/A";
pub const UNKNOWN_REASON: &str = "Unknown reason";
pub const UNKNOWN_RESULT: &str = "UNKNOWN";

const MILLIS_PER_MINUTE: i64 = 60_000;
const MILLIS_PER_SECOND: i64 = 1_000;

/// Which upstream collection a build record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildKind {
    /// Currently executing on some executor
    Running,
    /// The most recent build of a job, usually finished
    Completed,
}

/// Normalizes one build record.
///
/// # Arguments
///
/// * `record` - Raw build record from an executor listing or a job's build history
/// * `kind` - Where the record came from; decides which derived fields are filled
/// * `now_millis` - Current epoch time in milliseconds, used for progress estimation
pub fn normalize_build(record: &RawRecord, kind: BuildKind, now_millis: i64) -> CanonicalBuild {
    let build = record.view();

    let job_name = resolve_job_name(build, kind);
    let build_number = build.int("number").map_or(BuildNumber::Missing, BuildNumber::Number);
    let branch = extract_branch(build);
    let label = resolve_build_label(build, &job_name, build_number);
    let build_label = annotate_label(&label, branch.as_deref());

    let estimated_millis = build.int("estimatedDuration");
    let timestamp_millis = build.int("timestamp");

    let (progress_percent, remaining) = match kind {
        BuildKind::Running => estimate_progress(estimated_millis, timestamp_millis, now_millis),
        BuildKind::Completed => (0, Remaining::Unknown),
    };

    let (duration, result, started_at) = match kind {
        BuildKind::Running => (None, None, None),
        BuildKind::Completed => (
            Some(format_minutes(build.int("duration").unwrap_or(0))),
            Some(build.text("result").unwrap_or(UNKNOWN_RESULT).to_string()),
            Some(format_local_time(timestamp_millis.unwrap_or(0))),
        ),
    };

    debug!("Normalized build: job={job_name} label={build_label}");

    CanonicalBuild {
        id: build.id("id").unwrap_or_else(|| UNKNOWN_BUILD_ID.to_string()),
        job_name,
        build_number,
        build_label,
        branch,
        progress_percent,
        remaining,
        estimated_duration: format_minutes(estimated_millis.unwrap_or(0)),
        duration,
        result,
        started_at,
        url: build.str("url").unwrap_or_default().to_string(),
        timestamp_millis: timestamp_millis.unwrap_or(0),
    }
}

/// Normalizes one entry of the build queue.
pub fn normalize_queue_item(record: &RawRecord, now_millis: i64) -> CanonicalQueueItem {
    let item = record.view();

    let job_name = item
        .child("task")
        .and_then(|task| task.text("name"))
        .unwrap_or(UNKNOWN_JOB)
        .to_string();

    let queued_since = item.int("inQueueSince");
    let waiting_millis = queued_since.map_or(0, |since| now_millis.saturating_sub(since).max(0));
    let waiting_time = queued_since.map_or_else(
        || "Unknown".to_string(),
        |_| format_waiting(waiting_millis),
    );

    CanonicalQueueItem {
        id: item.id("id").unwrap_or_else(|| UNKNOWN_QUEUE_ID.to_string()),
        job_name,
        reason: item.text("why").unwrap_or(UNKNOWN_REASON).to_string(),
        queued_since_millis: queued_since.unwrap_or(0),
        waiting_millis,
        waiting_time,
    }
}

/// Resolves the job name; the first usable source wins.
fn resolve_job_name(build: RawView<'_>, kind: BuildKind) -> String {
    let nested_job = build.child("job");

    build
        .text("jobName")
        .or_else(|| build.text("jobFullName"))
        .or_else(|| build.text("jobDisplayName"))
        .or_else(|| nested_job.and_then(|job| job.text("name")))
        .or_else(|| nested_job.and_then(|job| job.text("fullName")))
        .map(ToString::to_string)
        .or_else(|| match kind {
            BuildKind::Completed => job_name_from_full_display_name(build),
            BuildKind::Running => None,
        })
        .or_else(|| build.str("url").and_then(job_name_from_url))
        .unwrap_or_else(|| UNKNOWN_JOB.to_string())
}

/// `"<job> #<number>"` yields `<job>`.
fn job_name_from_full_display_name(build: RawView<'_>) -> Option<String> {
    let (job, _) = build.text("fullDisplayName")?.split_once(" #")?;
    (!job.trim().is_empty()).then(|| job.to_string())
}

/// Derives the build label, always starting with `#`.
///
/// Prefers the part of the full display name after the job name, then the
/// plain display name, then the bare build number. A label that does not
/// start with `#` is prefixed with `#<number> - `.
fn resolve_build_label(build: RawView<'_>, job_name: &str, number: BuildNumber) -> String {
    let fallback = format!("#{number}");

    let label = if let Some(full) = build.text("fullDisplayName") {
        full.strip_prefix(job_name)
            .map_or(full, str::trim)
            .to_string()
    } else if let Some(display) = build.text("displayName") {
        display.to_string()
    } else {
        fallback.clone()
    };

    if label.trim().is_empty() {
        fallback
    } else if label.starts_with('#') {
        label
    } else {
        format!("{fallback} - {label}")
    }
}

/// Estimates progress and time left of a running build.
///
/// Needs a positive estimated duration and a start timestamp; without
/// either the build reports 0% and `Unknown`.
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn estimate_progress(
    estimated_millis: Option<i64>,
    timestamp_millis: Option<i64>,
    now_millis: i64,
) -> (u8, Remaining) {
    let (Some(estimated), Some(started)) = (estimated_millis, timestamp_millis) else {
        return (0, Remaining::Unknown);
    };
    if estimated <= 0 {
        return (0, Remaining::Unknown);
    }

    // Upstream values are unbounded; saturate instead of overflowing
    let elapsed = now_millis.saturating_sub(started);
    let percent = (elapsed as f64 * 100.0 / estimated as f64)
        .round()
        .clamp(0.0, 100.0) as u8;

    let left = estimated.saturating_sub(elapsed);
    let remaining = if left <= 0 {
        Remaining::Overdue
    } else {
        Remaining::Left {
            minutes: left / MILLIS_PER_MINUTE,
            seconds: (left % MILLIS_PER_MINUTE) / MILLIS_PER_SECOND,
        }
    };

    (percent, remaining)
}

/// Milliseconds as fractional minutes, e.g. `90000` becomes `"1.5m"`.
#[allow(clippy::cast_precision_loss)]
pub fn format_minutes(millis: i64) -> String {
    format!("{:.1}m", millis as f64 / MILLIS_PER_MINUTE as f64)
}

fn format_waiting(waiting_millis: i64) -> String {
    let minutes = waiting_millis / MILLIS_PER_MINUTE;
    let seconds = (waiting_millis % MILLIS_PER_MINUTE) / MILLIS_PER_SECOND;
    if minutes > 0 {
        format!("{minutes}m {seconds}s")
    } else {
        format!("{seconds}s")
    }
}

/// Epoch milliseconds rendered in local time; out-of-range values fall back to the epoch.
pub fn format_local_time(millis: i64) -> String {
    DateTime::from_timestamp_millis(millis)
        .or_else(|| DateTime::from_timestamp_millis(0))
        .map(|utc| utc.with_timezone(&Local).format(TIMESTAMP_FORMAT).to_string())
        .unwrap_or_default()
}
