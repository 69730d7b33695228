use std::fmt;

use chrono::{DateTime, Local};
use serde::{Serialize, Serializer};

/// Timestamp pattern used for every human-facing date in the dashboard.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Upstream build number, or the `N/A` sentinel when the record carries none.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BuildNumber {
    Number(i64),
    #[default]
    Missing,
}

impl fmt::Display for BuildNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Missing => f.write_str("N/A"),
        }
    }
}

impl Serialize for BuildNumber {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Number(n) => serializer.serialize_i64(*n),
            Self::Missing => serializer.serialize_str("N/A"),
        }
    }
}

/// Estimated time left for a running build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Remaining {
    #[default]
    Unknown,
    Overdue,
    Left { minutes: i64, seconds: i64 },
}

impl fmt::Display for Remaining {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => f.write_str("Unknown"),
            Self::Overdue => f.write_str("Overdue"),
            Self::Left { minutes, seconds } => write!(f, "{minutes}m {seconds}s"),
        }
    }
}

impl Serialize for Remaining {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// A running or completed build, normalized for display.
///
/// `job_name` and `build_label` are never empty, whatever the upstream sent.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalBuild {
    pub id: String,
    pub job_name: String,
    pub build_number: BuildNumber,
    pub build_label: String,
    pub branch: Option<String>,
    /// 0-100, only meaningful for running builds
    pub progress_percent: u8,
    pub remaining: Remaining,
    /// Upstream estimate formatted as fractional minutes (e.g. `"4.5m"`)
    pub estimated_duration: String,
    /// Completed builds only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    /// Completed builds only; upstream result code or `UNKNOWN`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    /// Completed builds only; start time in local time
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    pub url: String,
    pub timestamp_millis: i64,
}

/// A build request waiting for a free executor.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalQueueItem {
    pub id: String,
    pub job_name: String,
    pub reason: String,
    pub queued_since_millis: i64,
    pub waiting_millis: i64,
    pub waiting_time: String,
}

/// One immutable view of everything the dashboard shows.
///
/// Built by a refresh cycle and published whole; never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub running_builds: Vec<CanonicalBuild>,
    pub queued_builds: Vec<CanonicalQueueItem>,
    pub latest_builds: Vec<CanonicalBuild>,
    #[serde(rename = "timestamp", serialize_with = "serialize_captured_at")]
    pub captured_at: DateTime<Local>,
    pub error: Option<String>,
}

impl Snapshot {
    /// The snapshot served before the first refresh completes.
    pub fn empty(captured_at: DateTime<Local>) -> Self {
        Self {
            running_builds: Vec::new(),
            queued_builds: Vec::new(),
            latest_builds: Vec::new(),
            captured_at,
            error: None,
        }
    }

    pub fn timestamp(&self) -> String {
        self.captured_at.format(TIMESTAMP_FORMAT).to_string()
    }

    /// Returns a copy whose error carries an extra note, joined with `"; "`.
    #[must_use]
    pub fn with_note(&self, note: &str) -> Self {
        let mut annotated = self.clone();
        annotated.error = Some(match &self.error {
            Some(existing) => format!("{existing}; {note}"),
            None => note.to_string(),
        });
        annotated
    }
}

fn serialize_captured_at<S: Serializer>(
    captured_at: &DateTime<Local>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_str(&captured_at.format(TIMESTAMP_FORMAT))
}
