mod branch;
mod client;
mod collate;
mod fetcher;
mod links;
mod normalize;
mod raw;

pub use client::{ConnectionSettings, JenkinsClient};
pub use collate::{dedupe_running, latest_per_job, sort_queue};
pub use fetcher::{Fetcher, ServerInfo};
pub use normalize::{normalize_build, normalize_queue_item, BuildKind};
pub use raw::RawRecord;
