use async_trait::async_trait;
use log::{debug, info, warn};

use super::client::JenkinsClient;
use super::collate::collect_executables;
use super::links::build_api_path;
use super::raw::RawRecord;
use crate::error::Result;

/// Fields requested for each running build on an executor.
const EXECUTABLE_FIELDS: &str = "currentExecutable[id,url,fullDisplayName,displayName,\
description,timestamp,estimatedDuration,number,building,result,job[name,fullName,displayName],\
actions[parameters[name,value],causes[shortDescription]]]";

/// Source of raw build records, one call per dashboard section.
///
/// Implementations return records exactly as the upstream shaped them; all
/// interpretation happens in the normalizer.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Builds currently occupying an executor. The same build may appear more than once.
    async fn fetch_running_builds(&self) -> Result<Vec<RawRecord>>;

    /// Items waiting in the build queue.
    async fn fetch_queue(&self) -> Result<Vec<RawRecord>>;

    /// The most recent build of each job, newest first, at most `limit`.
    async fn fetch_latest_builds(&self, limit: usize) -> Result<Vec<RawRecord>>;
}

/// Summary of the server returned by `/api/json`.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerInfo {
    pub node_name: String,
    pub mode: String,
    pub jobs: Vec<String>,
}

impl JenkinsClient {
    /// Fetches the server summary, used to verify connectivity and credentials.
    ///
    /// # Errors
    ///
    /// Propagates any transport error from [`JenkinsClient::get_json`].
    pub async fn server_info(&self) -> Result<ServerInfo> {
        let info = self.get_json("api/json", &[]).await?;
        let view = info.view();

        Ok(ServerInfo {
            node_name: view.text("nodeName").unwrap_or("N/A").to_string(),
            mode: view.text("mode").unwrap_or("N/A").to_string(),
            jobs: view
                .list("jobs")
                .filter_map(|job| job.text("name"))
                .map(ToString::to_string)
                .collect(),
        })
    }

    /// Fetches one build of a job and tags it with the job name.
    async fn fetch_build(&self, job_name: &str, number: i64) -> Result<RawRecord> {
        let mut build = self
            .get_json(&build_api_path(job_name, number), &[])
            .await?;
        build.insert("jobName", job_name);
        Ok(build)
    }
}

#[async_trait]
impl Fetcher for JenkinsClient {
    async fn fetch_running_builds(&self) -> Result<Vec<RawRecord>> {
        let tree = format!(
            "computer[executors[{EXECUTABLE_FIELDS}],oneOffExecutors[{EXECUTABLE_FIELDS}]]"
        );
        let computers = self
            .get_json("computer/api/json", &[("depth", "2"), ("tree", tree.as_str())])
            .await?;

        let builds = collect_executables(&computers);
        debug!("Found {} executables across executors", builds.len());
        Ok(builds)
    }

    async fn fetch_queue(&self) -> Result<Vec<RawRecord>> {
        let queue = self.get_json("queue/api/json", &[]).await?;
        Ok(queue
            .view()
            .list("items")
            .map(|item| item.to_record())
            .collect())
    }

    async fn fetch_latest_builds(&self, limit: usize) -> Result<Vec<RawRecord>> {
        let overview = self
            .get_json("api/json", &[("tree", "jobs[name,lastBuild[number]]")])
            .await?;

        let last_builds: Vec<(String, i64)> = overview
            .view()
            .list("jobs")
            .filter_map(|job| {
                let name = job.text("name")?;
                let number = job.child("lastBuild")?.int("number")?;
                Some((name.to_string(), number))
            })
            .collect();

        info!("Fetching last builds of {} jobs...", last_builds.len());

        let futures = last_builds
            .iter()
            .map(|(name, number)| self.fetch_build(name, *number));
        let results = futures::future::join_all(futures).await;

        // One unreachable job must not hide every other job's build
        let mut builds: Vec<RawRecord> = results
            .into_iter()
            .zip(&last_builds)
            .filter_map(|(result, (name, number))| {
                result
                    .inspect_err(|e| warn!("Error getting build {name} #{number}: {e}"))
                    .ok()
            })
            .collect();

        builds.sort_by_key(|b| std::cmp::Reverse(b.view().int("timestamp").unwrap_or(0)));
        builds.truncate(limit);
        Ok(builds)
    }
}
