//! HTTP surface of the dashboard: an embedded page and a small JSON API.

use std::time::Duration;

use axum::extract::State;
use axum::http::header::{CACHE_CONTROL, EXPIRES, PRAGMA};
use axum::http::{HeaderName, StatusCode};
use axum::response::{Html, IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use log::{error, info};
use serde::Serialize;
use serde_json::{json, Value};

use crate::cache::RefreshCache;
use crate::error::Result;
use crate::providers::jenkins::Fetcher;

const INDEX_HTML: &str = include_str!("../assets/index.html");

const NO_CACHE: [(HeaderName, &str); 3] = [
    (CACHE_CONTROL, "no-cache, no-store, must-revalidate"),
    (PRAGMA, "no-cache"),
    (EXPIRES, "0"),
];

/// Shared state of every handler.
pub struct AppState<F> {
    pub cache: RefreshCache<F>,
    /// Longest time a request waits for the refresh it triggered
    pub on_demand_timeout: Duration,
}

impl<F> Clone for AppState<F> {
    fn clone(&self) -> Self {
        Self {
            cache: self.cache.clone(),
            on_demand_timeout: self.on_demand_timeout,
        }
    }
}

/// Body of `POST /api/refresh`.
#[derive(Debug, Serialize)]
pub struct RefreshStatus {
    pub status: &'static str,
    pub message: String,
}

pub fn router<F: Fetcher + 'static>(state: AppState<F>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/api/dashboard", get(dashboard::<F>))
        .route("/api/refresh", post(refresh::<F>))
        .route("/health", get(health::<F>))
        .with_state(state)
}

/// Serves the dashboard until Ctrl-C.
///
/// # Errors
///
/// Returns `DashboardError::Io` if the address cannot be bound or the server fails.
pub async fn serve<F: Fetcher + 'static>(state: AppState<F>, bind: &str) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!("Web dashboard listening on http://{}", listener.local_addr()?);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Web dashboard stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl-C: {e}");
    }
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

/// Refreshes with a bounded wait and returns the snapshot, never cached by the browser.
async fn dashboard<F: Fetcher + 'static>(State(state): State<AppState<F>>) -> Response {
    let outcome = state
        .cache
        .refresh_with_timeout(state.on_demand_timeout)
        .await;
    (NO_CACHE, Json(outcome.snapshot.as_ref())).into_response()
}

async fn refresh<F: Fetcher + 'static>(
    State(state): State<AppState<F>>,
) -> (StatusCode, Json<RefreshStatus>) {
    let outcome = state
        .cache
        .refresh_with_timeout(state.on_demand_timeout)
        .await;

    if outcome.completed {
        let message = match &outcome.snapshot.error {
            Some(error) => format!("Data refreshed with errors: {error}"),
            None => "Data refreshed".to_string(),
        };
        (
            StatusCode::OK,
            Json(RefreshStatus {
                status: "success",
                message,
            }),
        )
    } else {
        error!("Forced refresh did not finish in time");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(RefreshStatus {
                status: "error",
                message: format!(
                    "Refresh did not finish within {}s and continues in the background",
                    state.on_demand_timeout.as_secs()
                ),
            }),
        )
    }
}

async fn health<F: Fetcher + 'static>(State(state): State<AppState<F>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "timestamp": state.cache.current().timestamp(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{DashboardError, Result};
    use crate::providers::jenkins::RawRecord;
    use async_trait::async_trait;
    use axum::body::to_bytes;

    struct StaticFetcher {
        delay: Duration,
        queue_down: bool,
    }

    #[async_trait]
    impl Fetcher for StaticFetcher {
        async fn fetch_running_builds(&self) -> Result<Vec<RawRecord>> {
            tokio::time::sleep(self.delay).await;
            Ok(vec![RawRecord::new(json!({"url": "https://ci/job/a/1/", "jobName": "a"}))])
        }

        async fn fetch_queue(&self) -> Result<Vec<RawRecord>> {
            if self.queue_down {
                return Err(DashboardError::Api {
                    status: 502,
                    message: "bad gateway".to_string(),
                });
            }
            Ok(Vec::new())
        }

        async fn fetch_latest_builds(&self, _limit: usize) -> Result<Vec<RawRecord>> {
            Ok(Vec::new())
        }
    }

    fn state(delay: Duration, queue_down: bool) -> AppState<StaticFetcher> {
        AppState {
            cache: RefreshCache::new(StaticFetcher { delay, queue_down }, 20),
            on_demand_timeout: Duration::from_millis(200),
        }
    }

    async fn body_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_dashboard_returns_snapshot_without_caching() {
        let response = dashboard(State(state(Duration::ZERO, false)))
            .await
            .into_response();

        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert_eq!(headers[CACHE_CONTROL], "no-cache, no-store, must-revalidate");
        assert_eq!(headers[PRAGMA], "no-cache");
        assert_eq!(headers[EXPIRES], "0");

        let body = body_json(response).await;
        assert_eq!(body["runningBuilds"][0]["jobName"], "a");
        assert_eq!(body["queuedBuilds"], json!([]));
        assert_eq!(body["latestBuilds"], json!([]));
        assert!(body["timestamp"].is_string());
        assert!(body["error"].is_null());
    }

    #[tokio::test]
    async fn test_dashboard_reports_partial_failure() {
        let response = dashboard(State(state(Duration::ZERO, true)))
            .await
            .into_response();

        let body = body_json(response).await;
        assert_eq!(body["runningBuilds"].as_array().map(Vec::len), Some(1));
        assert!(body["error"]
            .as_str()
            .unwrap()
            .contains("Error fetching queued builds"));
    }

    #[tokio::test]
    async fn test_dashboard_serves_stale_snapshot_on_slow_refresh() {
        let response = dashboard(State(state(Duration::from_secs(2), false)))
            .await
            .into_response();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["runningBuilds"], json!([]));
        assert_eq!(
            body["error"],
            "Some data may be incomplete (refresh still in progress)"
        );
    }

    #[tokio::test]
    async fn test_refresh_success() {
        let (status, Json(body)) = refresh(State(state(Duration::ZERO, false))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.status, "success");
        assert_eq!(body.message, "Data refreshed");
    }

    #[tokio::test]
    async fn test_refresh_times_out() {
        let (status, Json(body)) = refresh(State(state(Duration::from_secs(2), false))).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.status, "error");
    }

    #[tokio::test]
    async fn test_health() {
        let Json(body) = health(State(state(Duration::ZERO, false))).await;
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_index_is_html() {
        let Html(page) = index().await;
        assert!(page.contains("/api/dashboard"));
    }
}
