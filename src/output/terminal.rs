//! Live terminal dashboard for the `watch` command.

use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

use console::{Key, Term};
use log::{debug, warn};
use tokio::sync::mpsc;
use tokio::time::Instant;

use super::styling::{bright_red, bright_yellow, cyan_bold, reversed};
use super::tables::{latest_builds_table, queue_table, running_builds_table};
use crate::cache::RefreshCache;
use crate::dashboard::Snapshot;
use crate::error::Result;
use crate::providers::jenkins::Fetcher;

const REDRAW_EVERY: Duration = Duration::from_secs(1);

/// Renders one frame of the dashboard.
pub fn render_frame(snapshot: &Snapshot, next_refresh_in: Duration) -> String {
    let mut frame = String::new();

    let header = format!(
        " JENKINS BUILD DASHBOARD | {} | Press 'q' to quit, 'r' to refresh ",
        snapshot.timestamp()
    );
    let _ = writeln!(frame, "{}", reversed(header));

    if let Some(error) = &snapshot.error {
        let _ = writeln!(frame, "{}", bright_red(format!("ERROR: {error}")));
    }

    let _ = writeln!(frame, "\n{}", cyan_bold("RUNNING BUILDS:"));
    if snapshot.running_builds.is_empty() {
        let _ = writeln!(frame, "{}", bright_yellow("No builds currently running"));
    } else {
        let _ = writeln!(frame, "{}", running_builds_table(&snapshot.running_builds));
    }

    let _ = writeln!(frame, "\n{}", cyan_bold("BUILD QUEUE:"));
    if snapshot.queued_builds.is_empty() {
        let _ = writeln!(frame, "{}", bright_yellow("No builds in queue"));
    } else {
        let _ = writeln!(frame, "{}", queue_table(&snapshot.queued_builds));
    }

    let _ = writeln!(frame, "\n{}", cyan_bold("LATEST BUILDS:"));
    if snapshot.latest_builds.is_empty() {
        let _ = writeln!(frame, "{}", bright_yellow("No completed builds"));
    } else {
        let _ = writeln!(frame, "{}", latest_builds_table(&snapshot.latest_builds));
    }

    let footer = format!(
        " Running: {} | Queued: {} | Next refresh: {}s ",
        snapshot.running_builds.len(),
        snapshot.queued_builds.len(),
        next_refresh_in.as_secs()
    );
    let _ = write!(frame, "\n{}", reversed(footer));

    frame
}

/// Runs the dashboard until the user presses `q`.
///
/// The cache refreshes on its own schedule; this loop only redraws from the
/// current snapshot, except for `r`, which asks for an immediate refresh. The
/// snapshot that refresh returns stays on screen until the cache publishes a newer one.
pub async fn run<F: Fetcher + 'static>(
    cache: &RefreshCache<F>,
    interval: Duration,
    on_demand_timeout: Duration,
) -> Result<()> {
    let term = Term::stdout();
    term.hide_cursor()?;

    let mut keys = spawn_key_reader(term.clone());
    let mut updates = cache.subscribe();
    let mut redraw = tokio::time::interval(REDRAW_EVERY);
    let mut last_refresh = Instant::now();
    let mut manual: Option<Arc<Snapshot>> = None;

    loop {
        tokio::select! {
            _ = redraw.tick() => {}
            changed = updates.changed() => {
                if changed.is_ok() {
                    last_refresh = Instant::now();
                    manual = None;
                }
            }
            key = keys.recv() => match key {
                Some(Key::Char('q' | 'Q')) | None => break,
                Some(Key::Char('r' | 'R')) => {
                    manual = Some(manual_refresh(cache, on_demand_timeout).await);
                }
                Some(_) => continue,
            },
        }

        let next_refresh_in = interval.saturating_sub(last_refresh.elapsed());
        let snapshot = manual.clone().unwrap_or_else(|| cache.current());
        let frame = render_frame(&snapshot, next_refresh_in);
        term.clear_screen()?;
        term.write_str(&frame)?;
    }

    term.clear_screen()?;
    term.show_cursor()?;
    Ok(())
}

/// Refreshes on `r` and returns the snapshot to draw next, which carries the
/// incomplete-data note when the wait ran out.
async fn manual_refresh<F: Fetcher + 'static>(
    cache: &RefreshCache<F>,
    on_demand_timeout: Duration,
) -> Arc<Snapshot> {
    debug!("Manual refresh requested");
    let outcome = cache.refresh_with_timeout(on_demand_timeout).await;
    if !outcome.completed {
        debug!(
            "Manual refresh still running after {}s, showing previous data",
            on_demand_timeout.as_secs_f64()
        );
    }
    outcome.snapshot
}

/// Reads keys on a dedicated thread; the channel closes when reading fails or `q` is read.
fn spawn_key_reader(term: Term) -> mpsc::UnboundedReceiver<Key> {
    let (tx, rx) = mpsc::unbounded_channel();

    std::thread::spawn(move || loop {
        match term.read_key() {
            Ok(key) => {
                let quit = matches!(key, Key::Char('q' | 'Q'));
                if tx.send(key).is_err() || quit {
                    break;
                }
            }
            Err(e) => {
                warn!("Stopped reading keyboard input: {e}");
                break;
            }
        }
    });

    rx
}
