use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

use super::styling::{bright_green, bright_yellow};
use crate::dashboard::Snapshot;

/// Spinner shown while a one-off refresh runs
pub struct RefreshProgress {
    pb: ProgressBar,
}

impl RefreshProgress {
    pub fn start(target: &str) -> Self {
        let pb = create_spinner(bright_yellow(format!("Fetching builds from {target}")).to_string());
        Self { pb }
    }

    pub fn finish(self, snapshot: &Snapshot) {
        let counts = format!(
            "{} running, {} queued, {} latest",
            snapshot.running_builds.len(),
            snapshot.queued_builds.len(),
            snapshot.latest_builds.len()
        );
        let message = if snapshot.error.is_some() {
            bright_yellow(format!("Fetched {counts} (with errors) !")).to_string()
        } else {
            bright_green(format!("Fetched {counts} ✓")).to_string()
        };
        self.pb.finish_with_message(message);
    }
}

fn create_spinner(message: String) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_draw_target(ProgressDrawTarget::stderr());
    if let Ok(style) = ProgressStyle::default_spinner().template("  {msg} {spinner}") {
        pb.set_style(style);
    }
    pb.set_message(message);
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}
