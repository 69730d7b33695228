use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, Color as TableColor, ContentArrangement, Table};

use crate::dashboard::{CanonicalBuild, CanonicalQueueItem, Remaining};

/// Table and cell creation helpers
pub fn create_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

pub fn color_coded_result_cell(result: &str) -> Cell {
    let cell = Cell::new(result);
    match result {
        "SUCCESS" => cell.fg(TableColor::Green),
        "FAILURE" => cell.fg(TableColor::Red),
        "UNSTABLE" => cell.fg(TableColor::Yellow),
        "ABORTED" | "NOT_BUILT" => cell.fg(TableColor::DarkGrey),
        _ => cell,
    }
}

pub fn color_coded_progress_cell(percent: u8) -> Cell {
    let text = format!("{percent}%");
    if percent >= 90 {
        Cell::new(text).fg(TableColor::Green)
    } else if percent >= 50 {
        Cell::new(text).fg(TableColor::Yellow)
    } else {
        Cell::new(text)
    }
}

pub fn remaining_cell(remaining: Remaining) -> Cell {
    match remaining {
        Remaining::Overdue => Cell::new(remaining).fg(TableColor::Red),
        _ => Cell::new(remaining),
    }
}

pub fn running_builds_table(builds: &[CanonicalBuild]) -> Table {
    let mut table = create_table();
    table.set_header(vec!["JOB NAME", "BUILD", "EST. DURATION", "PROGRESS", "REMAINING"]);

    for build in builds {
        table.add_row(vec![
            Cell::new(&build.job_name).fg(TableColor::Green),
            Cell::new(&build.build_label),
            Cell::new(&build.estimated_duration),
            color_coded_progress_cell(build.progress_percent),
            remaining_cell(build.remaining),
        ]);
    }

    table
}

pub fn queue_table(items: &[CanonicalQueueItem]) -> Table {
    let mut table = create_table();
    table.set_header(vec!["JOB NAME", "WAITING", "REASON"]);

    for item in items {
        table.add_row(vec![
            Cell::new(&item.job_name).fg(TableColor::Yellow),
            Cell::new(&item.waiting_time),
            Cell::new(&item.reason),
        ]);
    }

    table
}

pub fn latest_builds_table(builds: &[CanonicalBuild]) -> Table {
    let mut table = create_table();
    table.set_header(vec!["JOB NAME", "BUILD", "RESULT", "DURATION", "STARTED"]);

    for build in builds {
        table.add_row(vec![
            Cell::new(&build.job_name),
            Cell::new(&build.build_label),
            color_coded_result_cell(build.result.as_deref().unwrap_or("UNKNOWN")),
            Cell::new(build.duration.as_deref().unwrap_or("-")),
            Cell::new(build.started_at.as_deref().unwrap_or("-")),
        ]);
    }

    table
}
