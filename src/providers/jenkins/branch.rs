use std::sync::LazyLock;

use log::debug;
use regex::Regex;

use super::raw::RawView;

const BRANCH_PARAMETER_NAMES: [&str; 2] = ["branch", "git_branch"];

static BRANCH_IN_DISPLAY_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)branch[:\s]+([^\s\]]+)").expect("branch pattern is a valid regex")
});

/// Best-effort branch lookup for a build record.
///
/// Sources are tried in a fixed order and the first hit wins:
/// 1. a build parameter named `branch` or `git_branch` (any case)
/// 2. a cause description mentioning "branch"; the text after the word is taken
/// 3. a `branch: <name>` fragment inside the full display name
pub fn extract_branch(build: RawView<'_>) -> Option<String> {
    if let Some(branch) = from_parameters(build) {
        debug!("Found branch in parameters: {branch}");
        return Some(branch);
    }

    if let Some(branch) = from_causes(build) {
        debug!("Found branch in cause description: {branch}");
        return Some(branch);
    }

    let branch = build
        .str("fullDisplayName")
        .and_then(|name| BRANCH_IN_DISPLAY_NAME.captures(name))
        .map(|caps| caps[1].to_string())?;
    debug!("Found branch in full display name: {branch}");
    Some(branch)
}

fn from_parameters(build: RawView<'_>) -> Option<String> {
    build
        .list("actions")
        .flat_map(|action| action.list("parameters"))
        .find(|param| {
            param
                .str("name")
                .is_some_and(|name| BRANCH_PARAMETER_NAMES.contains(&name.to_lowercase().as_str()))
        })
        .and_then(|param| param.text("value"))
        .map(ToString::to_string)
}

fn from_causes(build: RawView<'_>) -> Option<String> {
    build
        .list("actions")
        .flat_map(|action| action.list("causes"))
        .filter_map(|cause| cause.text("shortDescription"))
        .find_map(branch_from_description)
}

/// Text between the first lowercase "branch" in a description and the next one, if any.
///
/// Descriptions mentioning only "Branch" or "BRANCH" yield nothing.
fn branch_from_description(description: &str) -> Option<String> {
    let start = description.find("branch")? + "branch".len();
    let end = description[start..]
        .find("branch")
        .map_or(description.len(), |offset| start + offset);

    let candidate = description[start..end].trim().trim_matches(':').trim();
    (!candidate.is_empty()).then(|| candidate.to_string())
}

/// Appends `" - [<branch>]"` to a build label unless the branch is already shown.
///
/// Labels of devops builds (`" - devops"`) are only checked for the exact
/// `" - [<branch>]"` suffix form, all others for any bracketed occurrence.
pub fn annotate_label(label: &str, branch: Option<&str>) -> String {
    let Some(branch) = branch else {
        return label.to_string();
    };

    let already_shown = if label.contains(" - devops") {
        label.contains(&format!(" - [{branch}]"))
    } else {
        label.contains(&format!("[{branch}]"))
    };

    if already_shown {
        label.to_string()
    } else {
        format!("{label} - [{branch}]")
    }
}
