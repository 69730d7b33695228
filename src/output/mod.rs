mod progress;
mod styling;
mod tables;
pub mod terminal;

pub use progress::RefreshProgress;
pub use styling::{bright, bright_green, bright_red, dim, magenta_bold};

/// Prints the jenkins-dash banner to stderr.
pub fn print_banner() {
    eprintln!(
        r"
{} {}
  {}
",
        magenta_bold("🛠  jenkins-dash"),
        dim(env!("CARGO_PKG_VERSION")),
        dim("Jenkins Build Dashboard")
    );
}
