//! Command implementations.
//!
//! Each subcommand is implemented in its own module for clean separation.

pub(crate) mod flash;
pub(crate) mod info;
pub(crate) mod read;

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

use crate::use_fancy_output;

const PROGRESS_TEMPLATE: &str =
    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}";

/// Byte progress bar on stderr, hidden in quiet mode or without a terminal.
pub(crate) fn progress_bar(quiet: bool, total: usize) -> ProgressBar {
    if quiet || !use_fancy_output() {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new(total as u64);
    let style = ProgressStyle::default_bar()
        .template(PROGRESS_TEMPLATE)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");
    pb.set_style(style);
    pb.set_draw_target(ProgressDrawTarget::stderr());
    pb
}
