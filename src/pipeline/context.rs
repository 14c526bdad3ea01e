//! Run-scoped progress state passed through the pipeline

use std::time::{Duration, Instant};

use indicatif::ProgressBar;

use crate::error::Stage;
use crate::utils::progress::{create_progress_bar, create_spinner};
use crate::utils::styling::{print_count, print_info, print_step_header, print_success, print_warning};

/// Progress output and stage timings for one run
///
/// With `quiet` set nothing is printed and progress bars are hidden.
#[derive(Debug)]
pub struct RunContext {
    quiet: bool,
    started: Instant,
    current: Option<(Stage, Instant)>,
    timings: Vec<(Stage, Duration)>,
    warnings: Vec<String>,
}

impl RunContext {
    pub fn new(quiet: bool) -> Self {
        Self {
            quiet,
            started: Instant::now(),
            current: None,
            timings: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn quiet() -> Self {
        Self::new(true)
    }

    pub fn is_quiet(&self) -> bool {
        self.quiet
    }

    pub fn begin(&mut self, stage: Stage) {
        self.close_stage();
        if !self.quiet {
            print_step_header(stage.number(), stage.title());
        }
        self.current = Some((stage, Instant::now()));
    }

    /// Record the running stage's duration
    fn close_stage(&mut self) {
        if let Some((stage, start)) = self.current.take() {
            self.timings.push((stage, start.elapsed()));
        }
    }

    pub fn finish(&mut self) {
        self.close_stage();
    }

    pub fn success(&self, message: &str) {
        if !self.quiet {
            print_success(message);
        }
    }

    pub fn info(&self, message: &str) {
        if !self.quiet {
            print_info(message);
        }
    }

    pub fn count(&self, description: &str, count: usize, detail: Option<&str>) {
        if !self.quiet {
            print_count(description, count, detail);
        }
    }

    /// Print and keep a warning for the run summary
    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        if !self.quiet {
            print_warning(&message);
        }
        self.warnings.push(message);
    }

    pub fn spinner(&self, message: &str) -> ProgressBar {
        if self.quiet {
            ProgressBar::hidden()
        } else {
            create_spinner(message)
        }
    }

    pub fn progress_bar(&self, len: u64, message: &str) -> ProgressBar {
        if self.quiet {
            ProgressBar::hidden()
        } else {
            create_progress_bar(len, message)
        }
    }

    pub fn timings(&self) -> &[(Stage, Duration)] {
        &self.timings
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_timings_recorded_in_order() {
        let mut ctx = RunContext::quiet();
        ctx.begin(Stage::Prepare);
        ctx.begin(Stage::Binning);
        ctx.finish();
        let stages: Vec<Stage> = ctx.timings().iter().map(|(s, _)| *s).collect();
        assert_eq!(stages, vec![Stage::Prepare, Stage::Binning]);
    }

    #[test]
    fn test_warnings_kept_when_quiet() {
        let mut ctx = RunContext::quiet();
        ctx.warn("dropped 3 rows");
        assert_eq!(ctx.warnings(), &["dropped 3 rows".to_string()]);
    }
}
