use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::Duration;

/// Spinner with a `done/total` counter, drawn on stderr.
///
/// Nothing is drawn when stderr is not a terminal. Clears itself on drop.
pub struct Spinner {
    progress_bar: ProgressBar,
}

impl Spinner {
    #[allow(clippy::unwrap_used)]
    pub fn new(message: &str, total: usize) -> Self {
        let progress_bar =
            ProgressBar::with_draw_target(Some(total as u64), ProgressDrawTarget::stderr());
        // unwrap is safe: template string is a compile-time constant
        progress_bar.set_style(
            ProgressStyle::default_spinner()
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "✓"])
                .template("{spinner} {msg} {pos}/{len}")
                .unwrap(),
        );
        progress_bar.set_message(message.to_string());
        progress_bar.enable_steady_tick(Duration::from_millis(80));

        Self { progress_bar }
    }

    /// Marks `count` more items as done.
    pub fn advance(&self, count: usize) {
        self.progress_bar.inc(count as u64);
    }

    /// Hides the spinner while `f` writes to the terminal.
    pub fn suspend<R>(&self, f: impl FnOnce() -> R) -> R {
        self.progress_bar.suspend(f)
    }

    pub fn position(&self) -> u64 {
        self.progress_bar.position()
    }

    pub fn stop(&self) {
        self.progress_bar.finish_and_clear();
    }
}

impl Drop for Spinner {
    fn drop(&mut self) {
        self.progress_bar.finish_and_clear();
    }
}
