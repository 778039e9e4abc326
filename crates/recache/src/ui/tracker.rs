use indicatif::{ProgressBar, ProgressStyle};
use once_cell::sync::Lazy;
use recache_fetch::DownloadProgress;

pub trait TrackerBuilder<T: Tracker<U>, U> {
    fn build(self) -> T;
}

pub trait Tracker<Step> {
    fn step(&self, step: Step) -> &Self;
    fn finish(self);
    fn abandon(self);
}

const BAR_STYLE: &str =
    "{spinner:.blue} {prefix:>12.cyan.bold} [{elapsed_precise}] {wide_bar:.cyan/blue} {bytes}/{total_bytes} ({bytes_per_sec}, {eta})";

const SPINNER_STYLE: &str = "{spinner:.blue} {prefix:>12.cyan.bold} [{elapsed_precise}] {bytes} ({bytes_per_sec})";

const TICK: &str = "⠁⠂⠄⡀⢀⠠⠐⠈ ";

const BAR_CHARS: &str = "█▓▒░  ";

static BAR_TEMPLATE: Lazy<Option<ProgressStyle>> = Lazy::new(|| {
    ProgressStyle::with_template(BAR_STYLE)
        .ok()
        .map(|style| style.tick_chars(TICK).progress_chars(BAR_CHARS))
});

static SPINNER_TEMPLATE: Lazy<Option<ProgressStyle>> =
    Lazy::new(|| ProgressStyle::with_template(SPINNER_STYLE).ok().map(|style| style.tick_chars(TICK)));

/// Renders [`DownloadProgress`] events on stderr.
pub struct ProgressTracker {
    pb:     ProgressBar,
    finish: Option<String>,
}

impl Tracker<DownloadProgress> for ProgressTracker {
    /// Events carry absolute positions, so a resumed download starts mid-bar.
    fn step(&self, progress: DownloadProgress) -> &Self {
        if let Some(total) = progress.total {
            if self.pb.length() != Some(total) {
                self.pb.set_length(total);
                if let Some(style) = BAR_TEMPLATE.as_ref() {
                    self.pb.set_style(style.clone());
                }
            }
        }
        self.pb.set_position(progress.downloaded);
        self
    }

    fn finish(self) {
        match self.finish {
            Some(msg) => self.pb.finish_with_message(msg),
            None => self.pb.finish(),
        }
    }

    fn abandon(self) { self.pb.abandon(); }
}

#[derive(Debug, Clone, Default)]
pub struct ProgressTrackerBuilder {
    len:    Option<u64>,
    prefix: Option<String>,
    finish: Option<String>,
    hidden: bool,
}

impl ProgressTrackerBuilder {
    pub fn with_len(mut self, len: Option<u64>) -> Self {
        self.len = len;
        self
    }

    pub fn with_prefix(mut self, prefix: &str) -> Self {
        self.prefix = Some(prefix.to_string());
        self
    }

    pub fn with_finish(mut self, finish: &str) -> Self {
        self.finish = Some(finish.to_string());
        self
    }

    pub fn hidden(mut self, hidden: bool) -> Self {
        self.hidden = hidden;
        self
    }
}

impl TrackerBuilder<ProgressTracker, DownloadProgress> for ProgressTrackerBuilder {
    fn build(self) -> ProgressTracker {
        let (pb, style) = match self.len {
            Some(len) => (ProgressBar::new(len), BAR_TEMPLATE.as_ref()),
            None => (ProgressBar::new_spinner(), SPINNER_TEMPLATE.as_ref()),
        };
        let pb = match style {
            Some(style) => pb.with_style(style.clone()),
            None => pb,
        };
        if self.hidden {
            pb.set_draw_target(indicatif::ProgressDrawTarget::hidden());
        }
        if let Some(prefix) = self.prefix {
            pb.set_prefix(prefix);
        }
        ProgressTracker {
            pb,
            finish: self.finish,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_templates_parse() {
        assert!(BAR_TEMPLATE.is_some());
        assert!(SPINNER_TEMPLATE.is_some());
    }

    #[test]
    fn test_step_follows_absolute_positions() {
        let tracker = ProgressTrackerBuilder::default().hidden(true).build();
        tracker.step(DownloadProgress::new(4000, Some(10_000)));
        assert_eq!(tracker.pb.position(), 4000);
        assert_eq!(tracker.pb.length(), Some(10_000));

        tracker.step(DownloadProgress::new(10_000, Some(10_000)));
        assert_eq!(tracker.pb.position(), 10_000);
        tracker.finish();
    }
}
