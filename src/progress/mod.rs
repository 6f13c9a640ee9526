//! Progress aggregation: imposes a job-level and an item-level state machine on the
//! engine's unstructured progress stream and forwards the result to a `Presenter`.

use std::sync::Arc;

pub mod console;

pub use self::console::ConsolePresenter;

use crate::tagging::ResolvedTagSet;

/// Per-item labels longer than this are shortened for display
const MAX_LABEL_CHARS: usize = 30;

/// A presentation surface fed by the aggregator and the tagging post-processor
#[cfg_attr(test, mockall::automock)]
pub trait Presenter: Send + Sync {
    /// A job entered `Running`
    fn job_started(&self, title: &str, total_items: usize, playlist: bool);

    /// Byte progress of the active item; called at engine frequency
    fn update_progress(&self, label: &str, downloaded: u64, total: u64);

    /// The active item finished downloading
    fn item_finished(&self, label: &str);

    /// Completed items out of the expected total (playlists only)
    fn overall_progress(&self, completed: usize, total: usize);

    /// Append a line to the log
    fn log(&self, line: &str);

    /// Tags written for the item at `index`
    fn tags_resolved(&self, index: usize, tags: &ResolvedTagSet);

    /// The job entered `Finished`
    fn job_finished(&self, completed: usize, total: usize);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    NotStarted,
    Running,
    Finished,
}

/// Byte progress of the single file currently downloading
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressState {
    pub label: String,
    pub downloaded: u64,
    pub total: u64,
}

pub struct ProgressAggregator {
    presenter: Arc<dyn Presenter>,
    state: JobState,
    playlist: bool,
    total_items: usize,
    completed: usize,
    active: Option<ProgressState>,
}

impl ProgressAggregator {
    pub fn new(presenter: Arc<dyn Presenter>) -> Self {
        Self {
            presenter,
            state: JobState::NotStarted,
            playlist: false,
            total_items: 0,
            completed: 0,
            active: None,
        }
    }

    /// `NotStarted -> Running` with the expected item count known
    pub fn start(&mut self, title: &str, total_items: usize, playlist: bool) {
        if self.state != JobState::NotStarted {
            tracing::debug!("Job already started, ignoring start for {}", title);
            return;
        }

        self.state = JobState::Running;
        self.playlist = playlist;
        self.total_items = total_items;
        self.presenter.job_started(title, total_items, playlist);
        if playlist {
            self.presenter.overall_progress(0, total_items);
        }
    }

    /// Byte progress for the current item. Totals of 0 mean the size is not known yet.
    pub fn on_progress(&mut self, label: &str, downloaded: u64, total: u64) {
        if total == 0 || self.state != JobState::Running {
            return;
        }

        let active = self.active.get_or_insert_with(|| ProgressState {
            label: shorten_label(label),
            downloaded: 0,
            total,
        });
        active.downloaded = downloaded.min(total);
        active.total = total;

        self.presenter
            .update_progress(&active.label, active.downloaded, active.total);
    }

    /// Close the current item and count it
    pub fn on_finished(&mut self, label: &str) {
        if self.state != JobState::Running {
            tracing::debug!("Finish event for {} outside a running job", label);
            return;
        }

        let label = self
            .active
            .take()
            .map(|active| active.label)
            .unwrap_or_else(|| shorten_label(label));
        self.presenter.item_finished(&label);

        if self.completed >= self.total_items {
            tracing::debug!("Ignoring finish event beyond {} expected items", self.total_items);
            return;
        }

        self.completed += 1;
        self.presenter.log(&format!("Finished downloading: {}", label));
        if self.playlist {
            self.presenter.overall_progress(self.completed, self.total_items);
        }

        if self.completed == self.total_items {
            self.enter_finished();
        }
    }

    /// The engine returned; any still-running job is over
    pub fn finish(&mut self) {
        if self.state == JobState::Running {
            self.active = None;
            self.enter_finished();
        }
    }

    /// The job raised; record it and stop accepting events
    pub fn fail(&mut self, reason: &str) {
        if self.state != JobState::Finished {
            self.presenter.log(&format!("Job failed: {}", reason));
        }
        self.finish();
        self.state = JobState::Finished;
    }

    fn enter_finished(&mut self) {
        self.state = JobState::Finished;
        self.presenter.job_finished(self.completed, self.total_items);
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn completed(&self) -> usize {
        self.completed
    }

    pub fn total_items(&self) -> usize {
        self.total_items
    }

    pub fn is_playlist(&self) -> bool {
        self.playlist
    }

    pub fn active(&self) -> Option<&ProgressState> {
        self.active.as_ref()
    }
}

/// Cut labels to a fixed width, marking the cut with "..."
pub fn shorten_label(label: &str) -> String {
    if label.chars().count() > MAX_LABEL_CHARS {
        let short: String = label.chars().take(MAX_LABEL_CHARS).collect();
        format!("{}...", short)
    } else {
        label.to_string()
    }
}
