use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::sync::Mutex;

use super::Presenter;
use crate::tagging::ResolvedTagSet;

/// indicatif rendering for the plain CLI: one bar for the active item plus an
/// overall bar for multi-item playlists.
pub struct ConsolePresenter {
    multi: MultiProgress,
    overall: Mutex<Option<ProgressBar>>,
    current: Mutex<Option<ProgressBar>>,
}

impl ConsolePresenter {
    pub fn new(quiet: bool) -> Self {
        let multi = if quiet {
            MultiProgress::with_draw_target(ProgressDrawTarget::hidden())
        } else {
            MultiProgress::new()
        };

        Self {
            multi,
            overall: Mutex::new(None),
            current: Mutex::new(None),
        }
    }

    fn item_style() -> ProgressStyle {
        ProgressStyle::default_bar()
            .template("{msg:33.green} [{bar:30.cyan/blue}] {percent:>3}% {bytes_per_sec:>11} {eta:>4}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> ")
    }

    fn overall_style() -> ProgressStyle {
        ProgressStyle::default_bar()
            .template("{msg:33.yellow.bold} [{bar:30.yellow}] {pos}/{len}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> ")
    }
}

impl Presenter for ConsolePresenter {
    fn job_started(&self, title: &str, total_items: usize, playlist: bool) {
        tracing::debug!("Job started: {} ({} items)", title, total_items);

        if playlist && total_items > 1 {
            let bar = self.multi.add(ProgressBar::new(total_items as u64));
            bar.set_style(Self::overall_style());
            bar.set_message(format!("Overall ({} items)", total_items));
            if let Ok(mut overall) = self.overall.lock() {
                *overall = Some(bar);
            }
        }
    }

    fn update_progress(&self, label: &str, downloaded: u64, total: u64) {
        let Ok(mut current) = self.current.lock() else {
            return;
        };
        let bar = current.get_or_insert_with(|| {
            let bar = self.multi.add(ProgressBar::new(total));
            bar.set_style(Self::item_style());
            bar.set_message(label.to_string());
            bar
        });
        bar.set_length(total);
        bar.set_position(downloaded);
    }

    fn item_finished(&self, _label: &str) {
        if let Some(bar) = self.current.lock().ok().and_then(|mut current| current.take()) {
            bar.finish_and_clear();
            self.multi.remove(&bar);
        }
    }

    fn overall_progress(&self, completed: usize, _total: usize) {
        if let Ok(overall) = self.overall.lock() {
            if let Some(bar) = overall.as_ref() {
                bar.set_position(completed as u64);
            }
        }
    }

    fn log(&self, line: &str) {
        let _ = self.multi.println(line);
    }

    fn tags_resolved(&self, index: usize, tags: &ResolvedTagSet) {
        let field = |value: &Option<String>| value.clone().unwrap_or_else(|| "-".to_string());
        let _ = self.multi.println(format!(
            "{} {} | {} | {} | {}",
            style(format!("#{:<3}", index)).cyan(),
            style(field(&tags.title)).magenta(),
            field(&tags.artist),
            field(&tags.album),
            field(&tags.year),
        ));
    }

    fn job_finished(&self, completed: usize, total: usize) {
        if let Some(bar) = self.overall.lock().ok().and_then(|mut overall| overall.take()) {
            bar.finish_with_message(format!("Done ({}/{})", completed, total));
        }
    }
}
