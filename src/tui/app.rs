use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use std::collections::BTreeMap;

use super::UiMessage;
use crate::job::JobOptions;
use crate::tagging::{ManualOverride, ResolvedTagSet};

const MAX_LOG_LINES: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    Url,
    Manual,
    Artist,
    Album,
    Year,
    ShareThumbnail,
}

impl Focus {
    const ORDER: [Focus; 6] = [
        Focus::Url,
        Focus::Manual,
        Focus::Artist,
        Focus::Album,
        Focus::Year,
        Focus::ShareThumbnail,
    ];

    fn is_manual_field(self) -> bool {
        matches!(self, Focus::Artist | Focus::Album | Focus::Year)
    }
}

/// What the event loop should do after a key press
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Start { url: String, options: JobOptions },
    Quit,
    Cancel,
}

/// Byte progress of the item shown in the gauge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemProgress {
    pub label: String,
    pub downloaded: u64,
    pub total: u64,
}

/// All presentation state. Mutated only from the UI loop.
#[derive(Debug)]
pub struct App {
    pub url: String,
    pub artist: String,
    pub album: String,
    pub year: String,
    pub manual: bool,
    pub share_thumbnail: bool,
    pub focus: Focus,
    pub running: bool,
    pub job_title: Option<String>,
    pub playlist: bool,
    pub current: Option<ItemProgress>,
    pub overall: Option<(usize, usize)>,
    pub rows: BTreeMap<usize, ResolvedTagSet>,
    pub log: Vec<String>,
}

impl Default for App {
    fn default() -> Self {
        Self {
            url: String::new(),
            artist: String::new(),
            album: String::new(),
            year: String::new(),
            manual: false,
            share_thumbnail: true,
            focus: Focus::Url,
            running: false,
            job_title: None,
            playlist: false,
            current: None,
            overall: None,
            rows: BTreeMap::new(),
            log: Vec::new(),
        }
    }
}

impl App {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a message marshalled from the download worker
    pub fn apply(&mut self, message: UiMessage) {
        match message {
            UiMessage::JobStarted { title, total_items, playlist } => {
                self.job_title = Some(title.clone());
                self.playlist = playlist;
                self.current = None;
                self.overall = playlist.then_some((0, total_items));
                self.push_log(format!("Downloading {} ({} items)", title, total_items));
            }
            UiMessage::Progress { label, downloaded, total } => match self.current.as_mut() {
                Some(current) => {
                    current.downloaded = downloaded;
                    current.total = total;
                }
                None => {
                    self.current = Some(ItemProgress { label, downloaded, total });
                }
            },
            UiMessage::ItemFinished { .. } => self.current = None,
            UiMessage::Overall { completed, total } => self.overall = Some((completed, total)),
            UiMessage::Log(line) => self.push_log(line),
            UiMessage::TagRow { index, tags } => {
                self.rows.insert(index, tags);
            }
            UiMessage::JobFinished { completed, total } => {
                self.push_log(format!("Job finished: {}/{} items", completed, total));
            }
            UiMessage::WorkerDone(result) => {
                self.running = false;
                self.current = None;
                match result {
                    Ok(report) => self.push_log(format!(
                        "Saved {} tracks to {}",
                        report.tagged,
                        report.output_dir.display()
                    )),
                    Err(err) => self.push_log(format!("Error: {}", err)),
                }
            }
        }
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> Option<Action> {
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            return Some(Action::Cancel);
        }

        match key.code {
            KeyCode::Esc if !self.running => return Some(Action::Quit),
            KeyCode::Tab => self.move_focus(true),
            KeyCode::BackTab => self.move_focus(false),
            _ if self.running => {}
            KeyCode::Enter => return self.submit(),
            KeyCode::Char(' ') if self.focus == Focus::Manual => {
                self.manual = !self.manual;
            }
            KeyCode::Char(' ') if self.focus == Focus::ShareThumbnail => {
                self.share_thumbnail = !self.share_thumbnail;
            }
            KeyCode::Char(c) => {
                if let Some(field) = self.focused_text() {
                    field.push(c);
                }
            }
            KeyCode::Backspace => {
                if let Some(field) = self.focused_text() {
                    field.pop();
                }
            }
            _ => {}
        }
        None
    }

    pub fn job_options(&self) -> JobOptions {
        let manual = if self.manual {
            ManualOverride::from_fields(&self.artist, &self.album, &self.year)
        } else {
            None
        };

        JobOptions {
            manual,
            share_playlist_thumbnail: self.share_thumbnail,
        }
    }

    fn submit(&mut self) -> Option<Action> {
        let url = self.url.trim().to_string();
        if url.is_empty() {
            self.push_log("Enter a video or playlist URL first".to_string());
            return None;
        }

        self.running = true;
        self.job_title = None;
        self.overall = None;
        self.current = None;
        self.rows.clear();
        self.push_log(format!("Fetching metadata for {}", url));

        Some(Action::Start {
            url,
            options: self.job_options(),
        })
    }

    fn move_focus(&mut self, forward: bool) {
        let len = Focus::ORDER.len();
        let mut position = Focus::ORDER
            .iter()
            .position(|focus| *focus == self.focus)
            .unwrap_or(0);

        loop {
            position = if forward { (position + 1) % len } else { (position + len - 1) % len };
            let candidate = Focus::ORDER[position];
            if self.manual || !candidate.is_manual_field() {
                self.focus = candidate;
                return;
            }
        }
    }

    fn focused_text(&mut self) -> Option<&mut String> {
        match self.focus {
            Focus::Url => Some(&mut self.url),
            Focus::Artist if self.manual => Some(&mut self.artist),
            Focus::Album if self.manual => Some(&mut self.album),
            Focus::Year if self.manual => Some(&mut self.year),
            _ => None,
        }
    }

    fn push_log(&mut self, line: String) {
        let stamp = chrono::Local::now().format("%H:%M:%S");
        self.log.push(format!("{} {}", stamp, line));
        if self.log.len() > MAX_LOG_LINES {
            let excess = self.log.len() - MAX_LOG_LINES;
            self.log.drain(..excess);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobReport;
    use std::path::PathBuf;

    fn press(app: &mut App, code: KeyCode) -> Option<Action> {
        app.handle_key(KeyEvent::new(code, KeyModifiers::NONE))
    }

    fn type_text(app: &mut App, text: &str) {
        for c in text.chars() {
            press(app, KeyCode::Char(c));
        }
    }

    #[test]
    fn test_submit_without_manual_tags() {
        let mut app = App::new();
        assert_eq!(press(&mut app, KeyCode::Enter), None);

        type_text(&mut app, "https://youtu.be/x");
        let action = press(&mut app, KeyCode::Enter);
        assert_eq!(
            action,
            Some(Action::Start {
                url: "https://youtu.be/x".to_string(),
                options: JobOptions {
                    manual: None,
                    share_playlist_thumbnail: true,
                },
            })
        );
        assert!(app.running);
    }

    #[test]
    fn test_manual_fields_are_skipped_until_enabled() {
        let mut app = App::new();
        press(&mut app, KeyCode::Tab);
        assert_eq!(app.focus, Focus::Manual);
        press(&mut app, KeyCode::Tab);
        assert_eq!(app.focus, Focus::ShareThumbnail);

        press(&mut app, KeyCode::BackTab);
        press(&mut app, KeyCode::Char(' '));
        assert!(app.manual);
        press(&mut app, KeyCode::Tab);
        assert_eq!(app.focus, Focus::Artist);
    }

    #[test]
    fn test_manual_override_from_form() {
        let mut app = App::new();
        type_text(&mut app, "https://youtu.be/x");
        press(&mut app, KeyCode::Tab);
        press(&mut app, KeyCode::Char(' '));
        press(&mut app, KeyCode::Tab);
        type_text(&mut app, "Band");
        press(&mut app, KeyCode::Tab);
        press(&mut app, KeyCode::Tab);
        type_text(&mut app, "19999");
        press(&mut app, KeyCode::Backspace);
        press(&mut app, KeyCode::Tab);
        press(&mut app, KeyCode::Char(' '));

        let options = app.job_options();
        assert!(!options.share_playlist_thumbnail);
        assert_eq!(
            options.manual,
            Some(ManualOverride {
                artist: Some("Band".to_string()),
                album: None,
                year: Some("1999".to_string()),
            })
        );
    }

    #[test]
    fn test_form_is_locked_while_running() {
        let mut app = App::new();
        type_text(&mut app, "https://youtu.be/x");
        press(&mut app, KeyCode::Enter);

        type_text(&mut app, "zzz");
        assert_eq!(app.url, "https://youtu.be/x");
        assert_eq!(press(&mut app, KeyCode::Enter), None);
        assert_eq!(press(&mut app, KeyCode::Esc), None);
        assert_eq!(
            app.handle_key(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL)),
            Some(Action::Cancel)
        );
    }

    #[test]
    fn test_progress_updates_one_gauge() {
        let mut app = App::new();
        app.apply(UiMessage::JobStarted {
            title: "Mix".to_string(),
            total_items: 2,
            playlist: true,
        });
        assert_eq!(app.overall, Some((0, 2)));

        app.apply(UiMessage::Progress { label: "One".to_string(), downloaded: 1, total: 10 });
        app.apply(UiMessage::Progress { label: "One".to_string(), downloaded: 5, total: 10 });
        assert_eq!(
            app.current,
            Some(ItemProgress { label: "One".to_string(), downloaded: 5, total: 10 })
        );

        app.apply(UiMessage::ItemFinished { label: "One".to_string() });
        app.apply(UiMessage::Overall { completed: 1, total: 2 });
        assert_eq!(app.current, None);
        assert_eq!(app.overall, Some((1, 2)));
    }

    #[test]
    fn test_tag_rows_are_keyed_by_index() {
        let mut app = App::new();
        let tags = |title: &str| ResolvedTagSet {
            title: Some(title.to_string()),
            ..Default::default()
        };
        app.apply(UiMessage::TagRow { index: 3, tags: tags("Three") });
        app.apply(UiMessage::TagRow { index: 1, tags: tags("One") });
        app.apply(UiMessage::TagRow { index: 3, tags: tags("Three (again)") });

        let titles: Vec<_> = app.rows.values().filter_map(|row| row.title.clone()).collect();
        assert_eq!(titles, vec!["One".to_string(), "Three (again)".to_string()]);
    }

    #[test]
    fn test_worker_done_unlocks_form() {
        let mut app = App::new();
        type_text(&mut app, "https://youtu.be/x");
        press(&mut app, KeyCode::Enter);

        app.apply(UiMessage::WorkerDone(Ok(JobReport {
            title: "Song".to_string(),
            playlist: false,
            completed: 1,
            total_items: 1,
            tagged: 1,
            tag_failures: 0,
            output_dir: PathBuf::from("download"),
        })));
        assert!(!app.running);
        assert!(app.log.last().unwrap().ends_with("Saved 1 tracks to download"));
        assert_eq!(press(&mut app, KeyCode::Esc), Some(Action::Quit));
    }
}
