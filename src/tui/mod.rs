//! Interactive terminal UI. The download runs on a spawned task; every presentation
//! change travels back as a `UiMessage` and is applied by the UI loop alone.

use anyhow::Context;
use crossterm::event::{Event, EventStream, KeyEventKind};
use futures_util::StreamExt;
use ratatui::DefaultTerminal;
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;

pub mod app;
pub mod view;

pub use app::{Action, App};

use crate::config::Config;
use crate::engine::ytdlp::YtDlpEngine;
use crate::job::{self, JobReport};
use crate::progress::Presenter;
use crate::tagging::ResolvedTagSet;
use crate::Result;

/// Presentation changes marshalled from the worker onto the UI loop
#[derive(Debug, Clone)]
pub enum UiMessage {
    JobStarted { title: String, total_items: usize, playlist: bool },
    Progress { label: String, downloaded: u64, total: u64 },
    ItemFinished { label: String },
    Overall { completed: usize, total: usize },
    Log(String),
    TagRow { index: usize, tags: ResolvedTagSet },
    JobFinished { completed: usize, total: usize },
    WorkerDone(std::result::Result<JobReport, String>),
}

/// How the UI was left
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TuiExit {
    Quit,
    Cancelled,
}

/// `Presenter` that never touches UI state, only posts messages to the UI loop
pub struct TuiPresenter {
    tx: UnboundedSender<UiMessage>,
}

impl TuiPresenter {
    pub fn new(tx: UnboundedSender<UiMessage>) -> Self {
        Self { tx }
    }

    /// Run `message` on the UI context. Dropped silently once the UI has exited.
    pub fn call_from_thread(&self, message: UiMessage) {
        let _ = self.tx.send(message);
    }
}

impl Presenter for TuiPresenter {
    fn job_started(&self, title: &str, total_items: usize, playlist: bool) {
        self.call_from_thread(UiMessage::JobStarted {
            title: title.to_string(),
            total_items,
            playlist,
        });
    }

    fn update_progress(&self, label: &str, downloaded: u64, total: u64) {
        self.call_from_thread(UiMessage::Progress {
            label: label.to_string(),
            downloaded,
            total,
        });
    }

    fn item_finished(&self, label: &str) {
        self.call_from_thread(UiMessage::ItemFinished { label: label.to_string() });
    }

    fn overall_progress(&self, completed: usize, total: usize) {
        self.call_from_thread(UiMessage::Overall { completed, total });
    }

    fn log(&self, line: &str) {
        self.call_from_thread(UiMessage::Log(line.to_string()));
    }

    fn tags_resolved(&self, index: usize, tags: &ResolvedTagSet) {
        self.call_from_thread(UiMessage::TagRow { index, tags: tags.clone() });
    }

    fn job_finished(&self, completed: usize, total: usize) {
        self.call_from_thread(UiMessage::JobFinished { completed, total });
    }
}

/// Take over the terminal until the operator quits or cancels
pub async fn run(config: Config) -> Result<TuiExit> {
    let mut terminal = ratatui::init();
    let result = event_loop(&mut terminal, config).await;
    ratatui::restore();
    result
}

async fn event_loop(terminal: &mut DefaultTerminal, config: Config) -> Result<TuiExit> {
    let (tx, mut rx): (UnboundedSender<UiMessage>, UnboundedReceiver<UiMessage>) = mpsc::unbounded_channel();
    let engine = Arc::new(YtDlpEngine::new(&config.engine));
    let mut app = App::new();
    let mut events = EventStream::new();
    let mut worker: Option<JoinHandle<()>> = None;

    loop {
        terminal
            .draw(|frame| view::draw(frame, &app))
            .context("Failed to draw terminal UI")?;

        tokio::select! {
            Some(message) = rx.recv() => {
                app.apply(message);
                // Coalesce bursts of progress messages into one redraw
                while let Ok(message) = rx.try_recv() {
                    app.apply(message);
                }
            }
            event = events.next() => match event {
                Some(Ok(Event::Key(key))) if key.kind == KeyEventKind::Press => {
                    match app.handle_key(key) {
                        Some(Action::Start { url, options }) => {
                            let presenter: Arc<dyn Presenter> = Arc::new(TuiPresenter::new(tx.clone()));
                            let done = tx.clone();
                            let engine = engine.clone();
                            let root = config.app.output_dir.clone();

                            worker = Some(tokio::spawn(async move {
                                let result = job::run_job(engine.as_ref(), &url, &root, &options, presenter).await;
                                if let Err(err) = &result {
                                    tracing::error!("Job for {} failed: {:#}", url, err);
                                }
                                let _ = done.send(UiMessage::WorkerDone(result.map_err(|err| format!("{:#}", err))));
                            }));
                        }
                        Some(Action::Quit) => return Ok(TuiExit::Quit),
                        Some(Action::Cancel) => {
                            cancel_worker(worker.take()).await;
                            return Ok(TuiExit::Cancelled);
                        }
                        None => {}
                    }
                }
                Some(Ok(_)) => {}
                Some(Err(err)) => return Err(err).context("Failed to read terminal events"),
                None => return Ok(TuiExit::Quit),
            },
        }
    }
}

/// Abort the job and wait until its future is dropped, which kills the engine process
async fn cancel_worker(worker: Option<JoinHandle<()>>) {
    if let Some(worker) = worker {
        worker.abort();
        let _ = worker.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presenter_marshals_every_call() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let presenter = TuiPresenter::new(tx);

        presenter.job_started("Mix", 2, true);
        presenter.update_progress("One", 5, 10);
        presenter.log("hello");

        let mut app = App::new();
        while let Ok(message) = rx.try_recv() {
            app.apply(message);
        }
        assert_eq!(app.job_title.as_deref(), Some("Mix"));
        assert_eq!(app.current.as_ref().map(|current| current.downloaded), Some(5));
        assert!(app.log.last().unwrap().ends_with("hello"));
    }

    #[test]
    fn test_send_after_ui_exit_is_silent() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        TuiPresenter::new(tx).log("nobody listening");
    }

    #[tokio::test]
    async fn test_cancel_waits_for_job_to_drop() {
        use std::sync::atomic::{AtomicBool, Ordering};

        struct SetOnDrop(Arc<AtomicBool>);
        impl Drop for SetOnDrop {
            fn drop(&mut self) {
                self.0.store(true, Ordering::SeqCst);
            }
        }

        let dropped = Arc::new(AtomicBool::new(false));
        let guard = SetOnDrop(dropped.clone());
        let worker = tokio::spawn(async move {
            let _guard = guard;
            std::future::pending::<()>().await;
        });
        tokio::task::yield_now().await;

        cancel_worker(Some(worker)).await;
        assert!(dropped.load(Ordering::SeqCst));

        cancel_worker(None).await;
    }
}
