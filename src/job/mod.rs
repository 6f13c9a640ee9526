//! One download job: enumerate a URL, plan the output layout, drive the engine and
//! route its callbacks into the progress aggregator and the tagging post-processor.

use anyhow::Context;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::engine::{DownloadHooks, ItemMetadata, JobInfo, MediaEngine, PostProcessOutcome, ProgressEvent};
use crate::progress::{JobState, Presenter, ProgressAggregator};
use crate::tagging::{strip_album_prefix, ManualOverride, TaggingPostProcessor};
use crate::utils::{sanitize_filename, validate_and_normalize_url};
use crate::{Result, YtmdError};

/// Per-job choices made by the operator
#[derive(Debug, Clone, PartialEq)]
pub struct JobOptions {
    pub manual: Option<ManualOverride>,
    pub share_playlist_thumbnail: bool,
}

impl JobOptions {
    /// The plain CLI never overrides tags and always shares the playlist thumbnail
    pub fn cli() -> Self {
        Self {
            manual: None,
            share_playlist_thumbnail: true,
        }
    }
}

/// Where and how a URL will be downloaded
#[derive(Debug, Clone, PartialEq)]
pub struct JobPlan {
    pub url: String,
    pub title: String,
    pub playlist: bool,
    pub total_items: usize,

    /// Directory receiving the files (the album directory for playlists)
    pub output_dir: PathBuf,

    /// Engine output template
    pub output_template: String,
}

impl JobPlan {
    pub fn new(url: &str, info: &JobInfo, root: &Path) -> Self {
        let playlist = info.is_playlist();
        let title = info
            .title
            .clone()
            .unwrap_or_else(|| if playlist { "Playlist" } else { "Video" }.to_string());

        let (output_dir, file_template) = if playlist {
            let dir_name = sanitize_filename(strip_album_prefix(&title));
            let dir_name = if dir_name.is_empty() { "Playlist".to_string() } else { dir_name };
            (root.join(dir_name), "%(playlist_index)s - %(title)s.%(ext)s")
        } else {
            (root.to_path_buf(), "%(title)s.%(ext)s")
        };

        // Literal path text must not be read as template fields
        let output_template = format!(
            "{}/{}",
            output_dir.to_string_lossy().replace('%', "%%"),
            file_template
        );

        Self {
            url: url.to_string(),
            title,
            playlist,
            total_items: info.available_items(),
            output_dir,
            output_template,
        }
    }
}

/// Outcome of a finished job
#[derive(Debug, Clone, PartialEq)]
pub struct JobReport {
    pub title: String,
    pub playlist: bool,
    pub completed: usize,
    pub total_items: usize,
    pub tagged: usize,
    pub tag_failures: usize,
    pub output_dir: PathBuf,
}

/// Receives the engine callbacks for one job
struct Coordinator {
    presenter: Arc<dyn Presenter>,
    aggregator: ProgressAggregator,
    tagger: TaggingPostProcessor,

    /// Label of the last item that reported `finished` and has not produced a record yet
    last_finished: Option<String>,
}

/// Key matching an item record to its progress events: the title, else the file stem
fn item_label(item: &ItemMetadata) -> String {
    item.title
        .clone()
        .filter(|title| !title.trim().is_empty())
        .or_else(|| item.filepath.file_stem().map(|stem| stem.to_string_lossy().into_owned()))
        .unwrap_or_default()
}

impl DownloadHooks for Coordinator {
    fn on_progress(&mut self, event: ProgressEvent) {
        match event {
            ProgressEvent::Downloading { label, downloaded, total } => {
                // A new download means any earlier finished item will not produce a record
                self.last_finished = None;
                self.aggregator.on_progress(&label, downloaded, total);
            }
            ProgressEvent::Finished { label } => {
                self.aggregator.on_finished(&label);
                self.last_finished = Some(label);
            }
        }
    }

    fn post_process(&mut self, item: ItemMetadata) -> PostProcessOutcome {
        // An item can arrive without a finish event (e.g. it was already on disk)
        let label = item_label(&item);
        if self.last_finished.take().as_deref() != Some(label.as_str()) {
            self.aggregator.on_finished(&label);
        }

        self.tagger.process(item)
    }

    fn on_engine_message(&mut self, line: &str) {
        self.presenter.log(&format!("Engine error: {}", line));
    }
}

/// Validate and enumerate `url`, then plan its output layout under `root`
pub async fn prepare(engine: &dyn MediaEngine, url: &str, root: &Path) -> Result<(JobInfo, JobPlan)> {
    let url = validate_and_normalize_url(url)?;

    tracing::info!("Fetching metadata for {} with {}", url, engine.engine_name());
    let info = engine.fetch_info(&url).await?;
    let plan = JobPlan::new(&url, &info, root);

    if plan.total_items == 0 {
        return Err(YtmdError::NothingToDownload(url).into());
    }

    Ok((info, plan))
}

/// Download every item of `plan`, tagging each one as the engine finishes it
pub async fn execute(
    engine: &dyn MediaEngine,
    plan: &JobPlan,
    options: &JobOptions,
    presenter: Arc<dyn Presenter>,
) -> Result<JobReport> {
    let mut coordinator = Coordinator {
        presenter: presenter.clone(),
        aggregator: ProgressAggregator::new(presenter.clone()),
        tagger: TaggingPostProcessor::new(
            presenter.clone(),
            options.manual.clone(),
            plan.playlist,
            options.share_playlist_thumbnail,
        ),
        last_finished: None,
    };

    coordinator.aggregator.start(&plan.title, plan.total_items, plan.playlist);

    if let Err(err) = engine.download(&plan.url, &plan.output_template, &mut coordinator).await {
        coordinator.aggregator.fail(&err.to_string());
        return Err(err);
    }

    coordinator.aggregator.finish();
    debug_assert_eq!(coordinator.aggregator.state(), JobState::Finished);

    coordinator.tagger.write_container_attributes(&plan.output_dir).await;

    let report = JobReport {
        title: plan.title.clone(),
        playlist: plan.playlist,
        completed: coordinator.aggregator.completed(),
        total_items: plan.total_items,
        tagged: coordinator.tagger.tagged(),
        tag_failures: coordinator.tagger.failed(),
        output_dir: plan.output_dir.clone(),
    };
    tracing::info!(
        "Finished {}: {}/{} downloaded, {} tagged",
        report.title,
        report.completed,
        report.total_items,
        report.tagged
    );

    Ok(report)
}

/// `prepare` followed by `execute`
pub async fn run_job(
    engine: &dyn MediaEngine,
    url: &str,
    root: &Path,
    options: &JobOptions,
    presenter: Arc<dyn Presenter>,
) -> Result<JobReport> {
    let (_, plan) = prepare(engine, url, root).await?;
    execute(engine, &plan, options, presenter).await
}

/// URLs from a newline-delimited batch file; blank lines and `#` comments are skipped
pub fn read_batch_file(path: &Path) -> Result<Vec<String>> {
    let content = fs_err::read_to_string(path)
        .with_context(|| format!("Failed to read batch file {}", path.display()))?;

    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tagging::ResolvedTagSet;
    use async_trait::async_trait;
    use id3::{Tag, TagLike};
    use serde_json::json;
    use std::sync::Mutex;
    use tempfile::TempDir;

    #[derive(Default)]
    struct RecordingPresenter {
        events: Mutex<Vec<String>>,
    }

    impl RecordingPresenter {
        fn events(&self) -> Vec<String> {
            self.events.lock().unwrap().clone()
        }

        fn push(&self, event: String) {
            self.events.lock().unwrap().push(event);
        }
    }

    impl Presenter for RecordingPresenter {
        fn job_started(&self, title: &str, total_items: usize, playlist: bool) {
            self.push(format!("start {} {} {}", title, total_items, playlist));
        }
        fn update_progress(&self, label: &str, downloaded: u64, total: u64) {
            self.push(format!("progress {} {}/{}", label, downloaded, total));
        }
        fn item_finished(&self, label: &str) {
            self.push(format!("finished {}", label));
        }
        fn overall_progress(&self, completed: usize, total: usize) {
            self.push(format!("overall {}/{}", completed, total));
        }
        fn log(&self, line: &str) {
            self.push(format!("log {}", line));
        }
        fn tags_resolved(&self, index: usize, tags: &ResolvedTagSet) {
            self.push(format!("tags {} {}", index, tags.title.clone().unwrap_or_default()));
        }
        fn job_finished(&self, completed: usize, total: usize) {
            self.push(format!("done {}/{}", completed, total));
        }
    }

    enum Step {
        Progress(ProgressEvent),
        Item(ItemMetadata),
        Error(&'static str),
    }

    struct FakeEngine {
        info: serde_json::Value,
        steps: Mutex<Vec<Step>>,
        fail_download: bool,
    }

    impl FakeEngine {
        fn new(info: serde_json::Value, steps: Vec<Step>) -> Self {
            Self {
                info,
                steps: Mutex::new(steps),
                fail_download: false,
            }
        }
    }

    #[async_trait]
    impl MediaEngine for FakeEngine {
        async fn fetch_info(&self, _url: &str) -> Result<JobInfo> {
            Ok(JobInfo::from_json(&self.info))
        }

        async fn download(&self, _url: &str, _template: &str, hooks: &mut dyn DownloadHooks) -> Result<()> {
            let steps: Vec<Step> = self.steps.lock().unwrap().drain(..).collect();
            for step in steps {
                match step {
                    Step::Progress(event) => hooks.on_progress(event),
                    Step::Item(item) => {
                        let (produced, passthrough) = hooks.post_process(item.clone());
                        assert!(produced.is_empty());
                        assert_eq!(passthrough, item);
                    }
                    Step::Error(line) => hooks.on_engine_message(line),
                }
            }
            if self.fail_download {
                anyhow::bail!("connection reset");
            }
            Ok(())
        }

        fn engine_name(&self) -> &'static str {
            "fake"
        }
    }

    fn downloading(label: &str, downloaded: u64, total: u64) -> Step {
        Step::Progress(ProgressEvent::Downloading {
            label: label.to_string(),
            downloaded,
            total,
        })
    }

    fn finished(label: &str) -> Step {
        Step::Progress(ProgressEvent::Finished { label: label.to_string() })
    }

    fn track(dir: &Path, index: u32, title: &str, artist: &str, date: &str) -> ItemMetadata {
        let path = dir.join(format!("{} - {}.mp3", index, title));
        fs_err::create_dir_all(dir).unwrap();
        fs_err::write(&path, vec![0u8; 128]).unwrap();
        ItemMetadata {
            title: Some(title.to_string()),
            artist: Some(artist.to_string()),
            playlist_title: Some("Album - Late Night".to_string()),
            playlist_index: Some(index),
            upload_date: Some(date.to_string()),
            filepath: path,
            ..Default::default()
        }
    }

    fn playlist_info() -> serde_json::Value {
        json!({
            "_type": "playlist",
            "title": "Album - Late Night",
            "entries": [{"title": "One"}, null, {"title": "Three"}]
        })
    }

    #[test]
    fn test_plan_for_single_video() {
        let info = JobInfo::from_json(&json!({"title": "Song"}));
        let plan = JobPlan::new("https://youtu.be/x", &info, Path::new("download"));
        assert!(!plan.playlist);
        assert_eq!(plan.total_items, 1);
        assert_eq!(plan.output_dir, PathBuf::from("download"));
        assert_eq!(plan.output_template, "download/%(title)s.%(ext)s");
    }

    #[test]
    fn test_plan_for_playlist_strips_album_prefix() {
        let info = JobInfo::from_json(&playlist_info());
        let plan = JobPlan::new("https://youtube.com/playlist?list=x", &info, Path::new("download"));
        assert!(plan.playlist);
        assert_eq!(plan.total_items, 2);
        assert_eq!(plan.output_dir, PathBuf::from("download/Late Night"));
        assert_eq!(
            plan.output_template,
            "download/Late Night/%(playlist_index)s - %(title)s.%(ext)s"
        );
    }

    #[test]
    fn test_plan_escapes_and_sanitizes_directory() {
        let info = JobInfo::from_json(&json!({"title": "100% Hits: Vol/2", "entries": []}));
        let plan = JobPlan::new("u", &info, Path::new("download"));
        assert_eq!(plan.output_dir, PathBuf::from("download/100% Hits Vol2"));
        assert!(plan.output_template.starts_with("download/100%% Hits Vol2/"));
    }

    #[tokio::test]
    async fn test_playlist_with_hole_end_to_end() {
        let dir = TempDir::new().unwrap();
        let album = dir.path().join("Late Night");
        let one = track(&album, 1, "One", "Band", "20200101");
        let three = track(&album, 3, "Three", "Band", "20180101");

        let engine = FakeEngine::new(
            playlist_info(),
            vec![
                downloading("One", 0, 0),
                downloading("One", 50, 100),
                downloading("One", 100, 100),
                finished("One"),
                Step::Item(one.clone()),
                Step::Error("[youtube] two: Video unavailable"),
                downloading("Three", 10, 200),
                finished("Three"),
                Step::Item(three.clone()),
            ],
        );
        let presenter = Arc::new(RecordingPresenter::default());

        let (_, plan) = prepare(&engine, "https://www.youtube.com/playlist?list=PL1", dir.path())
            .await
            .unwrap();
        let report = execute(&engine, &plan, &JobOptions::cli(), presenter.clone())
            .await
            .unwrap();

        assert_eq!(report.total_items, 2);
        assert_eq!(report.completed, 2);
        assert_eq!(report.tagged, 2);
        assert_eq!(report.output_dir, album);

        let events = presenter.events();
        assert_eq!(events.first().map(String::as_str), Some("start Album - Late Night 2 true"));
        assert!(!events.contains(&"progress One 0/0".to_string()));
        assert!(events.contains(&"overall 2/2".to_string()));
        assert!(events.contains(&"log Engine error: [youtube] two: Video unavailable".to_string()));
        assert!(events.contains(&"tags 3 Three".to_string()));
        assert_eq!(events.iter().filter(|event| event.starts_with("done")).count(), 1);

        let tag = Tag::read_from_path(&three.filepath).unwrap();
        assert_eq!(tag.album(), Some("Late Night"));
        assert_eq!(tag.get("TRCK").and_then(|f| f.content().text()), Some("3"));
    }

    #[tokio::test]
    async fn test_item_without_finish_event_is_counted_once() {
        let dir = TempDir::new().unwrap();
        let song = track(dir.path(), 1, "Song", "Band", "2021");
        let engine = FakeEngine::new(json!({"title": "Song"}), vec![Step::Item(song)]);
        let presenter = Arc::new(RecordingPresenter::default());

        let report = run_job(&engine, "https://youtu.be/abc", dir.path(), &JobOptions::cli(), presenter.clone())
            .await
            .unwrap();

        assert_eq!(report.completed, 1);
        assert!(!report.playlist);
        assert!(presenter.events().contains(&"done 1/1".to_string()));
    }

    #[tokio::test]
    async fn test_finished_item_without_record_does_not_hide_next_item() {
        let dir = TempDir::new().unwrap();
        let album = dir.path().join("Late Night");
        // "One" fails conversion after downloading; "Three" was already on disk
        let three = track(&album, 3, "Three", "Band", "20180101");

        let engine = FakeEngine::new(
            playlist_info(),
            vec![downloading("One", 50, 100), finished("One"), Step::Item(three)],
        );
        let presenter = Arc::new(RecordingPresenter::default());

        let report = run_job(
            &engine,
            "https://www.youtube.com/playlist?list=PL1",
            dir.path(),
            &JobOptions::cli(),
            presenter.clone(),
        )
        .await
        .unwrap();

        assert_eq!(report.completed, 2);
        assert_eq!(report.tagged, 1);
        assert!(presenter.events().contains(&"finished Three".to_string()));
    }

    #[tokio::test]
    async fn test_record_after_new_download_is_counted() {
        let dir = TempDir::new().unwrap();
        let album = dir.path().join("Late Night");
        let three = track(&album, 3, "Three", "Band", "20180101");

        let engine = FakeEngine::new(
            playlist_info(),
            vec![
                downloading("One", 50, 100),
                finished("One"),
                downloading("Three", 10, 100),
                Step::Item(three),
            ],
        );
        let presenter = Arc::new(RecordingPresenter::default());

        let report = run_job(
            &engine,
            "https://www.youtube.com/playlist?list=PL1",
            dir.path(),
            &JobOptions::cli(),
            presenter.clone(),
        )
        .await
        .unwrap();

        assert_eq!(report.completed, 2);
        assert_eq!(presenter.events().iter().filter(|event| event.starts_with("finished")).count(), 2);
    }

    #[test]
    fn test_item_label_prefers_title() {
        let mut item = ItemMetadata {
            filepath: PathBuf::from("download/Mix/2 - Two.mp3"),
            ..Default::default()
        };
        assert_eq!(item_label(&item), "2 - Two");

        item.title = Some("Two".to_string());
        assert_eq!(item_label(&item), "Two");
    }

    #[tokio::test]
    async fn test_engine_failure_is_reported() {
        let dir = TempDir::new().unwrap();
        let mut engine = FakeEngine::new(json!({"title": "Song"}), vec![downloading("Song", 1, 10)]);
        engine.fail_download = true;
        let presenter = Arc::new(RecordingPresenter::default());

        let err = run_job(&engine, "https://youtu.be/abc", dir.path(), &JobOptions::cli(), presenter.clone())
            .await
            .unwrap_err();

        assert!(err.to_string().contains("connection reset"));
        assert!(presenter.events().contains(&"log Job failed: connection reset".to_string()));
    }

    #[tokio::test]
    async fn test_invalid_url_and_empty_playlist() {
        let dir = TempDir::new().unwrap();
        let engine = FakeEngine::new(json!({"_type": "playlist", "entries": [null]}), Vec::new());

        assert!(prepare(&engine, "not a url", dir.path()).await.is_err());

        let err = prepare(&engine, "https://youtube.com/playlist?list=x", dir.path())
            .await
            .unwrap_err();
        assert!(matches!(err.downcast_ref::<YtmdError>(), Some(YtmdError::NothingToDownload(_))));
    }

    #[test]
    fn test_read_batch_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("urls.txt");
        fs_err::write(&path, "https://youtu.be/a\n\n  # skipped\n https://youtu.be/b \n").unwrap();
        assert_eq!(
            read_batch_file(&path).unwrap(),
            vec!["https://youtu.be/a".to_string(), "https://youtu.be/b".to_string()]
        );
        assert!(read_batch_file(&dir.path().join("missing.txt")).is_err());
    }
}
