use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use kairos_core::{
    Collaborators, DirSessionStore, KairosError, Pipeline, PipelineEvent, PipelineOptions,
    PlaylistSummary, Privacy, Progress, Result, Segment, SessionId, SessionStore, Subtopic,
    Syllabus, Topic, TranscriptRecord, VideoIdCollector,
    backends::{
        AudioSource, CatalogSearch, Planner, PlaylistPlatform, Recognition, RecognitionOptions,
        SpeechRecognizer, TranscriptService,
    },
    store::{SYLLABUS_KEY, TRANSCRIPT_LOG_KEY},
};
use serde_json::{Value, json};
use tempfile::TempDir;
use tokio::sync::broadcast;

const GOAL: &str = "Intro to Signal Processing";

fn signal_processing() -> Syllabus {
    Syllabus {
        title: Some(GOAL.to_string()),
        description: None,
        topics: vec![Topic {
            title: "Sampling".to_string(),
            subtopics: vec![Subtopic {
                title: "Nyquist".to_string(),
                search_queries: vec![
                    "nyquist theorem".to_string(),
                    "aliasing explained".to_string(),
                ],
            }],
        }],
    }
}

struct FixedPlanner {
    syllabus: Syllabus,
    calls: AtomicUsize,
}

impl FixedPlanner {
    fn new(syllabus: Syllabus) -> Self {
        Self {
            syllabus,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Planner for FixedPlanner {
    async fn plan(&self, _goal: &str) -> Result<(SessionId, Syllabus)> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok((SessionId::generate(), self.syllabus.clone()))
    }
}

fn raw_entry(id: &str) -> Value {
    json!({
        "id": id,
        "title": format!("Video {id}"),
        "url": format!("https://www.youtube.com/watch?v={id}"),
        "description": null,
        "duration": 300.0,
        "channel": "Signals",
        "channel_url": null,
        "uploader": "Signals",
        "uploader_url": null,
        "view_count": 42,
        "ie_key": "Youtube"
    })
}

/// Canned results per query; unknown queries fail.
struct FakeCatalog {
    results: HashMap<String, Vec<&'static str>>,
}

impl FakeCatalog {
    fn new(results: &[(&str, Vec<&'static str>)]) -> Self {
        Self {
            results: results
                .iter()
                .map(|(query, ids)| (query.to_string(), ids.clone()))
                .collect(),
        }
    }
}

#[async_trait]
impl CatalogSearch for FakeCatalog {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<Value>> {
        match self.results.get(query) {
            Some(ids) => Ok(ids.iter().take(max_results).map(|id| raw_entry(id)).collect()),
            None => Err(KairosError::CatalogSearchFailed {
                query: query.to_string(),
                reason: "HTTP Error 429: Too Many Requests".to_string(),
            }),
        }
    }
}

#[derive(Default)]
struct FakePlaylists {
    created: AtomicUsize,
    attached: Mutex<Vec<(String, String)>>,
    fail_create: bool,
    reject: Vec<&'static str>,
}

#[async_trait]
impl PlaylistPlatform for FakePlaylists {
    async fn create_playlist(
        &self,
        title: &str,
        _description: &str,
        _privacy: Privacy,
    ) -> Result<String> {
        if self.fail_create {
            return Err(KairosError::PlaylistCreationFailed {
                title: title.to_string(),
                reason: "quotaExceeded".to_string(),
            });
        }
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok("PLsignals".to_string())
    }

    async fn add_video(&self, playlist_id: &str, video_id: &str) -> Result<()> {
        if self.reject.iter().any(|id| *id == video_id) {
            return Err(KairosError::PlaylistAttachFailed {
                playlist_id: playlist_id.to_string(),
                video_id: video_id.to_string(),
                reason: "videoNotFound".to_string(),
            });
        }
        self.attached
            .lock()
            .unwrap()
            .push((playlist_id.to_string(), video_id.to_string()));
        Ok(())
    }

    async fn list_playlists(&self, _max_results: usize) -> Result<Vec<PlaylistSummary>> {
        Ok(Vec::new())
    }
}

/// Captions exist for every id except the listed ones.
#[derive(Default)]
struct FakeCaptions {
    missing: Vec<&'static str>,
}

#[async_trait]
impl TranscriptService for FakeCaptions {
    async fn fetch(&self, video_id: &str) -> Result<Vec<Segment>> {
        if self.missing.iter().any(|id| *id == video_id) {
            return Err(KairosError::TranscriptFetchFailed {
                video_id: video_id.to_string(),
                reason: "subtitles disabled".to_string(),
            });
        }
        Ok(vec![Segment {
            start: 0.0,
            end: 4.2,
            text: format!("captions of {video_id}"),
        }])
    }
}

#[derive(Default)]
struct FakeAudio {
    calls: AtomicUsize,
}

#[async_trait]
impl AudioSource for FakeAudio {
    async fn download(&self, video_id: &str) -> Result<PathBuf> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(PathBuf::from(format!("/cache/media/{video_id}/audio.wav")))
    }
}

struct FakeWhisper;

#[async_trait]
impl SpeechRecognizer for FakeWhisper {
    async fn transcribe(
        &self,
        audio: &Path,
        _options: &RecognitionOptions,
    ) -> Result<Recognition> {
        Ok(Recognition {
            segments: vec![Segment {
                start: 0.0,
                end: 2.0,
                text: format!("whisper of {}", audio.display()),
            }],
            language: "en".to_string(),
        })
    }
}

struct Harness {
    _temp_dir: TempDir,
    store: Arc<DirSessionStore>,
    planner: Arc<FixedPlanner>,
    playlists: Arc<FakePlaylists>,
    audio: Arc<FakeAudio>,
    pipeline: Pipeline,
}

fn harness(
    catalog: FakeCatalog,
    playlists: FakePlaylists,
    captions: FakeCaptions,
    options: PipelineOptions,
) -> Harness {
    let temp_dir = TempDir::new().unwrap();
    let store = Arc::new(DirSessionStore::new(temp_dir.path()));
    let planner = Arc::new(FixedPlanner::new(signal_processing()));
    let playlists = Arc::new(playlists);
    let audio = Arc::new(FakeAudio::default());

    let collaborators = Collaborators {
        planner: planner.clone(),
        catalog: Arc::new(catalog),
        playlists: playlists.clone(),
        transcripts: Arc::new(captions),
        audio: audio.clone(),
        recognizer: Arc::new(FakeWhisper),
    };
    let pipeline = Pipeline::new(store.clone(), collaborators, options);

    Harness {
        _temp_dir: temp_dir,
        store,
        planner,
        playlists,
        audio,
        pipeline,
    }
}

fn default_catalog() -> FakeCatalog {
    FakeCatalog::new(&[
        ("nyquist theorem", vec!["v1", "v2", "v3"]),
        ("aliasing explained", vec!["v3", "v4"]),
    ])
}

async fn transcript_log(store: &DirSessionStore, session: &SessionId) -> Vec<TranscriptRecord> {
    store
        .read_log(session, TRANSCRIPT_LOG_KEY)
        .await
        .unwrap()
        .into_iter()
        .map(|record| serde_json::from_value(record).unwrap())
        .collect()
}

#[tokio::test]
async fn test_signal_processing_end_to_end() {
    let mut h = harness(
        default_catalog(),
        FakePlaylists::default(),
        FakeCaptions::default(),
        PipelineOptions::default(),
    );

    let report = h.pipeline.run(GOAL).await.unwrap();
    let session = report.session.clone().unwrap();

    let document = h.store.get(&session, "Sampling").await.unwrap().unwrap();
    let keys: Vec<_> = document.as_object().unwrap().keys().cloned().collect();
    assert_eq!(keys, vec!["v1", "v2", "v3", "v4"]);

    let stored = h.store.get(&session, SYLLABUS_KEY).await.unwrap().unwrap();
    assert_eq!(Syllabus::from_value(stored).unwrap(), signal_processing());

    assert_eq!(report.videos, 4);
    assert_eq!(report.attached, 4);
    assert_eq!(report.transcripts_primary, 4);
    assert_eq!(report.failed_queries, 0);
    assert!(!report.cancelled);
    assert_eq!(h.playlists.created.load(Ordering::SeqCst), 1);

    let attached: Vec<_> = h
        .playlists
        .attached
        .lock()
        .unwrap()
        .iter()
        .map(|(playlist, video)| {
            assert_eq!(playlist, "PLsignals");
            video.clone()
        })
        .collect();
    assert_eq!(attached, vec!["v1", "v2", "v3", "v4"]);

    let log = transcript_log(&h.store, &session).await;
    assert_eq!(log.len(), 4);
    assert_eq!(log[0].video_id, "v1");
    assert_eq!(
        log[3].transcript.as_ref().unwrap()[0].text,
        "captions of v4"
    );
    assert_eq!(h.audio.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_missing_captions_fall_back_and_unavailable_is_null() {
    struct NoAudio;

    #[async_trait]
    impl AudioSource for NoAudio {
        async fn download(&self, video_id: &str) -> Result<PathBuf> {
            if video_id == "v4" {
                return Err(KairosError::DownloadFailed {
                    url: video_id.to_string(),
                    reason: "Private video".to_string(),
                });
            }
            Ok(PathBuf::from("/cache/audio.wav"))
        }
    }

    let temp_dir = TempDir::new().unwrap();
    let store = Arc::new(DirSessionStore::new(temp_dir.path()));
    let collaborators = Collaborators {
        planner: Arc::new(FixedPlanner::new(signal_processing())),
        catalog: Arc::new(default_catalog()),
        playlists: Arc::new(FakePlaylists::default()),
        transcripts: Arc::new(FakeCaptions {
            missing: vec!["v2", "v4"],
        }),
        audio: Arc::new(NoAudio),
        recognizer: Arc::new(FakeWhisper),
    };
    let mut pipeline = Pipeline::new(store.clone(), collaborators, PipelineOptions::default());

    let report = pipeline.run(GOAL).await.unwrap();
    let log = transcript_log(&store, report.session.as_ref().unwrap()).await;

    assert_eq!(report.transcripts_primary, 2);
    assert_eq!(report.transcripts_fallback, 1);
    assert_eq!(report.transcripts_missing, 1);
    assert_eq!(
        log[1].transcript.as_ref().unwrap()[0].text,
        "whisper of /cache/audio.wav"
    );
    assert_eq!(log[3].video_id, "v4");
    assert_eq!(log[3].transcript, None);

    let raw = store
        .read_log(report.session.as_ref().unwrap(), TRANSCRIPT_LOG_KEY)
        .await
        .unwrap();
    assert_eq!(raw[3], json!({"video_id": "v4", "transcript": null}));
}

#[tokio::test]
async fn test_search_rerun_overwrites_documents() {
    let mut h = harness(
        default_catalog(),
        FakePlaylists::default(),
        FakeCaptions::default(),
        PipelineOptions::default(),
    );
    let first = h.pipeline.run(GOAL).await.unwrap();
    let session = first.session.clone().unwrap();
    let before = h.store.get(&session, "Sampling").await.unwrap();

    let second = h.pipeline.resume(session.clone(), GOAL, None).await.unwrap();
    let after = h.store.get(&session, "Sampling").await.unwrap();

    assert_eq!(before, after);
    assert_eq!(second.videos, first.videos);
    assert_eq!(second.skipped, 4);
    // syllabus, playlist and one topic document
    assert_eq!(h.store.list_keys(&session).await.unwrap().len(), 3);
    assert_eq!(transcript_log(&h.store, &session).await.len(), 4);
    assert_eq!(h.playlists.created.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_failed_query_keeps_other_results() {
    let catalog = FakeCatalog::new(&[("nyquist theorem", vec!["v1", "v2"])]);
    let (progress, mut events) = Progress::channel();
    let mut h = harness(
        catalog,
        FakePlaylists::default(),
        FakeCaptions::default(),
        PipelineOptions::default(),
    );
    h.pipeline = h.pipeline.with_progress(progress);

    let report = h.pipeline.run(GOAL).await.unwrap();
    let session = report.session.clone().unwrap();

    assert_eq!(report.failed_queries, 1);
    assert_eq!(report.videos, 2);
    let document = h.store.get(&session, "Sampling").await.unwrap().unwrap();
    assert_eq!(document.as_object().unwrap().len(), 2);

    let mut failed_paths = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let PipelineEvent::QueryFailed { path, .. } = event {
            failed_paths.push(path);
        }
    }
    assert_eq!(
        failed_paths,
        vec!["topics[0].subtopics[0].search_queries[1]"]
    );
}

#[tokio::test]
async fn test_playlist_failure_aborts_with_session() {
    let mut h = harness(
        default_catalog(),
        FakePlaylists {
            fail_create: true,
            ..Default::default()
        },
        FakeCaptions::default(),
        PipelineOptions::default(),
    );

    let err = h.pipeline.run(GOAL).await.unwrap_err();
    let session = err.session.clone().expect("session of aborted run");

    assert!(matches!(err.error, KairosError::PlaylistCreationFailed { .. }));
    let ids = VideoIdCollector::new(h.store.clone())
        .collect(Some(&session))
        .await
        .unwrap();
    assert_eq!(ids.len(), 4);
    assert!(transcript_log(&h.store, &session).await.is_empty());
}

#[tokio::test]
async fn test_resume_skips_planning() {
    let mut h = harness(
        default_catalog(),
        FakePlaylists::default(),
        FakeCaptions::default(),
        PipelineOptions::default(),
    );
    let session = SessionId::generate();
    h.store
        .put(
            &session,
            SYLLABUS_KEY,
            &serde_json::to_value(signal_processing()).unwrap(),
        )
        .await
        .unwrap();

    let report = h.pipeline.resume(session.clone(), GOAL, None).await.unwrap();

    assert_eq!(h.planner.calls.load(Ordering::SeqCst), 0);
    assert_eq!(report.session, Some(session));
    assert_eq!(report.attached, 4);
    assert_eq!(report.skipped, 0);
    assert_eq!(h.playlists.created.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_resume_with_given_playlist_creates_none() {
    let mut h = harness(
        default_catalog(),
        FakePlaylists::default(),
        FakeCaptions::default(),
        PipelineOptions::default(),
    );
    let session = SessionId::generate();
    h.store
        .put(
            &session,
            SYLLABUS_KEY,
            &serde_json::to_value(signal_processing()).unwrap(),
        )
        .await
        .unwrap();

    let report = h
        .pipeline
        .resume(session, GOAL, Some("PLearlier".to_string()))
        .await
        .unwrap();

    assert_eq!(report.playlist_id, "PLearlier");
    assert_eq!(h.playlists.created.load(Ordering::SeqCst), 0);
    assert!(
        h.playlists
            .attached
            .lock()
            .unwrap()
            .iter()
            .all(|(playlist, _)| playlist == "PLearlier")
    );
}

/// Captions that request shutdown while the first video is processed.
struct InterruptingCaptions {
    shutdown: broadcast::Sender<()>,
    fired: AtomicBool,
}

#[async_trait]
impl TranscriptService for InterruptingCaptions {
    async fn fetch(&self, video_id: &str) -> Result<Vec<Segment>> {
        if !self.fired.swap(true, Ordering::SeqCst) {
            let _ = self.shutdown.send(());
        }
        Ok(vec![Segment {
            start: 0.0,
            end: 1.0,
            text: format!("captions of {video_id}"),
        }])
    }
}

#[tokio::test]
async fn test_cancelled_run_resumes_without_repeating_work() {
    let temp_dir = TempDir::new().unwrap();
    let store = Arc::new(DirSessionStore::new(temp_dir.path()));
    let playlists = Arc::new(FakePlaylists::default());
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let collaborators = Collaborators {
        planner: Arc::new(FixedPlanner::new(signal_processing())),
        catalog: Arc::new(default_catalog()),
        playlists: playlists.clone(),
        transcripts: Arc::new(InterruptingCaptions {
            shutdown: shutdown_tx,
            fired: AtomicBool::new(false),
        }),
        audio: Arc::new(FakeAudio::default()),
        recognizer: Arc::new(FakeWhisper),
    };
    let mut pipeline = Pipeline::new(store.clone(), collaborators, PipelineOptions::default())
        .with_shutdown(shutdown_rx);

    let first = pipeline.run(GOAL).await.unwrap();
    let session = first.session.clone().unwrap();

    assert!(first.cancelled);
    assert_eq!(transcript_log(&store, &session).await.len(), 1);

    let resumed = pipeline.resume(session.clone(), GOAL, None).await.unwrap();

    assert!(!resumed.cancelled);
    assert_eq!(resumed.skipped, 1);
    assert_eq!(resumed.playlist_id, first.playlist_id);
    assert_eq!(playlists.created.load(Ordering::SeqCst), 1);

    let logged: Vec<_> = transcript_log(&store, &session)
        .await
        .into_iter()
        .map(|record| record.video_id)
        .collect();
    assert_eq!(logged, vec!["v1", "v2", "v3", "v4"]);

    let attached: Vec<_> = playlists
        .attached
        .lock()
        .unwrap()
        .iter()
        .map(|(_, video)| video.clone())
        .collect();
    assert_eq!(attached, vec!["v1", "v2", "v3", "v4"]);
}

#[tokio::test]
async fn test_ids_across_topics_are_not_deduplicated_by_default() {
    let mut syllabus = signal_processing();
    syllabus.topics.push(Topic {
        title: "Filters".to_string(),
        subtopics: vec![Subtopic {
            title: "FIR".to_string(),
            search_queries: vec!["fir filter".to_string()],
        }],
    });
    let catalog = FakeCatalog::new(&[
        ("nyquist theorem", vec!["v1", "v2", "v3"]),
        ("aliasing explained", vec!["v3", "v4"]),
        ("fir filter", vec!["v2", "v5"]),
    ]);

    for (dedup, expected) in [(false, 6), (true, 5)] {
        let temp_dir = TempDir::new().unwrap();
        let store = Arc::new(DirSessionStore::new(temp_dir.path()));
        let playlists = Arc::new(FakePlaylists::default());
        let collaborators = Collaborators {
            planner: Arc::new(FixedPlanner::new(syllabus.clone())),
            catalog: Arc::new(FakeCatalog {
                results: catalog.results.clone(),
            }),
            playlists: playlists.clone(),
            transcripts: Arc::new(FakeCaptions::default()),
            audio: Arc::new(FakeAudio::default()),
            recognizer: Arc::new(FakeWhisper),
        };
        let options = PipelineOptions {
            dedup_video_ids: dedup,
            ..Default::default()
        };
        let mut pipeline = Pipeline::new(store, collaborators, options);

        let report = pipeline.run(GOAL).await.unwrap();

        assert_eq!(report.videos, expected, "dedup = {dedup}");
        assert_eq!(playlists.attached.lock().unwrap().len(), expected);
    }
}

#[tokio::test]
async fn test_attach_failure_continues_run() {
    let mut h = harness(
        default_catalog(),
        FakePlaylists {
            reject: vec!["v2"],
            ..Default::default()
        },
        FakeCaptions::default(),
        PipelineOptions::default(),
    );

    let report = h.pipeline.run(GOAL).await.unwrap();
    let session = report.session.clone().unwrap();

    assert_eq!(report.attached, 3);
    assert_eq!(report.attach_failures, 1);
    let log = transcript_log(&h.store, &session).await;
    assert_eq!(log.len(), 4);
    assert!(log[1].transcript.is_some());
}
