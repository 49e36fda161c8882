//! End-to-end run: goal → syllabus → search → ids → playlist → transcripts.
//!
//! Every step is sequential. Per-item failures (one query, one attach, one
//! transcript) are logged and skipped; anything else aborts the run with the
//! session id attached so it can be resumed.

use std::{collections::HashMap, sync::Arc};

use serde::Serialize;
use serde_json::{Value, json};
use tokio::sync::broadcast::{self, error::TryRecvError};

use crate::{
    backends::{
        AudioSource, CatalogSearch, Planner, PlaylistPlatform, SpeechRecognizer,
        TranscriptService,
    },
    collect::{VideoIdCollector, dedup_preserving_order},
    error::{KairosError, RunAborted},
    progress::{PipelineEvent, Progress},
    query::expand,
    search::{DEFAULT_MAX_RESULTS, VideoSearch},
    session::SessionId,
    store::{PLAYLIST_KEY, SYLLABUS_KEY, SessionStore, TRANSCRIPT_LOG_KEY},
    transcript::{Tier, TranscriptResolver},
    types::{Privacy, Syllabus, TranscriptRecord},
};

pub const DEFAULT_PLAYLIST_DESCRIPTION: &str = "Created with Kairos-AI";

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub max_results: usize,
    pub dedup_video_ids: bool,
    pub privacy: Privacy,
    pub description: String,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            max_results: DEFAULT_MAX_RESULTS,
            dedup_video_ids: false,
            privacy: Privacy::Private,
            description: DEFAULT_PLAYLIST_DESCRIPTION.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub session: Option<SessionId>,
    pub location: String,
    pub playlist_id: String,
    pub videos: usize,
    pub attached: usize,
    pub attach_failures: usize,
    pub transcripts_primary: usize,
    pub transcripts_fallback: usize,
    pub transcripts_missing: usize,
    /// Videos a resumed run found already logged.
    pub skipped: usize,
    pub failed_queries: usize,
    pub cancelled: bool,
}

/// External services a run talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub planner: Arc<dyn Planner>,
    pub catalog: Arc<dyn CatalogSearch>,
    pub playlists: Arc<dyn PlaylistPlatform>,
    pub transcripts: Arc<dyn TranscriptService>,
    pub audio: Arc<dyn AudioSource>,
    pub recognizer: Arc<dyn SpeechRecognizer>,
}

/// What an earlier run of the same session left behind.
#[derive(Debug, Default)]
struct PriorWork {
    playlist_id: Option<String>,
    logged: HashMap<String, usize>,
}

pub struct Pipeline {
    store: Arc<dyn SessionStore>,
    planner: Arc<dyn Planner>,
    catalog: Arc<dyn CatalogSearch>,
    playlists: Arc<dyn PlaylistPlatform>,
    resolver: TranscriptResolver,
    options: PipelineOptions,
    progress: Progress,
    shutdown: Option<broadcast::Receiver<()>>,
}

impl Pipeline {
    pub fn new(
        store: Arc<dyn SessionStore>,
        collaborators: Collaborators,
        options: PipelineOptions,
    ) -> Self {
        let Collaborators {
            planner,
            catalog,
            playlists,
            transcripts,
            audio,
            recognizer,
        } = collaborators;

        Self {
            store,
            planner,
            catalog,
            playlists,
            resolver: TranscriptResolver::new(transcripts, audio, recognizer),
            options,
            progress: Progress::silent(),
            shutdown: None,
        }
    }

    pub fn with_progress(mut self, progress: Progress) -> Self {
        self.resolver = self.resolver.with_progress(progress.clone());
        self.progress = progress;
        self
    }

    /// Stop between videos once anything is sent on `shutdown`.
    pub fn with_shutdown(mut self, shutdown: broadcast::Receiver<()>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    pub async fn run(&mut self, goal: &str) -> Result<RunReport, RunAborted> {
        let goal = goal.trim();
        if goal.is_empty() {
            return Err(RunAborted::new(None, KairosError::EmptyGoal));
        }

        let (session, syllabus) = self
            .planner
            .plan(goal)
            .await
            .map_err(|e| RunAborted::new(None, e))?;
        tracing::info!(session = %session, topics = syllabus.topics.len(), "goal planned");

        let document = serde_json::to_value(&syllabus)
            .map_err(|e| RunAborted::new(Some(session.clone()), e.into()))?;
        self.store
            .put(&session, SYLLABUS_KEY, &document)
            .await
            .map_err(|e| RunAborted::new(Some(session.clone()), e))?;

        self.execute(session, &syllabus, goal, PriorWork::default())
            .await
    }

    /// Continue a session whose syllabus was persisted by an earlier run.
    ///
    /// Videos already in the session's transcript log are skipped and the
    /// session's playlist is reused. `playlist_id` overrides the stored one.
    pub async fn resume(
        &mut self,
        session: SessionId,
        goal: &str,
        playlist_id: Option<String>,
    ) -> Result<RunReport, RunAborted> {
        let goal = goal.trim();
        if goal.is_empty() {
            return Err(RunAborted::new(Some(session), KairosError::EmptyGoal));
        }

        let loaded = match self.store.get(&session, SYLLABUS_KEY).await {
            Ok(Some(document)) => Syllabus::from_value(document),
            Ok(None) => Err(KairosError::MissingSyllabus {
                session: session.clone(),
            }),
            Err(e) => Err(e),
        };
        let syllabus = match loaded {
            Ok(syllabus) => syllabus,
            Err(e) => return Err(RunAborted::new(Some(session), e)),
        };

        let mut prior = match self.prior_work(&session).await {
            Ok(prior) => prior,
            Err(e) => return Err(RunAborted::new(Some(session), e)),
        };
        if playlist_id.is_some() {
            prior.playlist_id = playlist_id;
        }

        tracing::info!(
            session = %session,
            logged = prior.logged.values().sum::<usize>(),
            playlist_id = prior.playlist_id.as_deref().unwrap_or("-"),
            "resuming session"
        );
        self.execute(session, &syllabus, goal, prior).await
    }

    async fn prior_work(&self, session: &SessionId) -> crate::error::Result<PriorWork> {
        let playlist_id = self
            .store
            .get(session, PLAYLIST_KEY)
            .await?
            .and_then(|document| document["id"].as_str().map(str::to_string));

        let mut logged: HashMap<String, usize> = HashMap::new();
        for record in self.store.read_log(session, TRANSCRIPT_LOG_KEY).await? {
            if let Some(video_id) = record.get("video_id").and_then(Value::as_str) {
                *logged.entry(video_id.to_string()).or_default() += 1;
            }
        }

        Ok(PriorWork {
            playlist_id,
            logged,
        })
    }

    async fn create_playlist(&self, session: &SessionId, goal: &str) -> crate::error::Result<String> {
        let playlist_id = self
            .playlists
            .create_playlist(goal, &self.options.description, self.options.privacy)
            .await
            .map_err(|e| match e {
                e @ KairosError::PlaylistCreationFailed { .. } => e,
                other => KairosError::PlaylistCreationFailed {
                    title: goal.to_string(),
                    reason: other.to_string(),
                },
            })?;

        self.store
            .put(session, PLAYLIST_KEY, &json!({"id": playlist_id, "title": goal}))
            .await?;
        tracing::info!(session = %session, playlist_id = %playlist_id, "playlist created");
        Ok(playlist_id)
    }

    async fn execute(
        &mut self,
        session: SessionId,
        syllabus: &Syllabus,
        goal: &str,
        prior: PriorWork,
    ) -> Result<RunReport, RunAborted> {
        let abort = |error: KairosError| RunAborted::new(Some(session.clone()), error);

        let queries = expand(syllabus);
        self.progress.emit(PipelineEvent::Planned {
            session: session.clone(),
            topics: syllabus.topics.len(),
            queries: queries.len(),
        });

        let summary = VideoSearch::new(self.catalog.clone(), self.store.clone())
            .with_max_results(self.options.max_results)
            .with_progress(self.progress.clone())
            .run(&session, &queries)
            .await
            .map_err(abort)?;

        let mut ids = VideoIdCollector::new(self.store.clone())
            .collect(Some(&session))
            .await
            .map_err(abort)?;
        if self.options.dedup_video_ids {
            ids = dedup_preserving_order(ids);
        }
        self.progress
            .emit(PipelineEvent::IdsCollected { count: ids.len() });

        let playlist_id = match prior.playlist_id {
            Some(playlist_id) => {
                tracing::info!(session = %session, playlist_id = %playlist_id, "reusing playlist");
                playlist_id
            }
            None => self.create_playlist(&session, goal).await.map_err(abort)?,
        };
        self.progress.emit(PipelineEvent::PlaylistCreated {
            playlist_id: playlist_id.clone(),
        });

        let mut report = RunReport {
            session: Some(session.clone()),
            location: summary.location,
            playlist_id: playlist_id.clone(),
            videos: ids.len(),
            failed_queries: summary.failed_queries,
            ..Default::default()
        };

        // one log record covers one occurrence of its id
        let mut logged = prior.logged;
        let total = ids.len();
        for (index, video_id) in ids.iter().enumerate() {
            if self.cancel_requested() {
                let remaining = total - index;
                tracing::warn!(session = %session, remaining, "run cancelled");
                self.progress.emit(PipelineEvent::Cancelled { remaining });
                report.cancelled = true;
                break;
            }

            if let Some(count) = logged.get_mut(video_id) {
                *count -= 1;
                if *count == 0 {
                    logged.remove(video_id);
                }
                report.skipped += 1;
                self.progress.emit(PipelineEvent::VideoSkipped {
                    video_id: video_id.clone(),
                });
                continue;
            }

            self.progress.emit(PipelineEvent::VideoStarted {
                index,
                total,
                video_id: video_id.clone(),
            });
            match self.playlists.add_video(&playlist_id, video_id).await {
                Ok(()) => {
                    report.attached += 1;
                    self.progress.emit(PipelineEvent::VideoAttached {
                        video_id: video_id.clone(),
                    });
                }
                Err(e) => {
                    report.attach_failures += 1;
                    tracing::warn!(
                        session = %session,
                        playlist_id = %playlist_id,
                        video_id = %video_id,
                        error = %e,
                        "could not add video to playlist"
                    );
                    self.progress.emit(PipelineEvent::AttachFailed {
                        video_id: video_id.clone(),
                        reason: e.to_string(),
                    });
                }
            }

            let outcome = self.resolver.resolve(video_id).await;
            match outcome.tier() {
                Some(Tier::Primary) => report.transcripts_primary += 1,
                Some(Tier::Fallback) => report.transcripts_fallback += 1,
                None => report.transcripts_missing += 1,
            }

            let record = TranscriptRecord {
                video_id: video_id.clone(),
                transcript: outcome.into_segments(),
            };
            let record = serde_json::to_value(&record).map_err(|e| abort(e.into()))?;
            self.store
                .append(&session, TRANSCRIPT_LOG_KEY, &record)
                .await
                .map_err(abort)?;
        }

        tracing::info!(
            session = %session,
            videos = report.videos,
            skipped = report.skipped,
            attached = report.attached,
            transcripts_missing = report.transcripts_missing,
            cancelled = report.cancelled,
            "run finished"
        );
        Ok(report)
    }

    fn cancel_requested(&mut self) -> bool {
        let Some(shutdown) = self.shutdown.as_mut() else {
            return false;
        };
        match shutdown.try_recv() {
            Ok(()) | Err(TryRecvError::Lagged(_)) => true,
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => false,
        }
    }
}
