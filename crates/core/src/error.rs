use std::path::PathBuf;

use thiserror::Error;

use crate::session::SessionId;

#[derive(Error, Debug)]
pub enum KairosError {
    #[error("Learning goal is empty")]
    EmptyGoal,

    #[error("Malformed syllabus: {reason}")]
    MalformedSyllabus { reason: String },

    #[error("Session {session} has no syllabus document")]
    MissingSyllabus { session: SessionId },

    #[error("Invalid session id {0:?}")]
    InvalidSessionId(String),

    #[error("Planning failed: {reason}")]
    PlanningFailed { reason: String },

    #[error("Catalog search failed for {query:?}: {reason}")]
    CatalogSearchFailed { query: String, reason: String },

    #[error("Corrupt session document {path}: {reason}")]
    CorruptSessionDocument { path: PathBuf, reason: String },

    #[error("Playlist creation failed for {title:?}: {reason}")]
    PlaylistCreationFailed { title: String, reason: String },

    #[error("Adding {video_id} to playlist {playlist_id} failed: {reason}")]
    PlaylistAttachFailed {
        playlist_id: String,
        video_id: String,
        reason: String,
    },

    #[error("Transcript fetch failed for {video_id}: {reason}")]
    TranscriptFetchFailed { video_id: String, reason: String },

    #[error("Download failed for {url}: {reason}")]
    DownloadFailed { url: String, reason: String },

    #[error("Audio extraction failed for {video_path}: {reason}")]
    AudioExtractionFailed { video_path: PathBuf, reason: String },

    #[error("Transcription failed for {audio_path}: {reason}")]
    TranscriptFailed { audio_path: PathBuf, reason: String },

    #[error("Model download failed from {url}: {reason}")]
    ModelDownloadFailed { url: String, reason: String },

    #[error("Missing API key: {env_var} environment variable is not set")]
    MissingApiKey { env_var: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("API request failed: {0}")]
    ApiError(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, KairosError>;

/// A fatal pipeline error, tagged with the session it happened in so the run
/// can be resumed from the session store.
#[derive(Error, Debug)]
#[error("Run aborted: {error}")]
pub struct RunAborted {
    pub session: Option<SessionId>,
    #[source]
    pub error: KairosError,
}

impl RunAborted {
    pub fn new(session: Option<SessionId>, error: KairosError) -> Self {
        Self { session, error }
    }
}
