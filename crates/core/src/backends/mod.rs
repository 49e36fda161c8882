//! Collaborator contracts of the pipeline and their default implementations.

pub mod audio;
pub mod captions;
pub mod catalog;
pub mod planner;
pub mod playlist;
pub mod vad;
pub mod whisper;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;

use crate::{
    error::Result,
    session::SessionId,
    types::{PlaylistSummary, Privacy, Segment, Syllabus},
};

pub use audio::YtDlpAudio;
pub use captions::YtDlpCaptions;
pub use catalog::YtDlpCatalog;
pub use planner::LlmPlanner;
pub use playlist::YouTubePlaylists;
pub use whisper::WhisperRecognizer;

/// Turns a learning goal into a syllabus under a fresh session.
#[async_trait]
pub trait Planner: Send + Sync {
    async fn plan(&self, goal: &str) -> Result<(SessionId, Syllabus)>;
}

/// Video catalog search. Returns raw, un-normalized metadata entries.
#[async_trait]
pub trait CatalogSearch: Send + Sync {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<Value>>;
}

#[async_trait]
pub trait PlaylistPlatform: Send + Sync {
    async fn create_playlist(
        &self,
        title: &str,
        description: &str,
        privacy: Privacy,
    ) -> Result<String>;

    async fn add_video(&self, playlist_id: &str, video_id: &str) -> Result<()>;

    async fn list_playlists(&self, max_results: usize) -> Result<Vec<PlaylistSummary>>;
}

/// Primary (Tier A) transcript source.
#[async_trait]
pub trait TranscriptService: Send + Sync {
    async fn fetch(&self, video_id: &str) -> Result<Vec<Segment>>;
}

/// Produces a local 16 kHz mono WAV file for a video.
#[async_trait]
pub trait AudioSource: Send + Sync {
    async fn download(&self, video_id: &str) -> Result<PathBuf>;
}

#[async_trait]
pub trait SpeechRecognizer: Send + Sync {
    async fn transcribe(&self, audio: &Path, options: &RecognitionOptions)
    -> Result<Recognition>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecognitionOptions {
    pub beam_size: i32,
    pub language: Option<String>,
    pub vad_filter: bool,
    pub word_timestamps: bool,
}

impl Default for RecognitionOptions {
    fn default() -> Self {
        Self {
            beam_size: 5,
            language: Some("en".to_string()),
            vad_filter: true,
            word_timestamps: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Recognition {
    pub segments: Vec<Segment>,
    pub language: String,
}

pub fn watch_url(video_id: &str) -> String {
    format!("https://www.youtube.com/watch?v={video_id}")
}
