use std::sync::Arc;

use serde::Serialize;

use crate::{
    backends::{AudioSource, RecognitionOptions, SpeechRecognizer, TranscriptService},
    error::Result,
    progress::{PipelineEvent, Progress},
    types::Segment,
};

/// Which acquisition strategy produced a transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// The transcript service.
    Primary,
    /// Downloaded audio run through local speech recognition.
    Fallback,
}

impl Tier {
    pub fn label(&self) -> &'static str {
        match self {
            Tier::Primary => "captions",
            Tier::Fallback => "whisper",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TranscriptOutcome {
    Found { tier: Tier, segments: Vec<Segment> },
    NotFound,
}

impl TranscriptOutcome {
    pub fn tier(&self) -> Option<Tier> {
        match self {
            TranscriptOutcome::Found { tier, .. } => Some(*tier),
            TranscriptOutcome::NotFound => None,
        }
    }

    pub fn into_segments(self) -> Option<Vec<Segment>> {
        match self {
            TranscriptOutcome::Found { segments, .. } => Some(segments),
            TranscriptOutcome::NotFound => None,
        }
    }
}

/// Two-tier transcript acquisition. Never fails: a video nobody can
/// transcribe resolves to [`TranscriptOutcome::NotFound`].
pub struct TranscriptResolver {
    primary: Arc<dyn TranscriptService>,
    audio: Arc<dyn AudioSource>,
    recognizer: Arc<dyn SpeechRecognizer>,
    options: RecognitionOptions,
    progress: Progress,
}

impl TranscriptResolver {
    pub fn new(
        primary: Arc<dyn TranscriptService>,
        audio: Arc<dyn AudioSource>,
        recognizer: Arc<dyn SpeechRecognizer>,
    ) -> Self {
        Self {
            primary,
            audio,
            recognizer,
            options: RecognitionOptions::default(),
            progress: Progress::silent(),
        }
    }

    pub fn with_options(mut self, options: RecognitionOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_progress(mut self, progress: Progress) -> Self {
        self.progress = progress;
        self
    }

    pub async fn resolve(&self, video_id: &str) -> TranscriptOutcome {
        match self.primary.fetch(video_id).await {
            Ok(segments) => {
                return self.found(video_id, Tier::Primary, segments);
            }
            Err(e) => {
                tracing::debug!(video_id, error = %e, "primary transcript unavailable, falling back");
            }
        }

        match self.recognize(video_id).await {
            Ok(segments) => self.found(video_id, Tier::Fallback, segments),
            Err(e) => {
                tracing::warn!(video_id, error = %e, "no transcript for video");
                self.progress.emit(PipelineEvent::TranscriptResolved {
                    video_id: video_id.to_string(),
                    tier: None,
                    segments: 0,
                });
                TranscriptOutcome::NotFound
            }
        }
    }

    async fn recognize(&self, video_id: &str) -> Result<Vec<Segment>> {
        let audio = self.audio.download(video_id).await?;
        let recognition = self.recognizer.transcribe(&audio, &self.options).await?;

        tracing::debug!(
            video_id,
            language = %recognition.language,
            segments = recognition.segments.len(),
            "audio transcribed"
        );
        Ok(recognition.segments)
    }

    fn found(&self, video_id: &str, tier: Tier, segments: Vec<Segment>) -> TranscriptOutcome {
        for segment in &segments {
            self.progress.emit(PipelineEvent::TranscriptText {
                video_id: video_id.to_string(),
                tier,
                segment: segment.clone(),
            });
        }
        self.progress.emit(PipelineEvent::TranscriptResolved {
            video_id: video_id.to_string(),
            tier: Some(tier),
            segments: segments.len(),
        });

        TranscriptOutcome::Found { tier, segments }
    }
}
