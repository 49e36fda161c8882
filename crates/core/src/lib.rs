//! Kairos core: turns a learning goal into a searched, collected and
//! transcribed playlist, persisting every intermediate document per session.

pub mod backends;
pub mod cache;
pub mod collect;
pub mod error;
pub mod format;
pub mod pipeline;
pub mod progress;
pub mod provider;
pub mod query;
pub mod search;
pub mod session;
pub mod store;
pub mod transcript;
pub mod types;

pub use cache::{get_audio_path, get_media_dir, get_model_dir, get_root_cache_dir};
pub use collect::{VideoIdCollector, dedup_preserving_order};
pub use error::{KairosError, Result, RunAborted};
pub use format::{format_segment, format_timestamp, format_transcript_with_timestamps};
pub use pipeline::{Collaborators, Pipeline, PipelineOptions, RunReport};
pub use progress::{PipelineEvent, Progress};
pub use provider::{Provider, ProviderConfig};
pub use query::{expand, expand_document};
pub use search::{SearchHit, SearchSummary, VideoSearch};
pub use session::SessionId;
pub use store::{DirSessionStore, SessionStore, topic_key};
pub use transcript::{Tier, TranscriptOutcome, TranscriptResolver};
pub use types::{
    ExpandedQuery, PlaylistSummary, Privacy, Segment, Syllabus, Topic, Subtopic,
    TranscriptRecord, VideoRecord,
};
