use tokio::sync::mpsc;

use crate::{session::SessionId, transcript::Tier, types::Segment};

/// Things worth showing while a run is in flight.
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    Planned {
        session: SessionId,
        topics: usize,
        queries: usize,
    },
    QuerySearched {
        path: String,
        query: String,
        hits: usize,
    },
    QueryFailed {
        path: String,
        query: String,
        reason: String,
    },
    DocumentWritten {
        key: String,
        entries: usize,
    },
    IdsCollected {
        count: usize,
    },
    PlaylistCreated {
        playlist_id: String,
    },
    VideoStarted {
        index: usize,
        total: usize,
        video_id: String,
    },
    /// Already in the transcript log of a resumed session.
    VideoSkipped {
        video_id: String,
    },
    VideoAttached {
        video_id: String,
    },
    AttachFailed {
        video_id: String,
        reason: String,
    },
    /// Text produced by a transcript tier, as soon as it is available.
    TranscriptText {
        video_id: String,
        tier: Tier,
        segment: Segment,
    },
    TranscriptResolved {
        video_id: String,
        tier: Option<Tier>,
        segments: usize,
    },
    Cancelled {
        remaining: usize,
    },
}

/// Sending half of the progress channel. A silent handle drops everything.
#[derive(Clone, Default)]
pub struct Progress {
    tx: Option<mpsc::UnboundedSender<PipelineEvent>>,
}

impl Progress {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<PipelineEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    pub fn silent() -> Self {
        Self::default()
    }

    pub fn emit(&self, event: PipelineEvent) {
        if let Some(tx) = &self.tx {
            // receiver gone means nobody is watching
            let _ = tx.send(event);
        }
    }
}
