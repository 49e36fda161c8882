use std::{collections::HashSet, path::PathBuf, sync::Arc};

use serde_json::Value;

use crate::{
    error::{KairosError, Result},
    session::SessionId,
    store::{PLAYLIST_KEY, SYLLABUS_KEY, SessionStore},
};

/// Flattens the video ids of stored topic documents.
///
/// Ids are not deduplicated: a video found under two topics shows up twice.
pub struct VideoIdCollector {
    store: Arc<dyn SessionStore>,
}

impl VideoIdCollector {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self { store }
    }

    /// Ids of one session, or of every UUID-named session when `None`.
    pub async fn collect(&self, session: Option<&SessionId>) -> Result<Vec<String>> {
        if let Some(session) = session {
            return self.collect_session(session).await;
        }

        let mut ids = Vec::new();
        for name in self.store.list_sessions().await? {
            let Ok(session) = SessionId::new(name) else {
                continue;
            };
            if !session.is_uuid() {
                tracing::debug!(session = %session, "skipping non-session directory");
                continue;
            }
            ids.extend(self.collect_session(&session).await?);
        }
        Ok(ids)
    }

    async fn collect_session(&self, session: &SessionId) -> Result<Vec<String>> {
        let mut ids = Vec::new();

        for key in self.store.list_keys(session).await? {
            if key == SYLLABUS_KEY || key == PLAYLIST_KEY {
                continue;
            }
            let Some(document) = self.store.get(session, &key).await? else {
                continue;
            };
            let Value::Object(entries) = document else {
                return Err(KairosError::CorruptSessionDocument {
                    path: PathBuf::from(self.store.location(session)).join(format!("{key}.json")),
                    reason: "expected an object keyed by video id".to_string(),
                });
            };
            ids.extend(entries.keys().cloned());
        }

        tracing::debug!(session = %session, count = ids.len(), "video ids collected");
        Ok(ids)
    }
}

/// Drop repeated ids, keeping the first occurrence.
pub fn dedup_preserving_order(ids: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    ids.into_iter().filter(|id| seen.insert(id.clone())).collect()
}
