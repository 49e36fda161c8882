use std::sync::Arc;

use serde_json::{Map, Value};

use crate::{
    backends::CatalogSearch,
    error::{KairosError, Result},
    progress::{PipelineEvent, Progress},
    session::SessionId,
    store::{SessionStore, topic_key},
    types::{ExpandedQuery, VideoRecord},
};

pub const DEFAULT_MAX_RESULTS: usize = 5;

const RECORD_FIELDS: [&str; 9] = [
    "title",
    "url",
    "description",
    "duration",
    "channel",
    "channel_url",
    "uploader",
    "uploader_url",
    "view_count",
];

#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub id: String,
    pub record: VideoRecord,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TopicDocument {
    pub key: String,
    pub entries: usize,
}

#[derive(Debug, Clone)]
pub struct SearchSummary {
    pub location: String,
    pub documents: Vec<TopicDocument>,
    pub failed_queries: usize,
}

/// Normalize one raw catalog entry. Entries missing any expected field are
/// rejected; fields that are present but `null` are kept as such.
pub fn normalize_entry(entry: &Value) -> Option<SearchHit> {
    let object = entry.as_object()?;
    let id = object.get("id")?.as_str()?.to_string();

    let mut fields = Map::new();
    for field in RECORD_FIELDS {
        fields.insert(field.to_string(), object.get(field)?.clone());
    }
    let record = serde_json::from_value(Value::Object(fields)).ok()?;

    Some(SearchHit { id, record })
}

/// Runs every expanded query against the catalog and stores one result
/// document per topic.
pub struct VideoSearch {
    catalog: Arc<dyn CatalogSearch>,
    store: Arc<dyn SessionStore>,
    max_results: usize,
    progress: Progress,
}

impl VideoSearch {
    pub fn new(catalog: Arc<dyn CatalogSearch>, store: Arc<dyn SessionStore>) -> Self {
        Self {
            catalog,
            store,
            max_results: DEFAULT_MAX_RESULTS,
            progress: Progress::silent(),
        }
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }

    pub fn with_progress(mut self, progress: Progress) -> Self {
        self.progress = progress;
        self
    }

    pub async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>> {
        let entries = self
            .catalog
            .search(query, max_results)
            .await
            .map_err(|e| match e {
                e @ KairosError::CatalogSearchFailed { .. } => e,
                other => KairosError::CatalogSearchFailed {
                    query: query.to_string(),
                    reason: other.to_string(),
                },
            })?;

        let hits = entries
            .iter()
            .filter_map(|entry| {
                let hit = normalize_entry(entry);
                if hit.is_none() {
                    tracing::debug!(query, entry = %entry, "skipping incomplete catalog entry");
                }
                hit
            })
            .collect();
        Ok(hits)
    }

    pub async fn run(
        &self,
        session: &SessionId,
        queries: &[ExpandedQuery],
    ) -> Result<SearchSummary> {
        let mut documents: Vec<(String, Map<String, Value>)> = Vec::new();
        let mut failed_queries = 0;

        for query in queries {
            let key = topic_key(&query.topic_title);
            let index = match documents.iter().position(|(k, _)| *k == key) {
                Some(index) => index,
                None => {
                    documents.push((key, Map::new()));
                    documents.len() - 1
                }
            };

            match self.search(&query.query, self.max_results).await {
                Ok(hits) => {
                    self.progress.emit(PipelineEvent::QuerySearched {
                        path: query.path.clone(),
                        query: query.query.clone(),
                        hits: hits.len(),
                    });
                    let document = &mut documents[index].1;
                    for hit in hits {
                        document.insert(hit.id, serde_json::to_value(&hit.record)?);
                    }
                }
                Err(e) => {
                    failed_queries += 1;
                    tracing::warn!(
                        session = %session,
                        path = %query.path,
                        error = %e,
                        "catalog search failed, continuing without results"
                    );
                    self.progress.emit(PipelineEvent::QueryFailed {
                        path: query.path.clone(),
                        query: query.query.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        let mut written = Vec::with_capacity(documents.len());
        for (key, document) in documents {
            let entries = document.len();
            self.store
                .put(session, &key, &Value::Object(document))
                .await?;
            self.progress.emit(PipelineEvent::DocumentWritten {
                key: key.clone(),
                entries,
            });
            written.push(TopicDocument { key, entries });
        }

        tracing::info!(
            session = %session,
            documents = written.len(),
            failed_queries,
            "search results stored"
        );
        Ok(SearchSummary {
            location: self.store.location(session),
            documents: written,
            failed_queries,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry(id: &str) -> Value {
        json!({
            "id": id,
            "title": format!("Video {id}"),
            "url": format!("https://www.youtube.com/watch?v={id}"),
            "description": null,
            "duration": 615.0,
            "channel": "3Blue1Brown",
            "channel_url": "https://www.youtube.com/channel/UCYO_jab_esuFRV4b17AJtAw",
            "uploader": "3Blue1Brown",
            "uploader_url": "https://www.youtube.com/@3blue1brown",
            "view_count": 1200345,
            "ie_key": "Youtube"
        })
    }

    #[test]
    fn test_normalize_complete_entry() {
        let hit = normalize_entry(&entry("abc")).unwrap();

        assert_eq!(hit.id, "abc");
        assert_eq!(hit.record.title, "Video abc");
        assert_eq!(hit.record.description, None);
        assert_eq!(hit.record.duration, Some(615.0));
        assert_eq!(hit.record.view_count, Some(1200345));
    }

    #[test]
    fn test_normalize_rejects_missing_fields() {
        let mut missing_channel = entry("abc");
        missing_channel.as_object_mut().unwrap().remove("channel");
        let mut null_title = entry("abc");
        null_title["title"] = Value::Null;
        let mut numeric_id = entry("abc");
        numeric_id["id"] = json!(7);

        assert!(normalize_entry(&missing_channel).is_none());
        assert!(normalize_entry(&null_title).is_none());
        assert!(normalize_entry(&numeric_id).is_none());
        assert!(normalize_entry(&json!("abc")).is_none());
    }

    #[test]
    fn test_normalized_record_has_exact_schema() {
        let hit = normalize_entry(&entry("abc")).unwrap();
        let value = serde_json::to_value(&hit.record).unwrap();
        let keys: Vec<_> = value.as_object().unwrap().keys().cloned().collect();

        assert_eq!(keys, RECORD_FIELDS.to_vec());
    }
}
