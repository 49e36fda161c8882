use serde_json::Value;

use crate::{
    error::{KairosError, Result},
    types::{ExpandedQuery, Syllabus},
};

impl Syllabus {
    /// Validate a raw syllabus document.
    pub fn from_value(value: Value) -> Result<Self> {
        serde_json::from_value(value).map_err(|e| KairosError::MalformedSyllabus {
            reason: e.to_string(),
        })
    }

    pub fn query_count(&self) -> usize {
        self.topics
            .iter()
            .flat_map(|topic| &topic.subtopics)
            .map(|subtopic| subtopic.search_queries.len())
            .sum()
    }
}

/// Flatten a syllabus into its search queries, depth first, in document order.
pub fn expand(syllabus: &Syllabus) -> Vec<ExpandedQuery> {
    let mut queries = Vec::with_capacity(syllabus.query_count());

    for (i, topic) in syllabus.topics.iter().enumerate() {
        for (j, subtopic) in topic.subtopics.iter().enumerate() {
            for (k, query) in subtopic.search_queries.iter().enumerate() {
                queries.push(ExpandedQuery {
                    topic_index: i,
                    topic_title: topic.title.clone(),
                    subtopic_index: j,
                    subtopic_title: subtopic.title.clone(),
                    query_index: k,
                    query: query.clone(),
                    path: format!("topics[{i}].subtopics[{j}].search_queries[{k}]"),
                });
            }
        }
    }

    queries
}

pub fn expand_document(document: &Value) -> Result<Vec<ExpandedQuery>> {
    let syllabus = Syllabus::from_value(document.clone())?;
    Ok(expand(&syllabus))
}
