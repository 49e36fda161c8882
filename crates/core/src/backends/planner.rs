use async_trait::async_trait;
use serde_json::Value;

use crate::{
    backends::Planner,
    error::{KairosError, Result},
    provider::Provider,
    session::SessionId,
    types::Syllabus,
};

static SYLLABUS_PROMPT: &str = r#"
  You are a curriculum designer. The user describes what they want to learn.

  TASK:
  1. Break the goal into 3-6 topics, ordered from fundamentals to advanced material
  2. Split every topic into 2-4 subtopics
  3. For every subtopic write 2-3 YouTube search queries that would surface good
     lecture or tutorial videos for it

  OUTPUT: Return ONLY valid JSON (no markdown, no explanation):
  {
    "title": "Course title",
    "description": "One or two sentences on what the course covers",
    "topics": [
      {
        "title": "Topic title",
        "subtopics": [
          {
            "title": "Subtopic title",
            "search_queries": ["query 1", "query 2"]
          }
        ]
      }
    ]
  }

  RULES:
  - Queries are plain search phrases, no quotes or operators
  - Topic titles are short and unique
"#;

/// Syllabus planning through an OpenAI-compatible chat completion endpoint.
pub struct LlmPlanner {
    provider: Provider,
    api_key: String,
    model: Option<String>,
    client: reqwest::Client,
}

impl LlmPlanner {
    pub fn new(provider: Provider) -> Result<Self> {
        let api_key = provider.validate_api_key()?;
        Ok(Self {
            provider,
            api_key,
            model: None,
            client: reqwest::Client::new(),
        })
    }

    /// Ask for `model` instead of the provider's default one.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        let model = model.into();
        if !model.trim().is_empty() {
            self.model = Some(model.trim().to_string());
        }
        self
    }

    pub fn provider(&self) -> &Provider {
        &self.provider
    }

    pub fn model(&self) -> &str {
        self.model
            .as_deref()
            .unwrap_or(self.provider.config().model)
    }

    async fn complete(&self, goal: &str) -> std::result::Result<String, String> {
        let config = self.provider.config();
        let response = self
            .client
            .post(config.api_url)
            .header("Content-Type", "application/json")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&serde_json::json!({
                "model": self.model(),
                "messages": [
                    {
                        "role": "system",
                        "content": SYLLABUS_PROMPT,
                    },
                    {
                        "role": "user",
                        "content": goal,
                    },
                ],
                "temperature": 0.3,
            }))
            .send()
            .await
            .map_err(|e| e.to_string())?
            .json::<Value>()
            .await
            .map_err(|e| e.to_string())?;

        response["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| format!("Invalid API response: {:?}", response))
    }
}

#[async_trait]
impl Planner for LlmPlanner {
    async fn plan(&self, goal: &str) -> Result<(SessionId, Syllabus)> {
        let content = self
            .complete(goal)
            .await
            .map_err(|reason| KairosError::PlanningFailed { reason })?;
        let syllabus = parse_syllabus_reply(&content)?;

        let session = SessionId::generate();
        tracing::info!(
            session = %session,
            provider = self.provider.name(),
            model = self.model(),
            topics = syllabus.topics.len(),
            "syllabus planned"
        );
        Ok((session, syllabus))
    }
}

/// Parse the model reply, tolerating a surrounding markdown code fence.
pub fn parse_syllabus_reply(content: &str) -> Result<Syllabus> {
    let trimmed = content.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .unwrap_or(trimmed);

    let document: Value =
        serde_json::from_str(body.trim()).map_err(|e| KairosError::MalformedSyllabus {
            reason: format!("reply is not JSON: {e}"),
        })?;
    Syllabus::from_value(document)
}
