use async_trait::async_trait;
use serde_json::{Value, json};

use crate::{
    backends::PlaylistPlatform,
    error::{KairosError, Result},
    types::{PlaylistSummary, Privacy},
};

const API_BASE: &str = "https://www.googleapis.com/youtube/v3";
pub const TOKEN_ENV_VAR: &str = "YOUTUBE_ACCESS_TOKEN";

/// YouTube Data API v3 playlists, authorized with an OAuth access token that
/// carries the `youtube.force-ssl` scope.
pub struct YouTubePlaylists {
    client: reqwest::Client,
    access_token: String,
}

impl YouTubePlaylists {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            access_token: access_token.into(),
        }
    }

    pub fn from_env() -> Result<Self> {
        let token = std::env::var(TOKEN_ENV_VAR)
            .ok()
            .filter(|token| !token.trim().is_empty())
            .ok_or_else(|| KairosError::MissingApiKey {
                env_var: TOKEN_ENV_VAR.to_string(),
            })?;
        Ok(Self::new(token))
    }

    /// POST a JSON body and return the parsed response, or the failure reason.
    async fn post(&self, url: &str, body: &Value) -> std::result::Result<Value, String> {
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.access_token)
            .json(body)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let status = response.status();
        let payload = response
            .json::<Value>()
            .await
            .map_err(|e| e.to_string())?;
        if !status.is_success() {
            return Err(format!("{status}: {}", api_error_message(&payload)));
        }
        Ok(payload)
    }
}

#[async_trait]
impl PlaylistPlatform for YouTubePlaylists {
    async fn create_playlist(
        &self,
        title: &str,
        description: &str,
        privacy: Privacy,
    ) -> Result<String> {
        let failed = |reason: String| KairosError::PlaylistCreationFailed {
            title: title.to_string(),
            reason,
        };

        let body = json!({
            "snippet": {
                "title": title,
                "description": description,
                "defaultLanguage": "en"
            },
            "status": {
                "privacyStatus": privacy.as_str()
            }
        });
        let response = self
            .post(&format!("{API_BASE}/playlists?part=snippet,status"), &body)
            .await
            .map_err(failed)?;

        let playlist_id = response["id"]
            .as_str()
            .ok_or_else(|| failed(format!("response has no playlist id: {response}")))?;

        tracing::info!(playlist_id, title, "playlist created");
        Ok(playlist_id.to_string())
    }

    async fn add_video(&self, playlist_id: &str, video_id: &str) -> Result<()> {
        let body = json!({
            "snippet": {
                "playlistId": playlist_id,
                "resourceId": {
                    "kind": "youtube#video",
                    "videoId": video_id
                }
            }
        });
        self.post(&format!("{API_BASE}/playlistItems?part=snippet"), &body)
            .await
            .map_err(|reason| KairosError::PlaylistAttachFailed {
                playlist_id: playlist_id.to_string(),
                video_id: video_id.to_string(),
                reason,
            })?;
        Ok(())
    }

    async fn list_playlists(&self, max_results: usize) -> Result<Vec<PlaylistSummary>> {
        let response = self
            .client
            .get(format!(
                "{API_BASE}/playlists?part=snippet,contentDetails&mine=true&maxResults={max_results}"
            ))
            .bearer_auth(&self.access_token)
            .send()
            .await?
            .error_for_status()?
            .json::<Value>()
            .await?;

        Ok(parse_playlists(&response))
    }
}

fn api_error_message(payload: &Value) -> String {
    payload["error"]["message"]
        .as_str()
        .map(str::to_string)
        .unwrap_or_else(|| payload.to_string())
}

pub fn parse_playlists(response: &Value) -> Vec<PlaylistSummary> {
    response["items"]
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| {
                    Some(PlaylistSummary {
                        id: item["id"].as_str()?.to_string(),
                        title: item["snippet"]["title"].as_str().unwrap_or_default().to_string(),
                        item_count: item["contentDetails"]["itemCount"].as_u64().unwrap_or(0),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}
