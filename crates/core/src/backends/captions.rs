use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use tokio::{fs, process::Command};

use crate::{
    backends::{TranscriptService, watch_url},
    cache::{find_captions_in_cache, get_media_dir},
    error::{KairosError, Result},
    types::Segment,
};

/// Tier A transcripts: the platform's own (manual or automatic) English
/// captions, fetched with yt-dlp in json3 form.
pub struct YtDlpCaptions {
    cache_dir: PathBuf,
}

impl YtDlpCaptions {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
        }
    }

    async fn download_captions(video_id: &str, media_dir: &Path) -> Result<()> {
        let output = Command::new("yt-dlp")
            .arg(watch_url(video_id))
            .arg("--skip-download")
            .arg("--write-subs")
            .arg("--write-auto-subs")
            .arg("--sub-langs")
            .arg("en.*,en")
            .arg("--sub-format")
            .arg("json3")
            .arg("-o")
            .arg(media_dir.join("captions.%(ext)s"))
            .output()
            .await?;

        if !output.status.success() {
            return Err(KairosError::TranscriptFetchFailed {
                video_id: video_id.to_string(),
                reason: String::from_utf8_lossy(&output.stderr).to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl TranscriptService for YtDlpCaptions {
    async fn fetch(&self, video_id: &str) -> Result<Vec<Segment>> {
        let media_dir = get_media_dir(&self.cache_dir, video_id);
        fs::create_dir_all(&media_dir).await?;

        let captions = match find_captions_in_cache(&media_dir) {
            Some(path) => path,
            None => {
                Self::download_captions(video_id, &media_dir).await?;
                find_captions_in_cache(&media_dir).ok_or_else(|| {
                    KairosError::TranscriptFetchFailed {
                        video_id: video_id.to_string(),
                        reason: "no English captions available".to_string(),
                    }
                })?
            }
        };

        let content = fs::read_to_string(&captions).await?;
        parse_json3(&content).map_err(|reason| KairosError::TranscriptFetchFailed {
            video_id: video_id.to_string(),
            reason,
        })
    }
}

#[derive(Deserialize)]
struct Json3 {
    #[serde(default)]
    events: Vec<Json3Event>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Json3Event {
    #[serde(default)]
    t_start_ms: u64,
    #[serde(default)]
    d_duration_ms: u64,
    #[serde(default)]
    segs: Vec<Json3Seg>,
}

#[derive(Deserialize)]
struct Json3Seg {
    #[serde(default)]
    utf8: String,
}

/// Convert a json3 caption track into segments.
///
/// Events without text (window setup, bare line breaks of rolling automatic
/// captions) are dropped. A track without any text is an error.
pub fn parse_json3(content: &str) -> std::result::Result<Vec<Segment>, String> {
    let track: Json3 = serde_json::from_str(content).map_err(|e| e.to_string())?;

    let segments: Vec<Segment> = track
        .events
        .into_iter()
        .filter_map(|event| {
            let text: String = event.segs.iter().map(|seg| seg.utf8.as_str()).collect();
            let text = text.replace('\n', " ").trim().to_string();
            if text.is_empty() {
                return None;
            }
            Some(Segment {
                start: event.t_start_ms as f64 / 1000.0,
                end: (event.t_start_ms + event.d_duration_ms) as f64 / 1000.0,
                text,
            })
        })
        .collect();

    if segments.is_empty() {
        return Err("caption track has no text".to_string());
    }
    Ok(segments)
}
