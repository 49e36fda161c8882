use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::{fs, process::Command};

use crate::{
    backends::{AudioSource, watch_url},
    cache::{get_audio_path, get_media_dir},
    error::{KairosError, Result},
};

/// Downloads the best audio stream with yt-dlp and converts it to the
/// 16 kHz mono WAV whisper expects. Converted audio is cached per video.
pub struct YtDlpAudio {
    cache_dir: PathBuf,
}

impl YtDlpAudio {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
        }
    }

    async fn download_source(url: &str, media_dir: &Path) -> Result<PathBuf> {
        let output_template = media_dir.join("source.%(ext)s");
        let output = Command::new("yt-dlp")
            .arg(url)
            .arg("--print")
            .arg("after_move:filepath")
            .arg("--extractor-args")
            .arg("youtube:player_client=android,web")
            .arg("--no-playlist")
            .arg("-f")
            .arg("bestaudio/best")
            .arg("-o")
            .arg(&output_template)
            .output()
            .await?;

        if !output.status.success() {
            return Err(KairosError::DownloadFailed {
                url: url.to_string(),
                reason: String::from_utf8_lossy(&output.stderr).to_string(),
            });
        }

        let stdout_str = String::from_utf8_lossy(output.stdout.as_slice());
        Ok(PathBuf::from(stdout_str.trim()))
    }

    async fn extract_audio(source_path: &Path, audio_path: &Path) -> Result<()> {
        let output = Command::new("ffmpeg")
            .arg("-y")
            .arg("-i")
            .arg(source_path)
            .arg("-vn")
            .arg("-acodec")
            .arg("pcm_s16le")
            .arg("-ar")
            .arg("16000")
            .arg("-ac")
            .arg("1")
            .arg(audio_path)
            .output()
            .await?;

        if !output.status.success() {
            return Err(KairosError::AudioExtractionFailed {
                video_path: source_path.to_path_buf(),
                reason: String::from_utf8_lossy(&output.stderr).to_string(),
            });
        }

        Ok(())
    }
}

#[async_trait]
impl AudioSource for YtDlpAudio {
    async fn download(&self, video_id: &str) -> Result<PathBuf> {
        let media_dir = get_media_dir(&self.cache_dir, video_id);
        let audio_path = get_audio_path(&media_dir);
        if audio_path.exists() {
            tracing::debug!(video_id, path = %audio_path.display(), "using cached audio");
            return Ok(audio_path);
        }

        fs::create_dir_all(&media_dir).await?;
        let source = Self::download_source(&watch_url(video_id), &media_dir).await?;
        Self::extract_audio(&source, &audio_path).await?;

        if let Err(e) = fs::remove_file(&source).await {
            tracing::debug!(path = %source.display(), error = %e, "could not remove source audio");
        }

        Ok(audio_path)
    }
}
