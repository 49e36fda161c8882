use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use async_trait::async_trait;
use tokio::{fs, process::Command};
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

use crate::{
    backends::{Recognition, RecognitionOptions, SpeechRecognizer, vad},
    cache::get_model_dir,
    error::{KairosError, Result},
    types::Segment,
};

pub const MODEL_NAME: &str = "ggml-medium-q5_0.bin";
const SAMPLE_RATE: u32 = 16_000;

/// Download the whisper model into the cache unless it is already there
pub async fn ensure_model(cache_dir: &Path) -> Result<PathBuf> {
    let download_url = format!(
        "https://huggingface.co/ggerganov/whisper.cpp/resolve/main/{}",
        MODEL_NAME
    );
    let model_dir = get_model_dir(cache_dir);

    if !model_dir.exists() {
        fs::create_dir_all(&model_dir).await?;
    }

    let model_path = model_dir.join(MODEL_NAME);
    if !model_path.exists() {
        let output = Command::new("curl")
            .arg("-fL")
            .arg(&download_url)
            .arg("-o")
            .arg(&model_path)
            .output()
            .await?;

        if !output.status.success() {
            let _ = fs::remove_file(&model_path).await;
            return Err(KairosError::ModelDownloadFailed {
                url: download_url,
                reason: String::from_utf8_lossy(&output.stderr).to_string(),
            });
        }
    }

    Ok(model_path)
}

/// Local speech recognition with whisper.cpp. The model is loaded once and
/// shared by every transcription.
pub struct WhisperRecognizer {
    ctx: Arc<WhisperContext>,
}

impl WhisperRecognizer {
    pub fn load(model_path: &Path) -> Result<Self> {
        let failed = |reason: String| KairosError::TranscriptFailed {
            audio_path: model_path.to_path_buf(),
            reason,
        };

        let model_path_str = model_path
            .to_str()
            .ok_or_else(|| failed("model path is not valid UTF-8".to_string()))?;
        let ctx_params = WhisperContextParameters {
            use_gpu: true,
            flash_attn: true,
            ..Default::default()
        };
        let ctx = WhisperContext::new_with_params(model_path_str, ctx_params)
            .map_err(|e| failed(format!("failed to load model: {e:?}")))?;

        Ok(Self { ctx: Arc::new(ctx) })
    }
}

#[async_trait]
impl SpeechRecognizer for WhisperRecognizer {
    async fn transcribe(
        &self,
        audio: &Path,
        options: &RecognitionOptions,
    ) -> Result<Recognition> {
        let ctx = Arc::clone(&self.ctx);
        let audio_path = audio.to_path_buf();
        let options = options.clone();

        tokio::task::spawn_blocking(move || run_whisper(&ctx, &audio_path, &options))
            .await
            .map_err(|e| KairosError::TranscriptFailed {
                audio_path: audio.to_path_buf(),
                reason: e.to_string(),
            })?
    }
}

fn read_samples(audio_path: &Path) -> std::result::Result<Vec<f32>, hound::Error> {
    let mut reader = hound::WavReader::open(audio_path)?;
    reader
        .samples::<i16>()
        .map(|s| s.map(|s| s as f32 / i16::MAX as f32))
        .collect()
}

fn run_whisper(
    ctx: &WhisperContext,
    audio_path: &Path,
    options: &RecognitionOptions,
) -> Result<Recognition> {
    let failed = |reason: String| KairosError::TranscriptFailed {
        audio_path: audio_path.to_path_buf(),
        reason,
    };

    let samples = read_samples(audio_path).map_err(|e| failed(e.to_string()))?;
    let samples = if options.vad_filter {
        vad::gate_silence(&samples, SAMPLE_RATE)
    } else {
        samples
    };

    let mut params = FullParams::new(SamplingStrategy::BeamSearch {
        beam_size: options.beam_size,
        patience: -1.0,
    });
    params.set_language(options.language.as_deref());
    params.set_token_timestamps(options.word_timestamps);
    params.set_split_on_word(options.word_timestamps);
    params.set_print_progress(false);
    params.set_print_realtime(false);
    params.set_print_special(false);
    params.set_print_timestamps(false);

    let mut state = ctx
        .create_state()
        .map_err(|e| failed(format!("failed to create state: {e:?}")))?;
    state
        .full(params, &samples)
        .map_err(|e| failed(format!("failed to run model: {e:?}")))?;

    let mut segments: Vec<Segment> = Vec::new();
    for segment in state.as_iter() {
        let seg_text = match segment.to_str() {
            Ok(s) => s,
            Err(_) => continue,
        };
        segments.push(Segment {
            start: segment.start_timestamp() as f64 / 100.0,
            end: segment.end_timestamp() as f64 / 100.0,
            text: seg_text.trim().to_string(),
        });
    }

    let language = match &options.language {
        Some(language) => language.clone(),
        None => {
            let language_index = state.full_lang_id_from_state();
            whisper_rs::get_lang_str(language_index)
                .unwrap_or("Unknown")
                .to_string()
        }
    };

    Ok(Recognition { segments, language })
}
