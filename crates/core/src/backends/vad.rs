//! Energy based voice-activity gate.
//!
//! Frames that carry no speech energy are zeroed before decoding so the
//! recognizer does not hallucinate text into silence or background hum.
//! Sample count is preserved, so segment timestamps stay aligned with the
//! original audio.

pub const FRAME_MS: usize = 30;

/// Absolute floor under which a frame is never speech.
const MIN_SPEECH_RMS: f32 = 0.01;
/// Speech must be this many times louder than the noise floor.
const NOISE_RATIO: f32 = 3.0;
/// ...but never needs to be louder than this share of the loudest frame.
const PEAK_RATIO: f32 = 0.5;
/// Frames kept on either side of detected speech.
const HANGOVER_FRAMES: usize = 10;

pub fn gate_silence(samples: &[f32], sample_rate: u32) -> Vec<f32> {
    let frame_len = (sample_rate as usize * FRAME_MS / 1000).max(1);
    let energies: Vec<f32> = samples.chunks(frame_len).map(rms).collect();
    if energies.is_empty() {
        return Vec::new();
    }

    let mut sorted = energies.clone();
    sorted.sort_by(f32::total_cmp);
    let noise_floor = sorted[sorted.len() / 10];
    let peak = sorted[sorted.len() - 1];
    let threshold = (noise_floor * NOISE_RATIO)
        .max(MIN_SPEECH_RMS)
        .min(peak * PEAK_RATIO);

    let mut keep = vec![false; energies.len()];
    for (i, energy) in energies.iter().enumerate() {
        if *energy > threshold {
            let from = i.saturating_sub(HANGOVER_FRAMES);
            let to = (i + HANGOVER_FRAMES + 1).min(keep.len());
            keep[from..to].iter_mut().for_each(|k| *k = true);
        }
    }

    samples
        .chunks(frame_len)
        .zip(keep)
        .flat_map(|(frame, keep)| {
            frame
                .iter()
                .map(move |sample| if keep { *sample } else { 0.0 })
        })
        .collect()
}

fn rms(frame: &[f32]) -> f32 {
    let sum: f32 = frame.iter().map(|s| s * s).sum();
    (sum / frame.len() as f32).sqrt()
}
