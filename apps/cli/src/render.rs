use std::time::Duration;

use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use kairos_core::{
    PipelineEvent, TranscriptRecord, format_segment, format_transcript_with_timestamps,
};
use tokio::sync::mpsc::UnboundedReceiver;

pub fn create_spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ")
            .template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs_f64();
    if secs < 60.0 {
        format!("{:.1}s", secs)
    } else {
        format!("{:.0}m {:.0}s", (secs / 60.0).floor(), secs % 60.0)
    }
}

fn ok(msg: impl std::fmt::Display) -> String {
    format!("{} {}", style("✓").green().bold(), msg)
}

fn failed(msg: impl std::fmt::Display) -> String {
    format!("{} {}", style("✗").red().bold(), msg)
}

/// One logged transcript as a heading followed by timestamped lines.
pub fn render_transcript(record: &TranscriptRecord) -> String {
    let heading = style(&record.video_id).cyan().bold();
    match &record.transcript {
        Some(segments) => format!(
            "{heading}\n{}\n",
            format_transcript_with_timestamps(segments)
        ),
        None => format!("{heading}\n{}\n", style("no transcript").dim()),
    }
}

/// Draws pipeline events until the sending side is dropped.
pub async fn render_events(mut events: UnboundedReceiver<PipelineEvent>, show_text: bool) {
    let spinner = create_spinner("Planning syllabus...");

    while let Some(event) = events.recv().await {
        match event {
            PipelineEvent::Planned {
                session,
                topics,
                queries,
            } => {
                spinner.println(ok(format!(
                    "Syllabus: {} topics, {} queries {}",
                    topics,
                    queries,
                    style(format!("[{session}]")).dim()
                )));
                spinner.set_message("Searching videos...");
            }
            PipelineEvent::QuerySearched { query, hits, .. } => {
                spinner.set_message(format!("Searched {:?} ({} hits)", query, hits));
            }
            PipelineEvent::QueryFailed { path, reason, .. } => {
                spinner.println(failed(format!("{} {}", path, style(reason).dim())));
            }
            PipelineEvent::DocumentWritten { key, entries } => {
                spinner.println(ok(format!(
                    "{} {}",
                    key,
                    style(format!("({entries} videos)")).dim()
                )));
            }
            PipelineEvent::IdsCollected { count } => {
                spinner.println(ok(format!("Collected {} video ids", count)));
                spinner.set_message("Creating playlist...");
            }
            PipelineEvent::PlaylistCreated { playlist_id } => {
                spinner.println(ok(format!(
                    "Playlist {}",
                    style(format!("https://youtube.com/playlist?list={playlist_id}")).cyan()
                )));
            }
            PipelineEvent::VideoStarted {
                index,
                total,
                video_id,
            } => {
                spinner.set_message(format!("[{}/{}] {}", index + 1, total, video_id));
            }
            PipelineEvent::VideoSkipped { video_id } => {
                spinner.println(format!(
                    "{} {}",
                    style("-").dim(),
                    style(format!("{video_id} already transcribed")).dim()
                ));
            }
            PipelineEvent::VideoAttached { .. } => {}
            PipelineEvent::AttachFailed { video_id, reason } => {
                spinner.println(failed(format!(
                    "Not added {} {}",
                    video_id,
                    style(reason).dim()
                )));
            }
            PipelineEvent::TranscriptText {
                video_id,
                tier,
                segment,
            } => {
                if show_text {
                    spinner.println(format!(
                        "  {} {}",
                        style(format!("{video_id} {}", tier.label())).dim(),
                        format_segment(&segment)
                    ));
                } else {
                    spinner.set_message(format!(
                        "{} transcribing ({})",
                        video_id,
                        tier.label()
                    ));
                }
            }
            PipelineEvent::TranscriptResolved {
                video_id,
                tier: Some(tier),
                segments,
            } => {
                spinner.println(ok(format!(
                    "{} {}",
                    video_id,
                    style(format!("{} segments via {}", segments, tier.label())).dim()
                )));
            }
            PipelineEvent::TranscriptResolved {
                video_id,
                tier: None,
                ..
            } => {
                spinner.println(failed(format!("{} no transcript", video_id)));
            }
            PipelineEvent::Cancelled { remaining } => {
                spinner.println(failed(format!(
                    "Cancelled, {} videos left unprocessed",
                    remaining
                )));
            }
        }
    }

    spinner.finish_and_clear();
}
