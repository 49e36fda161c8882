use crate::types::Segment;

/// Format seconds as MM:SS timestamp
pub fn format_timestamp(seconds: f64) -> String {
    let mins = (seconds / 60.0) as u32;
    let secs = (seconds % 60.0) as u32;
    format!("{:02}:{:02}", mins, secs)
}

/// One transcript line as shown while a run streams text.
pub fn format_segment(segment: &Segment) -> String {
    format!("[{}] {}", format_timestamp(segment.start), segment.text.trim())
}

/// Format transcript segments with timestamps
pub fn format_transcript_with_timestamps(segments: &[Segment]) -> String {
    segments
        .iter()
        .map(format_segment)
        .collect::<Vec<_>>()
        .join("\n")
}
