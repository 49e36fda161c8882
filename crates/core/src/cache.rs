use std::path::{Path, PathBuf};

pub fn get_root_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("kairos")
}

pub fn get_model_dir(cache_dir: &Path) -> PathBuf {
    cache_dir.join("models")
}

/// Per-video directory for downloaded audio and caption files
pub fn get_media_dir(cache_dir: &Path, video_id: &str) -> PathBuf {
    let name = video_id.replace(['/', '\\'], "_");
    let name = match name.as_str() {
        "" | "." | ".." => format!("{name}_"),
        _ => name,
    };
    cache_dir.join("media").join(name)
}

/// Get the path for a cached audio file
pub fn get_audio_path(media_dir: &Path) -> PathBuf {
    media_dir.join("audio.wav")
}

/// Find a json3 caption file in the media directory, preferring plain English
pub fn find_captions_in_cache(media_dir: &Path) -> Option<PathBuf> {
    let Ok(entries) = std::fs::read_dir(media_dir) else {
        return None;
    };

    let mut found: Vec<PathBuf> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "json3"))
        .collect();
    found.sort();

    let preferred = found.iter().position(|path| {
        path.file_name()
            .is_some_and(|name| name.to_string_lossy().ends_with(".en.json3"))
    });
    match preferred {
        Some(i) => Some(found.swap_remove(i)),
        None => found.into_iter().next(),
    }
}
