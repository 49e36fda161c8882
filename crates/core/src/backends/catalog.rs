use async_trait::async_trait;
use serde_json::Value;
use tokio::process::Command;

use crate::{
    backends::CatalogSearch,
    error::{KairosError, Result},
};

/// Catalog search through `yt-dlp`'s `ytsearchN:` pseudo-URL, flat extraction only.
pub struct YtDlpCatalog {
    program: String,
}

impl YtDlpCatalog {
    pub fn new() -> Self {
        Self {
            program: "yt-dlp".to_string(),
        }
    }

    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for YtDlpCatalog {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CatalogSearch for YtDlpCatalog {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<Value>> {
        let failed = |reason: String| KairosError::CatalogSearchFailed {
            query: query.to_string(),
            reason,
        };

        let output = Command::new(&self.program)
            .arg(format!("ytsearch{max_results}:{query}"))
            .arg("--flat-playlist")
            .arg("--dump-single-json")
            .arg("--no-warnings")
            .output()
            .await
            .map_err(|e| failed(e.to_string()))?;

        if !output.status.success() {
            return Err(failed(String::from_utf8_lossy(&output.stderr).to_string()));
        }

        parse_search_output(&output.stdout).map_err(failed)
    }
}

/// Pull the `entries` array out of a `--dump-single-json` document.
pub fn parse_search_output(stdout: &[u8]) -> std::result::Result<Vec<Value>, String> {
    let info: Value = serde_json::from_slice(stdout).map_err(|e| e.to_string())?;

    Ok(info
        .get("entries")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default())
}
