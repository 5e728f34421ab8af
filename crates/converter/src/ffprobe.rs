use std::path::Path;
use anyhow::{Context, Result};
use log::debug;
use serde::Deserialize;
use tokio::process::Command;

/// ffprobe output limited to the entries we request
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FFProbeData {
    #[serde(default)]
    pub streams: Vec<FFProbeStream>,
}

/// Stream-level metadata from ffprobe
#[derive(Debug, Clone, Deserialize)]
pub struct FFProbeStream {
    #[serde(default)]
    pub index: i32,
    pub codec_type: Option<String>,
    pub codec_name: Option<String>,
}

impl FFProbeData {
    /// Codec name of the first video stream, lowercased; `None` when there is
    /// no video stream or it carries no codec name
    pub fn primary_video_codec(&self) -> Option<String> {
        self.streams
            .iter()
            .find(|s| s.codec_type.as_deref().map_or(true, |t| t == "video"))
            .and_then(|s| s.codec_name.as_deref())
            .map(|c| c.trim().to_lowercase())
            .filter(|c| !c.is_empty())
    }
}

/// Parse ffprobe's JSON output
pub fn parse_probe_output(json: &str) -> Result<FFProbeData> {
    serde_json::from_str(json).context("Failed to parse ffprobe JSON")
}

/// Run ffprobe for the first video stream of `file_path` and return its codec
pub async fn probe_video_codec(ffprobe_bin: &Path, file_path: &Path) -> Result<Option<String>> {
    if !file_path.exists() {
        anyhow::bail!("File does not exist: {}", file_path.display());
    }

    debug!("Executing ffprobe for: {}", file_path.display());

    let output = Command::new(ffprobe_bin)
        .arg("-v")
        .arg("error")
        .arg("-select_streams")
        .arg("v:0")
        .arg("-show_entries")
        .arg("stream=index,codec_type,codec_name")
        .arg("-of")
        .arg("json")
        .arg(file_path)
        .kill_on_drop(true)
        .output()
        .await
        .with_context(|| format!(
            "Failed to execute ffprobe for: {}. Ensure ffprobe is installed and accessible at: {}",
            file_path.display(),
            ffprobe_bin.display()
        ))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        anyhow::bail!(
            "ffprobe failed (exit code {}) for {}: {}",
            output.status.code().unwrap_or(-1),
            file_path.display(),
            stderr.trim()
        );
    }

    let json_str = String::from_utf8(output.stdout)
        .context("ffprobe output is not valid UTF-8")?;

    let data = parse_probe_output(&json_str)
        .with_context(|| format!("Unreadable ffprobe output for: {}", file_path.display()))?;

    Ok(data.primary_video_codec())
}
