use std::collections::BTreeSet;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use anyhow::{anyhow, Context, Result};
use log::debug;
use tokio::process::Command;
use crate::config::ConvertConfig;
use crate::ffprobe;
use crate::tools::{EncodeExit, MediaTools};

const STDERR_TAIL_LINES: usize = 20;

/// ffmpeg/ffprobe binaries driven as subprocesses
#[derive(Debug, Clone)]
pub struct FfmpegTools {
    pub ffmpeg_bin: PathBuf,
    pub ffprobe_bin: PathBuf,
}

impl FfmpegTools {
    pub fn new(cfg: &ConvertConfig) -> Self {
        Self {
            ffmpeg_bin: cfg.ffmpeg_bin.clone(),
            ffprobe_bin: cfg.ffprobe_bin.clone(),
        }
    }
}

impl MediaTools for FfmpegTools {
    async fn probe_codec(&self, path: &Path) -> Result<Option<String>> {
        ffprobe::probe_video_codec(&self.ffprobe_bin, path).await
    }

    async fn encoder_capabilities(&self) -> Result<BTreeSet<String>> {
        let output = Command::new(&self.ffmpeg_bin)
            .arg("-hide_banner")
            .arg("-encoders")
            .output()
            .await
            .with_context(|| format!("Failed to query ffmpeg encoders at: {}", self.ffmpeg_bin.display()))?;

        if !output.status.success() {
            return Err(anyhow!("ffmpeg encoder query failed"));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let encoders = parse_encoder_list(&stdout);
        debug!("ffmpeg advertises {} encoders", encoders.len());
        Ok(encoders)
    }

    async fn encode(&self, args: &[OsString]) -> Result<EncodeExit> {
        debug!(
            "Executing: {} {}",
            self.ffmpeg_bin.display(),
            args.iter().map(|a| a.to_string_lossy()).collect::<Vec<_>>().join(" ")
        );

        // kill_on_drop: an interrupted run drops this future and must not
        // leave ffmpeg writing into a temp file nobody tracks
        let output = Command::new(&self.ffmpeg_bin)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .with_context(|| format!(
                "Failed to spawn ffmpeg at: {}. Ensure ffmpeg is installed and accessible.",
                self.ffmpeg_bin.display()
            ))?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        Ok(EncodeExit {
            success: output.status.success(),
            exit_code: output.status.code(),
            stderr_tail: tail_lines(&stderr, STDERR_TAIL_LINES),
        })
    }
}

/// Parse `ffmpeg -encoders` output into the set of encoder identifiers.
///
/// The listing is a legend, a `------` separator, then one line per encoder:
/// ` V....D libx265              libx265 H.265 / HEVC`.
pub fn parse_encoder_list(listing: &str) -> BTreeSet<String> {
    listing
        .lines()
        .skip_while(|line| !line.trim_start().starts_with("---"))
        .skip(1)
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let flags = fields.next()?;
            let name = fields.next()?;
            // flags column is six characters, first one is the media type
            if flags.len() == 6 && matches!(flags.as_bytes()[0], b'V' | b'A' | b'S') {
                Some(name.to_string())
            } else {
                None
            }
        })
        .collect()
}

fn tail_lines(text: &str, n: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(n);
    lines[start..].join("\n")
}
