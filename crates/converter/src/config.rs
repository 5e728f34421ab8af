use std::fmt;
use std::path::{Path, PathBuf};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Which family of encoder the run should use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncoderClass {
    Software,
    Hardware,
}

impl fmt::Display for EncoderClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EncoderClass::Software => write!(f, "software"),
            EncoderClass::Hardware => write!(f, "hardware"),
        }
    }
}

/// Hardware encoder backends, named the way ffmpeg suffixes them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HwBackend {
    Nvenc,
    Qsv,
    Vaapi,
}

impl HwBackend {
    pub fn suffix(&self) -> &'static str {
        match self {
            HwBackend::Nvenc => "nvenc",
            HwBackend::Qsv => "qsv",
            HwBackend::Vaapi => "vaapi",
        }
    }
}

impl fmt::Display for HwBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}

/// Configuration problems that abort the run before any file is touched
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("extension allowlist is empty")]
    EmptyExtensions,

    #[error("root directory does not exist or is not a directory: {0}")]
    InvalidRoot(PathBuf),

    #[error("quality {quality} is out of range for {codec} (0-{max})")]
    QualityOutOfRange { quality: u8, codec: String, max: u8 },

    #[error("source and target codec are both '{0}'")]
    SameCodec(String),

    #[error("output extension is empty")]
    EmptyOutputExtension,
}

/// Render device used by VAAPI and QSV when no device is configured
pub const DEFAULT_RENDER_DEVICE: &str = "/dev/dri/renderD128";

/// Highest CRF/CQ/QP value the encoders for `target_codec` accept
pub fn max_quality(target_codec: &str) -> u8 {
    match target_codec {
        "av1" | "vp9" => 63,
        _ => 51,
    }
}

/// Configuration for a conversion run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvertConfig {
    /// Directory tree to convert
    pub root: PathBuf,
    /// File extensions (case-insensitive, no leading dot) eligible for conversion
    pub extensions: Vec<String>,
    /// Codec being phased out, as ffprobe names it
    pub source_codec: String,
    /// Codec being adopted, as ffprobe names it
    pub target_codec: String,
    pub encoder_class: EncoderClass,
    /// ffmpeg encoder used for the software class and as the hardware fallback
    pub software_encoder: String,
    /// Single quality knob mapped onto each encoder's rate-control parameter
    pub quality: u8,
    /// Preset passed to the software encoder
    pub cpu_preset: String,
    /// Device hint for hardware encoders (render node path or GPU index)
    pub hw_device: Option<PathBuf>,
    /// Hardware backends tried in order before falling back to software
    pub hw_fallback_order: Vec<HwBackend>,
    /// Container extension of converted files
    pub output_extension: String,
    pub dry_run: bool,
    /// Keep the original next to a smaller conversion instead of deleting it
    pub keep_originals: bool,
    pub ffmpeg_bin: PathBuf,
    pub ffprobe_bin: PathBuf,
    /// Optional JSON-lines file receiving one audit record per file
    pub audit_log: Option<PathBuf>,
    /// Remove leftover temp artifacts from earlier interrupted runs at startup
    pub cleanup_orphans: bool,
    /// Temp artifacts modified more recently than this are assumed to belong
    /// to another live run and survive orphan cleanup
    pub orphan_min_age_secs: u64,
}

impl Default for ConvertConfig {
    fn default() -> Self {
        Self::default_config()
    }
}

impl ConvertConfig {
    /// Create a default configuration with sensible values
    pub fn default_config() -> Self {
        Self {
            root: PathBuf::from("."),
            extensions: ["mkv", "mp4", "m4v", "avi", "mov"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            source_codec: "h264".to_string(),
            target_codec: "hevc".to_string(),
            encoder_class: EncoderClass::Software,
            software_encoder: "libx265".to_string(),
            quality: 28,
            cpu_preset: "medium".to_string(),
            hw_device: None,
            hw_fallback_order: vec![HwBackend::Nvenc, HwBackend::Qsv, HwBackend::Vaapi],
            output_extension: "mkv".to_string(),
            dry_run: false,
            keep_originals: false,
            ffmpeg_bin: PathBuf::from("ffmpeg"),
            ffprobe_bin: PathBuf::from("ffprobe"),
            audit_log: None,
            cleanup_orphans: true,
            orphan_min_age_secs: 3600,
        }
    }

    /// Load configuration from a file, or return defaults if path is None or file doesn't exist
    pub fn load_config(path: Option<&Path>) -> Result<Self> {
        let mut config = Self::default_config();

        if let Some(config_path) = path {
            if config_path.exists() {
                let content = std::fs::read_to_string(config_path)
                    .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

                // TOML by extension, JSON otherwise
                if config_path.extension().and_then(|s| s.to_str()) == Some("toml") {
                    config = toml::from_str(&content)
                        .with_context(|| format!("Failed to parse TOML config: {}", config_path.display()))?;
                } else {
                    config = serde_json::from_str(&content)
                        .with_context(|| format!("Failed to parse JSON config: {}", config_path.display()))?;
                }
            } else {
                log::warn!("Config file not found, using defaults: {}", config_path.display());
            }
        }

        Ok(config)
    }

    /// Normalise and check the configuration.
    ///
    /// Extensions lose any leading dot and are lowercased; codec names are
    /// lowercased. Any error here is fatal for the run.
    pub fn validate(&mut self) -> Result<(), ConfigError> {
        self.extensions = self
            .extensions
            .iter()
            .map(|e| e.trim().trim_start_matches('.').to_lowercase())
            .filter(|e| !e.is_empty())
            .collect();
        self.extensions.dedup();
        if self.extensions.is_empty() {
            return Err(ConfigError::EmptyExtensions);
        }

        if !self.root.is_dir() {
            return Err(ConfigError::InvalidRoot(self.root.clone()));
        }

        self.source_codec = self.source_codec.trim().to_lowercase();
        self.target_codec = self.target_codec.trim().to_lowercase();
        if self.source_codec == self.target_codec {
            return Err(ConfigError::SameCodec(self.source_codec.clone()));
        }

        let max = max_quality(&self.target_codec);
        if self.quality > max {
            return Err(ConfigError::QualityOutOfRange {
                quality: self.quality,
                codec: self.target_codec.clone(),
                max,
            });
        }

        self.output_extension = self.output_extension.trim().trim_start_matches('.').to_lowercase();
        if self.output_extension.is_empty() {
            return Err(ConfigError::EmptyOutputExtension);
        }

        Ok(())
    }

    /// Render device for VAAPI/QSV, falling back to the default render node
    pub fn render_device(&self) -> PathBuf {
        self.hw_device
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_RENDER_DEVICE))
    }
}
