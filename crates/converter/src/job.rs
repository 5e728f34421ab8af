use std::ffi::OsString;
use std::path::{Path, PathBuf};
use uuid::Uuid;
use crate::config::ConvertConfig;
use crate::encoder::EncoderSpec;

/// Marker every temp artifact name starts with, so leftovers are recognisable
pub const TEMP_MARKER: &str = ".recodec-tmp-";

/// Per-run uniqueness token embedded in temp artifact names
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunToken(String);

impl RunToken {
    pub fn generate() -> Self {
        RunToken(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for RunToken {
    fn from(s: &str) -> Self {
        RunToken(s.to_string())
    }
}

/// A file found under the root that matches the extension allowlist
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateFile {
    pub path: PathBuf,
    pub size_bytes: u64,
    /// Lowercased extension without the dot
    pub extension: String,
}

/// One source-codec file scheduled for conversion
#[derive(Debug, Clone)]
pub struct EncodeJob {
    pub source_path: PathBuf,
    pub temp_output_path: PathBuf,
    pub final_output_path: PathBuf,
    pub encoder_spec: EncoderSpec,
}

impl EncodeJob {
    pub fn new(source_path: PathBuf, final_output_path: PathBuf, token: &RunToken, encoder_spec: EncoderSpec) -> Self {
        let temp_output_path = temp_output_path(&final_output_path, token);
        Self {
            source_path,
            temp_output_path,
            final_output_path,
            encoder_spec,
        }
    }

    /// The conversion replaces the source file itself
    pub fn is_in_place(&self) -> bool {
        self.source_path == self.final_output_path
    }
}

/// Where the converted file for `source` ends up.
///
/// Normally the source with its extension swapped for the output container.
/// When that collides with the source and originals are kept, the target codec
/// is inserted before the extension so both files can coexist.
pub fn final_output_path(source: &Path, cfg: &ConvertConfig) -> PathBuf {
    let swapped = source.with_extension(&cfg.output_extension);
    if swapped != source || !cfg.keep_originals {
        return swapped;
    }

    let stem = source.file_stem().map(|s| s.to_os_string()).unwrap_or_default();
    let mut name = stem;
    name.push(format!(".{}.{}", cfg.target_codec, cfg.output_extension));
    source.with_file_name(name)
}

/// Temp artifact path, co-located with the final output.
///
/// `<dir>/.recodec-tmp-<token>-<final name>`; the final name stays as suffix so
/// the encoder picks the container from the extension.
pub fn temp_output_path(final_output: &Path, token: &RunToken) -> PathBuf {
    let mut name = OsString::from(TEMP_MARKER);
    name.push(token.as_str());
    name.push("-");
    if let Some(file_name) = final_output.file_name() {
        name.push(file_name);
    }
    final_output.with_file_name(name)
}

/// Whether a file name belongs to a temp artifact of this tool
pub fn is_temp_artifact(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with(TEMP_MARKER))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(keep_originals: bool) -> ConvertConfig {
        ConvertConfig {
            keep_originals,
            ..ConvertConfig::default_config()
        }
    }

    #[test]
    fn test_final_path_swaps_extension() {
        let cfg = config(false);
        assert_eq!(
            final_output_path(Path::new("/media/a.mp4"), &cfg),
            PathBuf::from("/media/a.mkv")
        );
    }

    #[test]
    fn test_final_path_in_place_when_extension_matches() {
        let cfg = config(false);
        assert_eq!(
            final_output_path(Path::new("/media/c.mkv"), &cfg),
            PathBuf::from("/media/c.mkv")
        );
    }

    #[test]
    fn test_final_path_avoids_collision_when_keeping_originals() {
        let cfg = config(true);
        assert_eq!(
            final_output_path(Path::new("/media/c.mkv"), &cfg),
            PathBuf::from("/media/c.hevc.mkv")
        );
        assert_eq!(
            final_output_path(Path::new("/media/a.mp4"), &cfg),
            PathBuf::from("/media/a.mkv")
        );
    }

    #[test]
    fn test_temp_path_is_marked_and_colocated() {
        let token = RunToken::from("abc123");
        let temp = temp_output_path(Path::new("/media/show/ep1.mkv"), &token);

        assert_eq!(temp, PathBuf::from("/media/show/.recodec-tmp-abc123-ep1.mkv"));
        assert!(is_temp_artifact(&temp));
        assert!(!is_temp_artifact(Path::new("/media/show/ep1.mkv")));
        assert_eq!(temp.extension().and_then(|e| e.to_str()), Some("mkv"));
    }

    #[test]
    fn test_run_tokens_are_unique() {
        let a = RunToken::generate();
        let b = RunToken::generate();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 32);
    }
}
