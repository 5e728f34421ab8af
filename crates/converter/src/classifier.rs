use std::fmt;
use std::path::{Path, PathBuf};
use log::{debug, info, warn};
use crate::config::ConvertConfig;
use crate::job::{final_output_path, CandidateFile};
use crate::tools::MediaTools;

/// Classification of a file's primary video codec
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodecClass {
    Target,
    Source,
    Other(String),
    /// Probe failed or reported no video stream
    Unknown,
}

impl fmt::Display for CodecClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecClass::Target => f.write_str("target"),
            CodecClass::Source => f.write_str("source"),
            CodecClass::Other(codec) => write!(f, "other ({})", codec),
            CodecClass::Unknown => f.write_str("unknown"),
        }
    }
}

/// Map a probed codec name onto the configured source/target pair
pub fn classify_codec(codec: Option<&str>, source_codec: &str, target_codec: &str) -> CodecClass {
    match codec.map(str::trim).filter(|c| !c.is_empty()) {
        None => CodecClass::Unknown,
        Some(c) if c.eq_ignore_ascii_case(target_codec) => CodecClass::Target,
        Some(c) if c.eq_ignore_ascii_case(source_codec) => CodecClass::Source,
        Some(c) => CodecClass::Other(c.to_ascii_lowercase()),
    }
}

/// What to do with one candidate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Eligibility {
    /// Source codec with a free (or in-place) output path
    Convert { final_output_path: PathBuf },
    /// A target-codec file already sits at the output path
    AlreadyConverted { final_output_path: PathBuf },
    /// Something that is not target codec occupies the output path
    Conflict { final_output_path: PathBuf, existing: CodecClass },
    /// Target, other or unknown codec
    Skip { class: CodecClass, note: String },
}

/// Probes `path` and classifies it, folding probe errors into `Unknown`
pub async fn probe_class<T: MediaTools>(
    tools: &T,
    path: &Path,
    cfg: &ConvertConfig,
) -> (CodecClass, Option<String>) {
    match tools.probe_codec(path).await {
        Ok(codec) => {
            debug!("Probed {}: {:?}", path.display(), codec);
            let class = classify_codec(codec.as_deref(), &cfg.source_codec, &cfg.target_codec);
            (class, codec)
        }
        Err(e) => {
            warn!("Probe failed for {}: {:#}", path.display(), e);
            (CodecClass::Unknown, Some(format!("probe failed: {:#}", e)))
        }
    }
}

/// Classify a candidate and, for source-codec files, check the output path.
pub async fn classify_candidate<T: MediaTools>(
    tools: &T,
    candidate: &CandidateFile,
    cfg: &ConvertConfig,
) -> Eligibility {
    let (class, probed) = probe_class(tools, &candidate.path, cfg).await;

    match class {
        CodecClass::Source => {}
        CodecClass::Unknown => {
            let note = probed.unwrap_or_else(|| "no video stream".to_string());
            return Eligibility::Skip { class, note };
        }
        CodecClass::Target => {
            let note = format!("already {}", cfg.target_codec);
            return Eligibility::Skip { class, note };
        }
        CodecClass::Other(ref codec) => {
            let note = format!("codec {}", codec);
            return Eligibility::Skip { class, note };
        }
    }

    let final_path = final_output_path(&candidate.path, cfg);
    if final_path == candidate.path || !final_path.exists() {
        return Eligibility::Convert { final_output_path: final_path };
    }

    let (existing, _) = probe_class(tools, &final_path, cfg).await;
    if existing == CodecClass::Target {
        info!(
            "Already converted: {} (found {})",
            candidate.path.display(),
            final_path.display()
        );
        Eligibility::AlreadyConverted { final_output_path: final_path }
    } else {
        warn!(
            "Output path {} is occupied by a {} file, skipping {}",
            final_path.display(),
            existing,
            candidate.path.display()
        );
        Eligibility::Conflict { final_output_path: final_path, existing }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{BTreeSet, HashMap};
    use std::ffi::OsString;
    use std::sync::Mutex;
    use anyhow::{bail, Result};
    use proptest::prelude::*;
    use tempfile::TempDir;
    use crate::tools::EncodeExit;

    /// Answers probes from a table keyed by file name
    #[derive(Default)]
    struct TableProbe {
        codecs: HashMap<String, Option<String>>,
        probed: Mutex<Vec<String>>,
    }

    impl TableProbe {
        fn with(mut self, name: &str, codec: Option<&str>) -> Self {
            self.codecs.insert(name.to_string(), codec.map(str::to_string));
            self
        }
    }

    impl MediaTools for TableProbe {
        async fn probe_codec(&self, path: &Path) -> Result<Option<String>> {
            let name = path.file_name().unwrap().to_string_lossy().to_string();
            self.probed.lock().unwrap().push(name.clone());
            match self.codecs.get(&name) {
                Some(codec) => Ok(codec.clone()),
                None => bail!("ffprobe exited with status 1"),
            }
        }

        async fn encoder_capabilities(&self) -> Result<BTreeSet<String>> {
            Ok(BTreeSet::new())
        }

        async fn encode(&self, _args: &[OsString]) -> Result<EncodeExit> {
            bail!("encode not expected")
        }
    }

    fn candidate(dir: &TempDir, name: &str) -> CandidateFile {
        let path = dir.path().join(name);
        std::fs::write(&path, b"data").unwrap();
        CandidateFile {
            path,
            size_bytes: 4,
            extension: name.rsplit('.').next().unwrap().to_string(),
        }
    }

    #[test]
    fn test_classify_codec() {
        assert_eq!(classify_codec(Some("hevc"), "h264", "hevc"), CodecClass::Target);
        assert_eq!(classify_codec(Some("H264"), "h264", "hevc"), CodecClass::Source);
        assert_eq!(classify_codec(Some("vp9"), "h264", "hevc"), CodecClass::Other("vp9".into()));
        assert_eq!(classify_codec(Some("  "), "h264", "hevc"), CodecClass::Unknown);
        assert_eq!(classify_codec(None, "h264", "hevc"), CodecClass::Unknown);
    }

    proptest! {
        /// Exactly one class per codec name, and only the configured pair
        /// ever classifies as source or target
        #[test]
        fn test_classification_is_total(codec in "[a-zA-Z0-9_]{0,8}") {
            let class = classify_codec(Some(&codec), "h264", "hevc");
            let lower = codec.to_ascii_lowercase();
            match class {
                CodecClass::Target => prop_assert_eq!(lower.as_str(), "hevc"),
                CodecClass::Source => prop_assert_eq!(lower.as_str(), "h264"),
                CodecClass::Other(name) => {
                    prop_assert_eq!(name, lower.clone());
                    prop_assert!(lower != "hevc" && lower != "h264");
                }
                CodecClass::Unknown => prop_assert!(codec.is_empty()),
            }
        }
    }

    #[tokio::test]
    async fn test_target_and_other_are_skipped() {
        let dir = TempDir::new().unwrap();
        let cfg = ConvertConfig::default_config();
        let tools = TableProbe::default()
            .with("b.mp4", Some("hevc"))
            .with("c.mp4", Some("vp9"));

        match classify_candidate(&tools, &candidate(&dir, "b.mp4"), &cfg).await {
            Eligibility::Skip { class, .. } => assert_eq!(class, CodecClass::Target),
            other => panic!("unexpected {:?}", other),
        }
        match classify_candidate(&tools, &candidate(&dir, "c.mp4"), &cfg).await {
            Eligibility::Skip { class, note } => {
                assert_eq!(class, CodecClass::Other("vp9".into()));
                assert_eq!(note, "codec vp9");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_probe_failure_is_unknown() {
        let dir = TempDir::new().unwrap();
        let cfg = ConvertConfig::default_config();
        let tools = TableProbe::default().with("silent.mp4", None);

        match classify_candidate(&tools, &candidate(&dir, "broken.mp4"), &cfg).await {
            Eligibility::Skip { class, note } => {
                assert_eq!(class, CodecClass::Unknown);
                assert!(note.starts_with("probe failed"));
            }
            other => panic!("unexpected {:?}", other),
        }
        match classify_candidate(&tools, &candidate(&dir, "silent.mp4"), &cfg).await {
            Eligibility::Skip { class, note } => {
                assert_eq!(class, CodecClass::Unknown);
                assert_eq!(note, "no video stream");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_source_with_free_output_converts() {
        let dir = TempDir::new().unwrap();
        let cfg = ConvertConfig::default_config();
        let tools = TableProbe::default().with("a.mp4", Some("h264"));

        let result = classify_candidate(&tools, &candidate(&dir, "a.mp4"), &cfg).await;
        assert_eq!(
            result,
            Eligibility::Convert { final_output_path: dir.path().join("a.mkv") }
        );
        assert_eq!(*tools.probed.lock().unwrap(), vec!["a.mp4".to_string()]);
    }

    #[tokio::test]
    async fn test_in_place_source_skips_output_probe() {
        let dir = TempDir::new().unwrap();
        let cfg = ConvertConfig::default_config();
        let tools = TableProbe::default().with("a.mkv", Some("h264"));

        let result = classify_candidate(&tools, &candidate(&dir, "a.mkv"), &cfg).await;
        assert_eq!(
            result,
            Eligibility::Convert { final_output_path: dir.path().join("a.mkv") }
        );
        assert_eq!(tools.probed.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_existing_target_output_is_already_converted() {
        let dir = TempDir::new().unwrap();
        let cfg = ConvertConfig::default_config();
        let tools = TableProbe::default()
            .with("a.mp4", Some("h264"))
            .with("a.mkv", Some("hevc"));
        candidate(&dir, "a.mkv");

        let result = classify_candidate(&tools, &candidate(&dir, "a.mp4"), &cfg).await;
        assert_eq!(
            result,
            Eligibility::AlreadyConverted { final_output_path: dir.path().join("a.mkv") }
        );
    }

    #[tokio::test]
    async fn test_existing_foreign_output_is_conflict() {
        let dir = TempDir::new().unwrap();
        let cfg = ConvertConfig::default_config();
        let tools = TableProbe::default()
            .with("a.mp4", Some("h264"))
            .with("a.mkv", Some("h264"));
        candidate(&dir, "a.mkv");

        match classify_candidate(&tools, &candidate(&dir, "a.mp4"), &cfg).await {
            Eligibility::Conflict { existing, .. } => assert_eq!(existing, CodecClass::Source),
            other => panic!("unexpected {:?}", other),
        }
    }
}
