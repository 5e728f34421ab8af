//! Encoder resolution.
//!
//! Turns the configured encoder class into a concrete ffmpeg encoder plus the
//! parameters it needs. Hardware backends are tried in the configured order;
//! each must both be physically present and be advertised by ffmpeg. When none
//! qualifies the software encoder is used and the fallback is recorded.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use log::{debug, info, warn};
use crate::config::{ConvertConfig, EncoderClass, HwBackend};

/// Rate-control flag carrying the configured quality value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualityParam {
    /// Constant rate factor (libx265, libx264, libsvtav1)
    Crf,
    /// NVENC constant quality
    Cq,
    /// QSV ICQ
    GlobalQuality,
    /// VAAPI constant QP
    Qp,
}

impl QualityParam {
    pub fn flag(&self) -> &'static str {
        match self {
            QualityParam::Crf => "-crf",
            QualityParam::Cq => "-cq",
            QualityParam::GlobalQuality => "-global_quality",
            QualityParam::Qp => "-qp",
        }
    }

    pub fn for_backend(backend: Option<HwBackend>) -> Self {
        match backend {
            None => QualityParam::Crf,
            Some(HwBackend::Nvenc) => QualityParam::Cq,
            Some(HwBackend::Qsv) => QualityParam::GlobalQuality,
            Some(HwBackend::Vaapi) => QualityParam::Qp,
        }
    }
}

/// A fully resolved encoder with everything the command builder needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderSpec {
    /// Class actually in use (software after a fallback)
    pub class: EncoderClass,
    /// ffmpeg encoder identifier, e.g. `libx265` or `hevc_nvenc`
    pub encoder: String,
    pub backend: Option<HwBackend>,
    pub quality_param: QualityParam,
    pub quality_value: u8,
    /// CPU preset for software encoders
    pub preset: Option<String>,
    /// Device hint for hardware encoders
    pub device: Option<PathBuf>,
    /// Hardware backends probed before settling, in order
    pub attempted: Vec<HwBackend>,
    /// Hardware was requested but software was selected
    pub fell_back_to_software: bool,
}

impl EncoderSpec {
    /// Short human description for logs and audit notes
    pub fn describe(&self) -> String {
        let mut s = format!("{} {} {}", self.encoder, self.quality_param.flag(), self.quality_value);
        if self.fell_back_to_software {
            s.push_str(" (hardware unavailable, software fallback)");
        }
        s
    }
}

/// Presence signal for a hardware backend on this machine
pub trait HardwareProbe {
    fn is_present(&self, backend: HwBackend, device: &Path) -> bool;
}

/// Checks device nodes and driver files on the local system
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemHardware;

impl HardwareProbe for SystemHardware {
    fn is_present(&self, backend: HwBackend, device: &Path) -> bool {
        match backend {
            HwBackend::Nvenc => {
                Path::new("/dev/nvidiactl").exists()
                    || Path::new("/proc/driver/nvidia/version").exists()
            }
            HwBackend::Qsv | HwBackend::Vaapi => device.exists(),
        }
    }
}

/// ffmpeg encoder identifier for a hardware backend, e.g. `hevc_vaapi`
pub fn hardware_encoder_name(target_codec: &str, backend: HwBackend) -> String {
    format!("{}_{}", target_codec, backend.suffix())
}

/// Resolve the encoder for this run.
///
/// `capabilities` is the set of encoder identifiers ffmpeg advertises. It is
/// only consulted for the hardware class.
pub fn resolve_encoder(
    cfg: &ConvertConfig,
    capabilities: &BTreeSet<String>,
    hardware: &impl HardwareProbe,
) -> EncoderSpec {
    if cfg.encoder_class == EncoderClass::Software {
        let spec = software_spec(cfg, Vec::new(), false);
        info!("Selected software encoder: {}", spec.describe());
        return spec;
    }

    let device = cfg.render_device();
    let mut attempted = Vec::new();

    for &backend in &cfg.hw_fallback_order {
        attempted.push(backend);
        let encoder = hardware_encoder_name(&cfg.target_codec, backend);

        if !hardware.is_present(backend, &device) {
            debug!("Hardware backend {} not present (device {})", backend, device.display());
            continue;
        }
        if !capabilities.contains(&encoder) {
            debug!("ffmpeg does not advertise encoder {}", encoder);
            continue;
        }

        // NVENC addresses GPUs by index; render-node paths are meaningless to it
        let device_hint = match backend {
            HwBackend::Nvenc => cfg.hw_device.clone(),
            HwBackend::Qsv | HwBackend::Vaapi => Some(device.clone()),
        };

        let spec = EncoderSpec {
            class: EncoderClass::Hardware,
            encoder,
            backend: Some(backend),
            quality_param: QualityParam::for_backend(Some(backend)),
            quality_value: cfg.quality,
            preset: None,
            device: device_hint,
            attempted,
            fell_back_to_software: false,
        };
        info!("Selected hardware encoder: {}", spec.describe());
        return spec;
    }

    warn!(
        "No hardware encoder available (tried {:?}), falling back to software encoder {}",
        attempted, cfg.software_encoder
    );
    software_spec(cfg, attempted, true)
}

fn software_spec(cfg: &ConvertConfig, attempted: Vec<HwBackend>, fell_back: bool) -> EncoderSpec {
    EncoderSpec {
        class: EncoderClass::Software,
        encoder: cfg.software_encoder.clone(),
        backend: None,
        quality_param: QualityParam::Crf,
        quality_value: cfg.quality,
        preset: Some(cfg.cpu_preset.clone()),
        device: None,
        attempted,
        fell_back_to_software: fell_back,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;

    struct FakeHardware(HashSet<HwBackend>);

    impl HardwareProbe for FakeHardware {
        fn is_present(&self, backend: HwBackend, _device: &Path) -> bool {
            self.0.contains(&backend)
        }
    }

    fn hardware_config() -> ConvertConfig {
        ConvertConfig {
            encoder_class: EncoderClass::Hardware,
            quality: 24,
            ..ConvertConfig::default_config()
        }
    }

    fn caps(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn present(backends: &[HwBackend]) -> FakeHardware {
        FakeHardware(backends.iter().copied().collect())
    }

    #[test]
    fn test_software_class_ignores_hardware() {
        let cfg = ConvertConfig::default_config();
        let spec = resolve_encoder(&cfg, &caps(&["hevc_nvenc"]), &present(&[HwBackend::Nvenc]));

        assert_eq!(spec.class, EncoderClass::Software);
        assert_eq!(spec.encoder, "libx265");
        assert_eq!(spec.quality_param, QualityParam::Crf);
        assert_eq!(spec.preset.as_deref(), Some("medium"));
        assert!(spec.attempted.is_empty());
        assert!(!spec.fell_back_to_software);
    }

    #[test]
    fn test_first_available_backend_wins() {
        let cfg = hardware_config();
        let spec = resolve_encoder(
            &cfg,
            &caps(&["libx265", "hevc_qsv", "hevc_vaapi"]),
            &present(&[HwBackend::Qsv, HwBackend::Vaapi]),
        );

        assert_eq!(spec.encoder, "hevc_qsv");
        assert_eq!(spec.backend, Some(HwBackend::Qsv));
        assert_eq!(spec.quality_param, QualityParam::GlobalQuality);
        assert_eq!(spec.quality_value, 24);
        assert_eq!(spec.attempted, vec![HwBackend::Nvenc, HwBackend::Qsv]);
        assert_eq!(spec.device, Some(PathBuf::from("/dev/dri/renderD128")));
    }

    #[test]
    fn test_present_but_not_advertised_is_skipped() {
        let cfg = hardware_config();
        let spec = resolve_encoder(
            &cfg,
            &caps(&["hevc_vaapi"]),
            &present(&[HwBackend::Nvenc, HwBackend::Vaapi]),
        );

        assert_eq!(spec.encoder, "hevc_vaapi");
        assert_eq!(spec.quality_param, QualityParam::Qp);
    }

    #[test]
    fn test_advertised_but_not_present_is_skipped() {
        let cfg = hardware_config();
        let spec = resolve_encoder(&cfg, &caps(&["hevc_nvenc", "hevc_qsv"]), &present(&[]));

        assert_eq!(spec.class, EncoderClass::Software);
        assert!(spec.fell_back_to_software);
        assert_eq!(spec.attempted, vec![HwBackend::Nvenc, HwBackend::Qsv, HwBackend::Vaapi]);
        assert!(spec.describe().contains("software fallback"));
    }

    #[test]
    fn test_nvenc_uses_configured_hint_only() {
        let mut cfg = hardware_config();
        let spec = resolve_encoder(&cfg, &caps(&["hevc_nvenc"]), &present(&[HwBackend::Nvenc]));
        assert_eq!(spec.quality_param, QualityParam::Cq);
        assert_eq!(spec.device, None);

        cfg.hw_device = Some(PathBuf::from("1"));
        let spec = resolve_encoder(&cfg, &caps(&["hevc_nvenc"]), &present(&[HwBackend::Nvenc]));
        assert_eq!(spec.device, Some(PathBuf::from("1")));
    }

    #[test]
    fn test_encoder_name_follows_target_codec() {
        let mut cfg = hardware_config();
        cfg.target_codec = "av1".into();
        let spec = resolve_encoder(&cfg, &caps(&["av1_vaapi"]), &present(&[HwBackend::Vaapi]));
        assert_eq!(spec.encoder, "av1_vaapi");
    }

    fn backend() -> impl Strategy<Value = HwBackend> {
        prop_oneof![
            Just(HwBackend::Nvenc),
            Just(HwBackend::Qsv),
            Just(HwBackend::Vaapi),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// The configured quality value is carried unchanged whichever encoder is chosen
        #[test]
        fn test_quality_value_preserved(
            quality in 0u8..=63,
            order in proptest::collection::vec(backend(), 0..4),
            available in proptest::sample::subsequence(
                vec![HwBackend::Nvenc, HwBackend::Qsv, HwBackend::Vaapi],
                0..=3,
            ),
        ) {
            let available: HashSet<HwBackend> = available.into_iter().collect();
            let mut cfg = hardware_config();
            cfg.quality = quality;
            cfg.hw_fallback_order = order.clone();
            let all = caps(&["hevc_nvenc", "hevc_qsv", "hevc_vaapi"]);
            let spec = resolve_encoder(&cfg, &all, &FakeHardware(available.clone()));

            prop_assert_eq!(spec.quality_value, quality);
            prop_assert_eq!(spec.quality_param, QualityParam::for_backend(spec.backend));

            // The chosen backend is the first in order that is available
            let expected = order.iter().copied().find(|b| available.contains(b));
            prop_assert_eq!(spec.backend, expected);
            prop_assert_eq!(spec.fell_back_to_software, expected.is_none());
        }
    }
}
