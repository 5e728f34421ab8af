use std::ffi::OsString;
use crate::config::HwBackend;
use crate::encoder::EncoderSpec;
use crate::job::EncodeJob;

/// Builds ffmpeg argument lists from an `EncodeJob`.
///
/// Arguments are kept as separate `OsString`s end to end; nothing is ever
/// joined into a shell string.
pub struct CommandBuilder<'a> {
    args: Vec<OsString>,
    spec: &'a EncoderSpec,
}

impl<'a> CommandBuilder<'a> {
    fn new(spec: &'a EncoderSpec) -> Self {
        Self { args: Vec::new(), spec }
    }

    fn push(&mut self, arg: impl Into<OsString>) -> &mut Self {
        self.args.push(arg.into());
        self
    }

    fn pair(&mut self, flag: &str, value: impl Into<OsString>) -> &mut Self {
        self.push(flag).push(value)
    }

    /// Device setup that must precede `-i`
    fn input_device(&mut self) {
        let device = match &self.spec.device {
            Some(d) => d.clone(),
            None => return,
        };
        match self.spec.backend {
            Some(HwBackend::Vaapi) => {
                self.pair("-vaapi_device", device);
            }
            Some(HwBackend::Qsv) => {
                self.pair("-qsv_device", device);
            }
            Some(HwBackend::Nvenc) | None => {}
        }
    }

    fn video_codec(&mut self) {
        let spec = self.spec;
        if spec.backend == Some(HwBackend::Vaapi) {
            // VAAPI encoders take hardware surfaces
            self.pair("-vf", "format=nv12,hwupload");
        }

        self.pair("-c:v", spec.encoder.as_str());

        match spec.backend {
            None => {
                if let Some(preset) = &spec.preset {
                    self.pair("-preset", preset.as_str());
                }
            }
            Some(HwBackend::Nvenc) => {
                self.pair("-rc", "vbr").pair("-b:v", "0");
                if let Some(gpu) = spec
                    .device
                    .as_deref()
                    .and_then(|d| d.to_str())
                    .and_then(|d| d.parse::<u32>().ok())
                {
                    self.pair("-gpu", gpu.to_string());
                }
            }
            Some(HwBackend::Qsv) => {}
            Some(HwBackend::Vaapi) => {
                self.pair("-rc_mode", "CQP");
            }
        }

        self.pair(spec.quality_param.flag(), spec.quality_value.to_string());
    }
}

/// Full argument list for converting `job.source_path` into `job.temp_output_path`
pub fn build_encode_args(job: &EncodeJob) -> Vec<OsString> {
    let mut b = CommandBuilder::new(&job.encoder_spec);

    b.push("-hide_banner")
        .push("-nostdin")
        .pair("-loglevel", "error")
        .push("-y");

    b.input_device();
    b.pair("-i", job.source_path.as_os_str());

    // Every stream from the input; only video is re-encoded
    b.pair("-map", "0");
    b.video_codec();
    b.pair("-c:a", "copy").pair("-c:s", "copy");
    b.pair("-max_muxing_queue_size", "1024");

    b.push(job.temp_output_path.as_os_str());
    b.args
}
