pub mod audit;
pub mod classifier;
pub mod command;
pub mod config;
pub mod encoder;
pub mod executor;
pub mod ffmpeg;
pub mod ffprobe;
pub mod guard;
pub mod job;
pub mod pipeline;
pub mod retention;
pub mod scan;
pub mod stats;
pub mod tools;

pub use config::{ConfigError, ConvertConfig, EncoderClass, HwBackend};
pub use encoder::{EncoderSpec, HardwareProbe, SystemHardware};
pub use ffmpeg::FfmpegTools;
pub use guard::CrashGuard;
pub use pipeline::Converter;
pub use stats::{Outcome, RunReport, RunStats};
pub use tools::{FileOps, MediaTools, StdFs};
