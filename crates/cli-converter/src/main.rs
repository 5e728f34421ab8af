use anyhow::{Context, Result};
use clap::Parser;
use converter::{
    audit::AuditLog, config::EncoderClass, ConvertConfig, Converter, FfmpegTools, RunReport, StdFs,
    SystemHardware,
};
use log::{error, info, warn};
use std::path::PathBuf;
use tokio::signal;

/// Exit code for a run cut short by SIGINT/SIGTERM
const EXIT_INTERRUPTED: i32 = 130;

/// Batch-convert videos to another codec and keep whichever file is smaller
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Directory to scan (overrides the config file)
    root: Option<PathBuf>,

    /// Path to configuration file (JSON or TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Report what would happen without encoding or touching any file
    #[arg(long)]
    dry_run: bool,

    /// Keep originals next to smaller conversions
    #[arg(long)]
    keep_originals: bool,

    /// Encoder class
    #[arg(long, value_enum)]
    encoder: Option<EncoderArg>,

    /// Quality value (CRF / CQ / global_quality / QP depending on encoder)
    #[arg(long)]
    quality: Option<u8>,

    /// Software encoder preset
    #[arg(long)]
    preset: Option<String>,

    /// Hardware device: render node for VAAPI/QSV, GPU index for NVENC
    #[arg(long)]
    device: Option<PathBuf>,

    /// Append a JSON line per file to this audit log
    #[arg(long)]
    audit_log: Option<PathBuf>,

    /// Skip removal of temp artifacts left by earlier runs
    #[arg(long)]
    no_cleanup: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum EncoderArg {
    Software,
    Hardware,
}

impl Args {
    fn apply(&self, cfg: &mut ConvertConfig) {
        if let Some(root) = &self.root {
            cfg.root = root.clone();
        }
        if self.dry_run {
            cfg.dry_run = true;
        }
        if self.keep_originals {
            cfg.keep_originals = true;
        }
        if let Some(encoder) = self.encoder {
            cfg.encoder_class = match encoder {
                EncoderArg::Software => EncoderClass::Software,
                EncoderArg::Hardware => EncoderClass::Hardware,
            };
        }
        if let Some(quality) = self.quality {
            cfg.quality = quality;
        }
        if let Some(preset) = &self.preset {
            cfg.cpu_preset = preset.clone();
        }
        if let Some(device) = &self.device {
            cfg.hw_device = Some(device.clone());
        }
        if let Some(audit_log) = &self.audit_log {
            cfg.audit_log = Some(audit_log.clone());
        }
        if self.no_cleanup {
            cfg.cleanup_orphans = false;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // RUST_LOG wins; otherwise info, or debug with --verbose
    let default_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp_secs()
        .init();

    let mut cfg = ConvertConfig::load_config(args.config.as_deref())
        .context("Failed to load configuration")?;
    args.apply(&mut cfg);
    cfg.validate().context("Invalid configuration")?;

    info!("recodec starting");
    info!("  Root: {}", cfg.root.display());
    info!("  Extensions: {:?}", cfg.extensions);
    info!("  Converting: {} -> {}", cfg.source_codec, cfg.target_codec);
    info!("  Encoder class: {}", cfg.encoder_class);
    if cfg.keep_originals {
        info!("  Keeping originals");
    }

    let audit = match &cfg.audit_log {
        Some(path) => AuditLog::open(path)?,
        None => AuditLog::disabled(),
    };

    let tools = FfmpegTools::new(&cfg);
    let mut converter = Converter::new(cfg, tools, StdFs, SystemHardware, audit);
    let guard = converter.crash_guard();

    let (result, interrupted) = tokio::select! {
        result = converter.run() => (Some(result), false),
        _ = shutdown_signal() => (None, true),
    };

    // The run future is gone by now; anything still registered is swept here
    if let Some(path) = guard.sweep() {
        warn!("Removed in-flight temp artifact on exit: {}", path.display());
    }

    if interrupted {
        warn!("Interrupted, stopping after cleanup");
        print_report(&converter.stats().report());
        std::process::exit(EXIT_INTERRUPTED);
    }

    match result {
        Some(Ok(report)) => {
            print_report(&report);
            Ok(())
        }
        Some(Err(e)) => {
            error!("Run aborted: {:#}", e);
            print_report(&converter.stats().report());
            Err(e)
        }
        None => Ok(()),
    }
}

fn print_report(report: &RunReport) {
    println!("{}", report);
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
