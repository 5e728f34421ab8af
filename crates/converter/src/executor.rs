use log::{debug, error, info};
use crate::command::build_encode_args;
use crate::guard::{CrashGuard, TempArtifact};
use crate::job::EncodeJob;
use crate::tools::{FileOps, MediaTools};

/// How an encode attempt ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodeStatus {
    Succeeded,
    ProcessFailed,
    EmptyOutput,
    /// Encode succeeded but retention could not move the result into place
    MoveFailed,
}

impl EncodeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EncodeStatus::Succeeded => "succeeded",
            EncodeStatus::ProcessFailed => "process_failed",
            EncodeStatus::EmptyOutput => "empty_output",
            EncodeStatus::MoveFailed => "move_failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodeOutcome {
    pub status: EncodeStatus,
    pub produced_size_bytes: u64,
    /// Failure detail for logs and the audit record
    pub detail: Option<String>,
}

impl EncodeOutcome {
    fn failed(status: EncodeStatus, detail: String) -> Self {
        Self {
            status,
            produced_size_bytes: 0,
            detail: Some(detail),
        }
    }
}

/// Result of running one job. `artifact` is present only on success and
/// still holds the crash-guard registration for retention to resolve.
#[derive(Debug)]
pub struct Executed {
    pub outcome: EncodeOutcome,
    pub artifact: Option<TempArtifact>,
}

/// Size reported for a simulated encode
pub fn dry_run_size(original_size: u64) -> u64 {
    (original_size / 2).max(1)
}

/// Runs the external encode for a job and validates what it produced
pub struct Executor<'a, T, F> {
    tools: &'a T,
    fs: &'a F,
    guard: &'a CrashGuard,
    dry_run: bool,
}

impl<'a, T: MediaTools, F: FileOps> Executor<'a, T, F> {
    pub fn new(tools: &'a T, fs: &'a F, guard: &'a CrashGuard, dry_run: bool) -> Self {
        Self { tools, fs, guard, dry_run }
    }

    pub async fn run(&self, job: &EncodeJob, original_size: u64) -> Executed {
        let artifact = self.guard.arm(job.temp_output_path.clone());

        if self.dry_run {
            let size = dry_run_size(original_size);
            info!(
                "[dry-run] Would encode {} -> {} with {} (simulated size {} bytes)",
                job.source_path.display(),
                job.temp_output_path.display(),
                job.encoder_spec.describe(),
                size
            );
            return Executed {
                outcome: EncodeOutcome {
                    status: EncodeStatus::Succeeded,
                    produced_size_bytes: size,
                    detail: None,
                },
                artifact: Some(artifact),
            };
        }

        info!(
            "Encoding {} with {}",
            job.source_path.display(),
            job.encoder_spec.describe()
        );
        let args = build_encode_args(job);

        let exit = match self.tools.encode(&args).await {
            Ok(exit) => exit,
            Err(e) => {
                error!("Failed to run encoder for {}: {:#}", job.source_path.display(), e);
                artifact.discard();
                return Executed {
                    outcome: EncodeOutcome::failed(EncodeStatus::ProcessFailed, format!("{:#}", e)),
                    artifact: None,
                };
            }
        };

        if !exit.success {
            let code = exit.exit_code.map_or("signal".to_string(), |c| c.to_string());
            error!(
                "Encoder failed for {} (exit code {}):\n{}",
                job.source_path.display(),
                code,
                exit.stderr_tail
            );
            artifact.discard();
            return Executed {
                outcome: EncodeOutcome::failed(
                    EncodeStatus::ProcessFailed,
                    format!("encoder exit code {}", code),
                ),
                artifact: None,
            };
        }

        // A clean exit is not proof of output
        match self.fs.file_size(artifact.path()) {
            Ok(size) if size > 0 => {
                debug!("Encoder produced {} bytes at {}", size, artifact.path().display());
                Executed {
                    outcome: EncodeOutcome {
                        status: EncodeStatus::Succeeded,
                        produced_size_bytes: size,
                        detail: None,
                    },
                    artifact: Some(artifact),
                }
            }
            Ok(_) => {
                error!("Encoder reported success but output is empty: {}", artifact.path().display());
                artifact.discard();
                Executed {
                    outcome: EncodeOutcome::failed(EncodeStatus::EmptyOutput, "output file is empty".into()),
                    artifact: None,
                }
            }
            Err(e) => {
                error!(
                    "Encoder reported success but output is missing: {} ({})",
                    artifact.path().display(),
                    e
                );
                artifact.discard();
                Executed {
                    outcome: EncodeOutcome::failed(EncodeStatus::EmptyOutput, "output file is missing".into()),
                    artifact: None,
                }
            }
        }
    }
}
