//! Per-run controller: discovery, classification, encode, retention and
//! accounting for one file at a time.

use std::collections::BTreeSet;
use std::time::Duration;
use anyhow::{Context, Result};
use humansize::{format_size, BINARY};
use log::{debug, info, warn};
use crate::audit::{AuditLog, AuditRecord};
use crate::classifier::{classify_candidate, CodecClass, Eligibility};
use crate::config::{ConvertConfig, EncoderClass};
use crate::encoder::{resolve_encoder, EncoderSpec, HardwareProbe};
use crate::executor::{EncodeStatus, Executor};
use crate::guard::{cleanup_orphaned_artifacts, CrashGuard};
use crate::job::{CandidateFile, EncodeJob, RunToken};
use crate::retention::{RetentionPolicy, RetentionReason, RetentionResult};
use crate::scan::discover;
use crate::stats::{ComparedSizes, Outcome, RunReport, RunStats};
use crate::tools::{FileOps, MediaTools, StdFs};

pub struct Converter<T, F, H> {
    cfg: ConvertConfig,
    tools: T,
    fs: F,
    hardware: H,
    guard: CrashGuard,
    stats: RunStats,
    audit: AuditLog,
    token: RunToken,
    /// Resolved on the first source-codec file, then reused
    encoder: Option<EncoderSpec>,
}

impl<T: MediaTools, F: FileOps, H: HardwareProbe> Converter<T, F, H> {
    /// `cfg` is expected to have passed `ConvertConfig::validate`
    pub fn new(cfg: ConvertConfig, tools: T, fs: F, hardware: H, audit: AuditLog) -> Self {
        let guard = CrashGuard::new(cfg.dry_run);
        Self {
            cfg,
            tools,
            fs,
            hardware,
            guard,
            stats: RunStats::new(),
            audit,
            token: RunToken::generate(),
            encoder: None,
        }
    }

    /// Handle to the crash guard, for a last sweep after the run is dropped
    pub fn crash_guard(&self) -> CrashGuard {
        self.guard.clone()
    }

    pub fn stats(&self) -> &RunStats {
        &self.stats
    }

    /// Process every candidate under the root, sequentially.
    ///
    /// Only setup problems (unreadable root) are errors; per file failures
    /// end up in the stats and the audit trail.
    pub async fn run(&mut self) -> Result<RunReport> {
        if self.cfg.dry_run {
            info!("Dry run: no encoder will be started and no file will be changed");
        }

        if self.cfg.cleanup_orphans {
            let root = self.cfg.root.clone();
            let dry_run = self.cfg.dry_run;
            let min_age = Duration::from_secs(self.cfg.orphan_min_age_secs);
            let cleaned = tokio::task::spawn_blocking(move || {
                cleanup_orphaned_artifacts(&root, dry_run, min_age, &StdFs)
            })
            .await;
            match cleaned {
                Ok(0) => debug!("No orphaned temp artifacts found"),
                Ok(n) => info!("Cleaned {} orphaned temp artifact(s)", n),
                Err(e) => warn!("Orphan cleanup task failed: {}", e),
            }
        }

        let candidates = tokio::task::spawn_blocking({
            let root = self.cfg.root.clone();
            let extensions = self.cfg.extensions.clone();
            move || discover(&root, &extensions)
        })
        .await
        .context("Discovery task failed")??;
        if candidates.is_empty() {
            info!("No matching files under {}, nothing to do", self.cfg.root.display());
            return Ok(self.stats.report());
        }
        info!("Found {} candidate file(s) under {}", candidates.len(), self.cfg.root.display());

        let total = candidates.len();
        for (i, candidate) in candidates.iter().enumerate() {
            info!(
                "[{}/{}] {} ({})",
                i + 1,
                total,
                candidate.path.display(),
                format_size(candidate.size_bytes, BINARY)
            );
            self.process_file(candidate).await;
            debug_assert!(self.guard.current().is_none());
        }

        Ok(self.stats.report())
    }

    async fn process_file(&mut self, candidate: &CandidateFile) {
        self.stats.record_checked();

        let eligibility = classify_candidate(&self.tools, candidate, &self.cfg).await;
        let final_output_path = match eligibility {
            Eligibility::Convert { final_output_path } => final_output_path,
            Eligibility::Skip { class, note } => {
                let outcome = match class {
                    CodecClass::Target => Outcome::SkippedTarget,
                    CodecClass::Unknown => Outcome::SkippedUnknown,
                    CodecClass::Other(_) | CodecClass::Source => Outcome::SkippedOther,
                };
                info!("Skipping {}: {}", candidate.path.display(), note);
                self.finish(AuditRecord::new(&candidate.path, candidate.size_bytes, outcome, note), None);
                return;
            }
            Eligibility::AlreadyConverted { final_output_path } => {
                self.stats.record_source_identified();
                let existing = self.fs.file_size(&final_output_path).unwrap_or(0);
                let record = AuditRecord::new(
                    &candidate.path,
                    candidate.size_bytes,
                    Outcome::SkippedAlreadyConverted,
                    format!("{} output already present", self.cfg.target_codec),
                )
                .with_converted(&final_output_path, existing, false);
                self.finish(record, None);
                return;
            }
            Eligibility::Conflict { final_output_path, existing } => {
                self.stats.record_source_identified();
                let record = AuditRecord::new(
                    &candidate.path,
                    candidate.size_bytes,
                    Outcome::SkippedConflict,
                    format!("{} occupied by {} file", final_output_path.display(), existing),
                );
                self.finish(record, None);
                return;
            }
        };

        self.stats.record_source_identified();
        let spec = self.encoder_spec().await;
        let job = EncodeJob::new(candidate.path.clone(), final_output_path, &self.token, spec);
        let original_size = candidate.size_bytes;

        let executed = Executor::new(&self.tools, &self.fs, &self.guard, self.cfg.dry_run)
            .run(&job, original_size)
            .await;
        let converted_size = executed.outcome.produced_size_bytes;

        let Some(artifact) = executed.artifact else {
            let note = executed
                .outcome
                .detail
                .unwrap_or_else(|| executed.outcome.status.as_str().to_string());
            let record = AuditRecord::new(&job.source_path, original_size, Outcome::FailedConversion, note);
            self.finish(record, None);
            return;
        };

        let policy = RetentionPolicy::new(&self.fs, self.cfg.dry_run, self.cfg.keep_originals);
        match policy.apply(&job, artifact, original_size, converted_size) {
            RetentionResult::MoveFailed { error } => {
                let note = format!("{}: {}", EncodeStatus::MoveFailed.as_str(), error);
                let record = AuditRecord::new(&job.source_path, original_size, Outcome::FailedMove, note)
                    .with_converted(&job.temp_output_path, converted_size, false);
                self.finish(record, None);
            }
            RetentionResult::Decided(decision) => {
                let retained = decision.retained_size(original_size, converted_size);
                let (outcome, converted_path) = match decision.reason {
                    RetentionReason::Smaller => (Outcome::KeptAfterConversion, &job.final_output_path),
                    RetentionReason::NotSmaller => (Outcome::RevertedNotSmaller, &job.temp_output_path),
                };
                let (outcome, note) = match decision.delete_error {
                    Some(err) => (Outcome::FailedDeletion, format!("delete failed: {}", err)),
                    None => (outcome, job.encoder_spec.describe()),
                };
                let record = AuditRecord::new(&job.source_path, original_size, outcome, note)
                    .with_converted(converted_path, converted_size, true);
                let sizes = ComparedSizes { original: original_size, retained };
                self.finish(record, Some(sizes));
            }
        }
    }

    /// Record the terminal state of the current file
    fn finish(&mut self, record: AuditRecord, sizes: Option<ComparedSizes>) {
        self.stats.record(record.status, sizes);
        self.audit.emit(&record);
    }

    async fn encoder_spec(&mut self) -> EncoderSpec {
        if let Some(spec) = &self.encoder {
            return spec.clone();
        }

        let capabilities = if self.cfg.encoder_class == EncoderClass::Hardware {
            match self.tools.encoder_capabilities().await {
                Ok(caps) => caps,
                Err(e) => {
                    warn!("Could not list encoders, treating hardware as unavailable: {:#}", e);
                    BTreeSet::new()
                }
            }
        } else {
            BTreeSet::new()
        };

        let spec = resolve_encoder(&self.cfg, &capabilities, &self.hardware);
        self.encoder = Some(spec.clone());
        spec
    }
}
