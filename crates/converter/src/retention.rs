//! Size-based retention: keep whichever of original and converted is smaller.

use std::path::PathBuf;
use log::{error, info, warn};
use crate::guard::TempArtifact;
use crate::job::EncodeJob;
use crate::tools::FileOps;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetentionReason {
    /// Converted output is strictly smaller; it replaces the original
    Smaller,
    /// Converted output is equal or larger; it is discarded
    NotSmaller,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetentionDecision {
    pub kept_path: PathBuf,
    /// `None` when nothing was meant to be deleted (originals kept)
    pub deleted_path: Option<PathBuf>,
    pub reason: RetentionReason,
    pub delete_succeeded: bool,
    pub delete_error: Option<String>,
}

impl RetentionDecision {
    /// Both files still exist because a deletion failed
    pub fn is_degraded(&self) -> bool {
        !self.delete_succeeded
    }

    /// Bytes left on disk for this title after the decision
    pub fn retained_size(&self, original_size: u64, converted_size: u64) -> u64 {
        if self.deleted_path.is_none() || !self.delete_succeeded {
            return original_size + converted_size;
        }
        match self.reason {
            RetentionReason::Smaller => converted_size,
            RetentionReason::NotSmaller => original_size,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetentionResult {
    Decided(RetentionDecision),
    /// The converted file could not be moved to its final path; the original
    /// is untouched and the temp artifact has been removed
    MoveFailed { error: String },
}

/// Strict less-than: equal sizes keep the original
pub fn converted_is_smaller(original_size: u64, converted_size: u64) -> bool {
    converted_size < original_size
}

pub struct RetentionPolicy<'a, F> {
    fs: &'a F,
    dry_run: bool,
    keep_originals: bool,
}

impl<'a, F: FileOps> RetentionPolicy<'a, F> {
    pub fn new(fs: &'a F, dry_run: bool, keep_originals: bool) -> Self {
        Self { fs, dry_run, keep_originals }
    }

    /// Resolve a successful encode. Consumes the artifact registration: on
    /// every path the crash guard slot is empty afterwards.
    pub fn apply(
        &self,
        job: &EncodeJob,
        artifact: TempArtifact,
        original_size: u64,
        converted_size: u64,
    ) -> RetentionResult {
        if converted_is_smaller(original_size, converted_size) {
            self.keep_converted(job, artifact)
        } else {
            self.keep_original(job, artifact)
        }
    }

    fn keep_converted(&self, job: &EncodeJob, artifact: TempArtifact) -> RetentionResult {
        let delete_original = !self.keep_originals && !job.is_in_place();
        let deleted_path = (!self.keep_originals).then(|| job.source_path.clone());

        if self.dry_run {
            info!(
                "[dry-run] Would move {} -> {}",
                job.temp_output_path.display(),
                job.final_output_path.display()
            );
            if delete_original {
                info!("[dry-run] Would delete original {}", job.source_path.display());
            }
            artifact.disarm();
            return RetentionResult::Decided(RetentionDecision {
                kept_path: job.final_output_path.clone(),
                deleted_path,
                reason: RetentionReason::Smaller,
                delete_succeeded: true,
                delete_error: None,
            });
        }

        if let Err(e) = self.fs.rename(artifact.path(), &job.final_output_path) {
            error!(
                "Failed to move {} -> {}: {}",
                artifact.path().display(),
                job.final_output_path.display(),
                e
            );
            artifact.discard();
            return RetentionResult::MoveFailed { error: e.to_string() };
        }
        artifact.disarm();
        info!("Moved converted file into place: {}", job.final_output_path.display());

        // In place: the rename already replaced the original
        let (delete_succeeded, delete_error) = if delete_original {
            match self.fs.remove_file(&job.source_path) {
                Ok(()) => {
                    info!("Deleted original: {}", job.source_path.display());
                    (true, None)
                }
                Err(e) => {
                    error!(
                        "Failed to delete original {}: {}. Both files now exist; remove one manually.",
                        job.source_path.display(),
                        e
                    );
                    (false, Some(e.to_string()))
                }
            }
        } else {
            (true, None)
        };

        RetentionResult::Decided(RetentionDecision {
            kept_path: job.final_output_path.clone(),
            deleted_path,
            reason: RetentionReason::Smaller,
            delete_succeeded,
            delete_error,
        })
    }

    fn keep_original(&self, job: &EncodeJob, artifact: TempArtifact) -> RetentionResult {
        let temp = artifact.path().to_path_buf();

        if self.dry_run {
            info!("[dry-run] Would delete converted output {}", temp.display());
            artifact.disarm();
            return RetentionResult::Decided(RetentionDecision {
                kept_path: job.source_path.clone(),
                deleted_path: Some(temp),
                reason: RetentionReason::NotSmaller,
                delete_succeeded: true,
                delete_error: None,
            });
        }

        let (delete_succeeded, delete_error) = match self.fs.remove_file(&temp) {
            Ok(()) => {
                info!("Discarded converted output (not smaller): {}", temp.display());
                (true, None)
            }
            Err(e) => {
                error!(
                    "Failed to delete converted output {}: {}. Remove it manually.",
                    temp.display(),
                    e
                );
                (false, Some(e.to_string()))
            }
        };
        // Stop tracking either way; a failed delete is reported, not retried on exit
        artifact.disarm();
        if !delete_succeeded {
            warn!("Original kept at {}", job.source_path.display());
        }

        RetentionResult::Decided(RetentionDecision {
            kept_path: job.source_path.clone(),
            deleted_path: Some(temp),
            reason: RetentionReason::NotSmaller,
            delete_succeeded,
            delete_error,
        })
    }
}
