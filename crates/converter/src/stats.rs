//! Run accounting and the final report.

use std::fmt;
use serde::Serialize;

/// Terminal state of one discovered file. Each maps to exactly one counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    SkippedTarget,
    SkippedAlreadyConverted,
    SkippedOther,
    SkippedUnknown,
    SkippedConflict,
    KeptAfterConversion,
    RevertedNotSmaller,
    FailedConversion,
    FailedMove,
    FailedDeletion,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::SkippedTarget => "skipped_target",
            Outcome::SkippedAlreadyConverted => "skipped_already_converted",
            Outcome::SkippedOther => "skipped_other",
            Outcome::SkippedUnknown => "skipped_unknown",
            Outcome::SkippedConflict => "skipped_conflict",
            Outcome::KeptAfterConversion => "kept_after_conversion",
            Outcome::RevertedNotSmaller => "reverted_not_smaller",
            Outcome::FailedConversion => "failed_conversion",
            Outcome::FailedMove => "failed_move",
            Outcome::FailedDeletion => "failed_deletion",
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            Outcome::FailedConversion | Outcome::FailedMove | Outcome::FailedDeletion
        )
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sizes of a compared (original, converted) pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComparedSizes {
    pub original: u64,
    /// Size of the file that now stands for this title
    pub retained: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    pub checked: u64,
    pub source_identified: u64,
    pub skipped_target: u64,
    pub skipped_already_converted: u64,
    pub skipped_other: u64,
    pub skipped_unknown: u64,
    pub skipped_conflict: u64,
    pub kept_after_conversion: u64,
    pub reverted_not_smaller: u64,
    pub failed_conversions: u64,
    pub failed_moves: u64,
    pub failed_deletions: u64,
    pub total_original_bytes: u64,
    pub total_converted_bytes: u64,
}

impl RunStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// A file was taken from the discovery list
    pub fn record_checked(&mut self) {
        self.checked += 1;
    }

    pub fn record_source_identified(&mut self) {
        self.source_identified += 1;
    }

    /// Record a file's terminal state, with sizes when a comparison happened
    pub fn record(&mut self, outcome: Outcome, sizes: Option<ComparedSizes>) {
        let counter = match outcome {
            Outcome::SkippedTarget => &mut self.skipped_target,
            Outcome::SkippedAlreadyConverted => &mut self.skipped_already_converted,
            Outcome::SkippedOther => &mut self.skipped_other,
            Outcome::SkippedUnknown => &mut self.skipped_unknown,
            Outcome::SkippedConflict => &mut self.skipped_conflict,
            Outcome::KeptAfterConversion => &mut self.kept_after_conversion,
            Outcome::RevertedNotSmaller => &mut self.reverted_not_smaller,
            Outcome::FailedConversion => &mut self.failed_conversions,
            Outcome::FailedMove => &mut self.failed_moves,
            Outcome::FailedDeletion => &mut self.failed_deletions,
        };
        *counter += 1;

        if let Some(sizes) = sizes {
            self.total_original_bytes += sizes.original;
            self.total_converted_bytes += sizes.retained;
        }
    }

    /// Sum of all terminal buckets; equals `checked` once a run completes
    pub fn terminal_total(&self) -> u64 {
        self.skipped_target
            + self.skipped_already_converted
            + self.skipped_other
            + self.skipped_unknown
            + self.skipped_conflict
            + self.kept_after_conversion
            + self.reverted_not_smaller
            + self.failed_conversions
            + self.failed_moves
            + self.failed_deletions
    }

    /// Files taken from the list that never reached a terminal state; only
    /// non-zero when a run was cut short
    pub fn unfinished(&self) -> u64 {
        self.checked.saturating_sub(self.terminal_total())
    }

    pub fn failures(&self) -> u64 {
        self.failed_conversions + self.failed_moves + self.failed_deletions
    }

    pub fn report(&self) -> RunReport {
        RunReport {
            stats: self.clone(),
            unfinished: self.unfinished(),
            total_original_mb: bytes_to_mb(self.total_original_bytes),
            total_converted_mb: bytes_to_mb(self.total_converted_bytes),
            percent_saved: percent_saved(self.total_original_bytes, self.total_converted_bytes),
        }
    }
}

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

pub fn bytes_to_mb(bytes: u64) -> f64 {
    bytes as f64 / BYTES_PER_MB
}

/// `(1 - converted/original) * 100`, 0 when nothing was compared
pub fn percent_saved(original: u64, converted: u64) -> f64 {
    if original == 0 {
        return 0.0;
    }
    (1.0 - converted as f64 / original as f64) * 100.0
}

/// Final report rendered at the end of a run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    #[serde(flatten)]
    pub stats: RunStats,
    pub unfinished: u64,
    pub total_original_mb: f64,
    pub total_converted_mb: f64,
    pub percent_saved: f64,
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = &self.stats;
        writeln!(f, "Run summary")?;
        writeln!(f, "  Files checked:              {}", s.checked)?;
        writeln!(f, "  Source codec identified:    {}", s.source_identified)?;
        writeln!(f, "  Skipped (target codec):     {}", s.skipped_target)?;
        writeln!(f, "  Skipped (already converted): {}", s.skipped_already_converted)?;
        writeln!(f, "  Skipped (other codec):      {}", s.skipped_other)?;
        writeln!(f, "  Skipped (unknown codec):    {}", s.skipped_unknown)?;
        writeln!(f, "  Skipped (output conflict):  {}", s.skipped_conflict)?;
        writeln!(f, "  Kept after conversion:      {}", s.kept_after_conversion)?;
        writeln!(f, "  Reverted (not smaller):     {}", s.reverted_not_smaller)?;
        writeln!(f, "  Failed conversions:         {}", s.failed_conversions)?;
        writeln!(f, "  Failed moves:               {}", s.failed_moves)?;
        writeln!(f, "  Failed deletions:           {}", s.failed_deletions)?;
        writeln!(f, "  Total original:             {:.2} MB", self.total_original_mb)?;
        writeln!(f, "  Total after conversion:     {:.2} MB", self.total_converted_mb)?;
        write!(f, "  Space saved:                {:.1}%", self.percent_saved)?;
        if self.unfinished > 0 {
            write!(
                f,
                "\n  INTERRUPTED: {} file(s) were in progress and have no result",
                self.unfinished
            )?;
        }
        if s.failed_deletions > 0 {
            write!(
                f,
                "\n  WARNING: {} file(s) left both original and converted copies; clean up manually",
                s.failed_deletions
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const ALL: [Outcome; 10] = [
        Outcome::SkippedTarget,
        Outcome::SkippedAlreadyConverted,
        Outcome::SkippedOther,
        Outcome::SkippedUnknown,
        Outcome::SkippedConflict,
        Outcome::KeptAfterConversion,
        Outcome::RevertedNotSmaller,
        Outcome::FailedConversion,
        Outcome::FailedMove,
        Outcome::FailedDeletion,
    ];

    #[test]
    fn test_percent_saved_guards_zero() {
        assert_eq!(percent_saved(0, 0), 0.0);
        assert_eq!(percent_saved(0, 10), 0.0);
        assert_eq!(percent_saved(100, 60), 40.0);
        assert_eq!(percent_saved(100, 100), 0.0);
    }

    #[test]
    fn test_report_totals() {
        let mut stats = RunStats::new();
        for _ in 0..3 {
            stats.record_checked();
        }
        stats.record(Outcome::KeptAfterConversion, Some(ComparedSizes { original: 100 * 1024 * 1024, retained: 60 * 1024 * 1024 }));
        stats.record(Outcome::RevertedNotSmaller, Some(ComparedSizes { original: 50 * 1024 * 1024, retained: 50 * 1024 * 1024 }));
        stats.record(Outcome::SkippedTarget, None);

        let report = stats.report();
        assert_eq!(report.total_original_mb, 150.0);
        assert_eq!(report.total_converted_mb, 110.0);
        assert!((report.percent_saved - 26.666).abs() < 0.01);
        assert_eq!(stats.terminal_total(), stats.checked);

        let text = report.to_string();
        assert!(text.contains("Files checked:              3"));
        assert!(text.contains("Space saved:                26.7%"));
        assert!(!text.contains("WARNING"));
    }

    #[test]
    fn test_report_flags_failed_deletions() {
        let mut stats = RunStats::new();
        stats.record_checked();
        stats.record(Outcome::FailedDeletion, Some(ComparedSizes { original: 10, retained: 5 }));
        assert_eq!(stats.failures(), 1);
        assert!(stats.report().to_string().contains("WARNING: 1 file(s)"));
    }

    #[test]
    fn test_report_marks_unfinished_files() {
        let mut stats = RunStats::new();
        stats.record_checked();
        stats.record(Outcome::SkippedTarget, None);
        stats.record_checked();

        let report = stats.report();
        assert_eq!(report.unfinished, 1);
        assert_eq!(report.stats.terminal_total() + report.unfinished, report.stats.checked);
        assert!(report.to_string().contains("INTERRUPTED: 1 file(s)"));

        stats.record(Outcome::FailedConversion, None);
        assert_eq!(stats.unfinished(), 0);
        assert!(!stats.report().to_string().contains("INTERRUPTED"));
    }

    #[test]
    fn test_report_serializes_flat() {
        let report = RunStats::new().report();
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["checked"], 0);
        assert_eq!(json["percent_saved"], 0.0);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Every recorded outcome lands in exactly one bucket
        #[test]
        fn test_buckets_sum_to_checked(picks in proptest::collection::vec(0usize..ALL.len(), 0..200)) {
            let mut stats = RunStats::new();
            for &i in &picks {
                stats.record_checked();
                stats.record(ALL[i], None);
            }
            prop_assert_eq!(stats.terminal_total(), picks.len() as u64);
            prop_assert_eq!(stats.terminal_total(), stats.checked);
        }

        #[test]
        fn test_percent_saved_bounds(original in 1u64..u32::MAX as u64, converted in 0u64..u32::MAX as u64) {
            let pct = percent_saved(original, converted);
            prop_assert!(pct <= 100.0);
            prop_assert_eq!(pct > 0.0, converted < original);
        }
    }
}
