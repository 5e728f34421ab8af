use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use humansize::{format_size, BINARY};
use serde::Serialize;
use crate::stats::{percent_saved, Outcome};

/// One line of the per-file audit trail
#[derive(Debug, Clone, Serialize)]
pub struct AuditRecord {
    pub timestamp: DateTime<Utc>,
    pub original_path: PathBuf,
    pub original_size: u64,
    pub converted_path: Option<PathBuf>,
    pub converted_size: Option<u64>,
    pub status: Outcome,
    pub reduction_percent: Option<f64>,
    pub notes: String,
}

impl AuditRecord {
    pub fn new(original_path: &Path, original_size: u64, status: Outcome, notes: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            original_path: original_path.to_path_buf(),
            original_size,
            converted_path: None,
            converted_size: None,
            status,
            reduction_percent: None,
            notes: notes.into(),
        }
    }

    /// Attach the converted file; the reduction is only meaningful when the
    /// two sizes were actually compared
    pub fn with_converted(mut self, path: &Path, size: u64, compared: bool) -> Self {
        self.converted_path = Some(path.to_path_buf());
        self.converted_size = Some(size);
        if compared {
            self.reduction_percent = Some(percent_saved(self.original_size, size));
        }
        self
    }
}

impl fmt::Display for AuditRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} | {} | {} | ",
            self.timestamp.format("%Y-%m-%d %H:%M:%S"),
            self.original_path.display(),
            format_size(self.original_size, BINARY)
        )?;
        match &self.converted_path {
            Some(p) => write!(f, "{} | ", p.display())?,
            None => write!(f, "N/A | ")?,
        }
        match self.converted_size {
            Some(s) => write!(f, "{} | ", format_size(s, BINARY))?,
            None => write!(f, "N/A | ")?,
        }
        write!(f, "{}", self.status)?;
        if let Some(pct) = self.reduction_percent {
            write!(f, " | {:.1}%", pct)?;
        }
        if !self.notes.is_empty() {
            write!(f, " | {}", self.notes)?;
        }
        Ok(())
    }
}

/// Appends audit records as JSON lines
pub struct AuditLog {
    writer: Option<BufWriter<File>>,
}

impl AuditLog {
    /// Log-only sink
    pub fn disabled() -> Self {
        Self { writer: None }
    }

    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create audit log directory: {}", parent.display()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open audit log: {}", path.display()))?;
        Ok(Self { writer: Some(BufWriter::new(file)) })
    }

    /// Log the record and append it to the file, if one is configured.
    /// A write failure is logged, never fatal for the run.
    pub fn emit(&mut self, record: &AuditRecord) {
        if record.status.is_failure() {
            log::error!("AUDIT {}", record);
        } else {
            log::info!("AUDIT {}", record);
        }

        if let Some(writer) = self.writer.as_mut() {
            let result = serde_json::to_writer(&mut *writer, record)
                .map_err(std::io::Error::from)
                .and_then(|_| writer.write_all(b"\n"))
                .and_then(|_| writer.flush());
            if let Err(e) = result {
                log::warn!("Failed to write audit record: {}", e);
            }
        }
    }
}
