//! Seams to the outside world: media tools and filesystem mutations.

use std::collections::BTreeSet;
use std::ffi::OsString;
use std::io;
use std::path::Path;
use anyhow::Result;

/// How an encode process ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodeExit {
    pub success: bool,
    pub exit_code: Option<i32>,
    /// Last lines of stderr, for failure diagnostics
    pub stderr_tail: String,
}

impl EncodeExit {
    pub fn ok() -> Self {
        Self {
            success: true,
            exit_code: Some(0),
            stderr_tail: String::new(),
        }
    }

    pub fn failed(exit_code: i32, stderr_tail: impl Into<String>) -> Self {
        Self {
            success: false,
            exit_code: Some(exit_code),
            stderr_tail: stderr_tail.into(),
        }
    }
}

/// External probe/encode capabilities
#[allow(async_fn_in_trait)]
pub trait MediaTools {
    /// Codec name of the primary video stream; `Ok(None)` when there is none
    async fn probe_codec(&self, path: &Path) -> Result<Option<String>>;

    /// Encoder identifiers the encode tool advertises
    async fn encoder_capabilities(&self) -> Result<BTreeSet<String>>;

    /// Run one encode with a prepared argument list. Dropping the future must
    /// terminate the underlying process.
    async fn encode(&self, args: &[OsString]) -> Result<EncodeExit>;
}

/// Filesystem mutations used by retention and the executor
pub trait FileOps {
    fn file_size(&self, path: &Path) -> io::Result<u64>;
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;
    fn remove_file(&self, path: &Path) -> io::Result<()>;
}

/// `std::fs` backed implementation
#[derive(Debug, Clone, Copy, Default)]
pub struct StdFs;

impl FileOps for StdFs {
    fn file_size(&self, path: &Path) -> io::Result<u64> {
        std::fs::metadata(path).map(|m| m.len())
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        std::fs::rename(from, to)
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        std::fs::remove_file(path)
    }
}
