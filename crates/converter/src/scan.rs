use std::path::Path;
use anyhow::Result;
use walkdir::WalkDir;
use log::{debug, info, warn};
use crate::config::ConfigError;
use crate::job::{is_temp_artifact, CandidateFile};
use crate::tools::{FileOps, StdFs};

/// Walk `root` and return every file whose extension is in the allowlist,
/// sorted by full path.
///
/// Matching is case-insensitive; `extensions` is expected lowercased (as
/// `ConvertConfig::validate` leaves it). Temp artifacts of this tool are never
/// returned. No matches is an empty list, not an error.
pub fn discover(root: &Path, extensions: &[String]) -> Result<Vec<CandidateFile>> {
    discover_with(root, extensions, &StdFs)
}

/// `discover` with sizes read through `fs`. A file that cannot be stat'ed
/// (gone between readdir and stat) is logged and left out.
pub fn discover_with<F: FileOps>(root: &Path, extensions: &[String], fs: &F) -> Result<Vec<CandidateFile>> {
    if extensions.is_empty() {
        return Err(ConfigError::EmptyExtensions.into());
    }
    if !root.is_dir() {
        return Err(ConfigError::InvalidRoot(root.to_path_buf()).into());
    }

    info!("Scanning directory: {}", root.display());

    let mut candidates = Vec::new();
    let mut entry_count = 0usize;

    for entry in WalkDir::new(root).follow_links(false) {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!("Error reading directory entry: {}", e);
                continue;
            }
        };
        entry_count += 1;

        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        if is_temp_artifact(path) {
            debug!("Ignoring temp artifact: {}", path.display());
            continue;
        }

        let ext = match path
            .extension()
            .and_then(|s| s.to_str())
            .map(|s| s.to_lowercase())
        {
            Some(ext) => ext,
            None => continue,
        };

        if !extensions.iter().any(|allowed| allowed == &ext) {
            continue;
        }

        let size_bytes = match fs.file_size(path) {
            Ok(size) => size,
            Err(e) => {
                warn!("Failed to stat file, skipping: {} ({})", path.display(), e);
                continue;
            }
        };

        debug!("Found candidate: {} ({} bytes)", path.display(), size_bytes);
        candidates.push(CandidateFile {
            path: path.to_path_buf(),
            size_bytes,
            extension: ext,
        });
    }

    // Byte-wise path order keeps runs reproducible regardless of readdir order
    candidates.sort_by(|a, b| a.path.as_os_str().cmp(b.path.as_os_str()));

    info!(
        "Scan complete: {} entries visited, {} candidate file(s)",
        entry_count,
        candidates.len()
    );
    Ok(candidates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn exts(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn touch(path: &Path, bytes: usize) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, vec![0u8; bytes]).unwrap();
    }

    #[test]
    fn test_discover_filters_and_sorts() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        touch(&root.join("b.mp4"), 3);
        touch(&root.join("a.MKV"), 5);
        touch(&root.join("sub/z.mp4"), 1);
        touch(&root.join("sub/notes.txt"), 1);
        touch(&root.join("noext"), 1);

        let found = discover(root, &exts(&["mkv", "mp4"])).unwrap();
        let paths: Vec<PathBuf> = found.iter().map(|c| c.path.clone()).collect();

        assert_eq!(
            paths,
            vec![root.join("a.MKV"), root.join("b.mp4"), root.join("sub/z.mp4")]
        );
        assert_eq!(found[0].size_bytes, 5);
        assert_eq!(found[0].extension, "mkv");
    }

    #[test]
    fn test_discover_skips_temp_artifacts() {
        let dir = TempDir::new().unwrap();
        touch(&dir.path().join(".recodec-tmp-abc-movie.mkv"), 4);
        touch(&dir.path().join("movie.mp4"), 4);

        let found = discover(dir.path(), &exts(&["mkv", "mp4"])).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].path, dir.path().join("movie.mp4"));
    }

    /// Reports one file as vanished, as if it was moved after readdir
    struct VanishingFs(&'static str);

    impl FileOps for VanishingFs {
        fn file_size(&self, path: &Path) -> io::Result<u64> {
            if path.file_name().and_then(|n| n.to_str()) == Some(self.0) {
                return Err(io::Error::new(io::ErrorKind::NotFound, "No such file or directory"));
            }
            StdFs.file_size(path)
        }

        fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
            StdFs.rename(from, to)
        }

        fn remove_file(&self, path: &Path) -> io::Result<()> {
            StdFs.remove_file(path)
        }
    }

    #[test]
    fn test_discover_skips_file_that_cannot_be_stated() {
        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("a.mp4"), 2);
        touch(&dir.path().join("gone.mp4"), 2);
        touch(&dir.path().join("z.mp4"), 2);

        let found = discover_with(dir.path(), &exts(&["mp4"]), &VanishingFs("gone.mp4")).unwrap();
        let paths: Vec<PathBuf> = found.iter().map(|c| c.path.clone()).collect();
        assert_eq!(paths, vec![dir.path().join("a.mp4"), dir.path().join("z.mp4")]);
    }

    #[test]
    fn test_discover_empty_tree_is_ok() {
        let dir = TempDir::new().unwrap();
        let found = discover(dir.path(), &exts(&["mkv"])).unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn test_discover_rejects_bad_input() {
        let dir = TempDir::new().unwrap();
        let err = discover(dir.path(), &[]).unwrap_err();
        assert_eq!(err.downcast_ref::<ConfigError>(), Some(&ConfigError::EmptyExtensions));

        let missing = dir.path().join("missing");
        let err = discover(&missing, &exts(&["mkv"])).unwrap_err();
        assert_eq!(
            err.downcast_ref::<ConfigError>(),
            Some(&ConfigError::InvalidRoot(missing))
        );
    }
}
