use std::fs;
use std::path::{Path, PathBuf};

use crate::matcher::SidecarIndex;
use crate::media::{self, MediaFile};

/// Result of scanning all input roots
pub struct ScanResult {
    /// Media files, sorted by path
    pub media: Vec<MediaFile>,
    /// Every `.json` file found, by normalized key
    pub sidecars: SidecarIndex,
    /// Directories that could not be read; their contents are not counted
    pub warnings: Vec<String>,
}

#[derive(Default)]
struct Collector {
    media: Vec<MediaFile>,
    sidecars: Vec<PathBuf>,
    warnings: Vec<String>,
}

impl Collector {
    fn classify(&mut self, path: PathBuf, root: &Path) {
        if media::is_json(&path) {
            self.sidecars.push(path);
            return;
        }
        let relative = pathdiff::diff_paths(&path, root)
            .filter(|r| !r.as_os_str().is_empty())
            .or_else(|| path.file_name().map(PathBuf::from))
            .unwrap_or_else(|| path.clone());
        if let Some(m) = MediaFile::from_path(path, relative) {
            self.media.push(m);
        }
    }

    /// Walk one directory tree with an explicit stack.
    ///
    /// Symlinked directories are not followed, so link cycles cannot loop;
    /// symlinked files are classified like regular files.
    fn walk(&mut self, root: &Path) {
        let mut pending = vec![root.to_path_buf()];
        while let Some(dir) = pending.pop() {
            let entries = match fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(e) => {
                    self.warnings.push(format!("Could not scan directory {}: {}", dir.display(), e));
                    continue;
                }
            };
            for entry in entries {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(e) => {
                        self.warnings.push(format!("Could not read entry in {}: {}", dir.display(), e));
                        continue;
                    }
                };
                let path = entry.path();
                let Ok(file_type) = entry.file_type() else {
                    continue;
                };
                if file_type.is_dir() {
                    pending.push(path);
                } else if file_type.is_file() {
                    self.classify(path, root);
                } else if file_type.is_symlink() {
                    if path.is_file() {
                        self.classify(path, root);
                    } else {
                        tracing::debug!("not following symlink {}", path.display());
                    }
                }
            }
        }
    }
}

/// Scan files and directories for media and sidecars.
///
/// A root that is a file is classified directly; its relative path is its
/// file name. Roots are expected to exist (checked during setup).
pub fn scan_roots(roots: &[PathBuf]) -> ScanResult {
    let mut collector = Collector::default();

    for root in roots {
        let root = fs::canonicalize(root).unwrap_or_else(|_| root.clone());
        if root.is_dir() {
            collector.walk(&root);
        } else {
            let parent = root.parent().map(Path::to_path_buf).unwrap_or_default();
            collector.classify(root, &parent);
        }
    }

    let Collector {
        mut media,
        mut sidecars,
        warnings,
    } = collector;
    media.sort_by(|a, b| a.path.cmp(&b.path));
    media.dedup_by(|a, b| a.path == b.path);
    sidecars.sort();
    sidecars.dedup();

    let mut index = SidecarIndex::new();
    for sidecar in sidecars {
        index.insert(sidecar);
    }

    ScanResult {
        media,
        sidecars: index,
        warnings,
    }
}
