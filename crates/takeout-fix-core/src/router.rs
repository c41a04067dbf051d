use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Utc};
use filetime::FileTime;

use crate::error::FixError;
use crate::media::MediaFile;

/// Folder under the destination root for files with nothing to write.
pub const SKIPPED_DIR: &str = "_SKIPPED";

/// Where the fix for one file is applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub path: PathBuf,
    /// Path below the destination root with `/` separators (archive entry name)
    pub entry_name: String,
}

#[derive(Debug, Clone)]
enum Target {
    InPlace,
    Mirror(PathBuf),
}

/// Decides the artifact path for each file and makes the copy when the
/// artifact is not the original.
#[derive(Debug, Clone)]
pub struct OutputRouter {
    target: Target,
}

impl OutputRouter {
    pub fn in_place() -> Self {
        Self { target: Target::InPlace }
    }

    /// Copy every file below `root`, keeping its relative path.
    pub fn mirror(root: impl Into<PathBuf>) -> Self {
        Self {
            target: Target::Mirror(root.into()),
        }
    }

    pub fn root(&self) -> Option<&Path> {
        match &self.target {
            Target::InPlace => None,
            Target::Mirror(root) => Some(root),
        }
    }

    /// Route one file. `skipped` files go under `_SKIPPED/` when mirroring.
    pub fn route(&self, media: &MediaFile, skipped: bool) -> Result<Artifact, FixError> {
        let root = match &self.target {
            Target::InPlace => {
                return Ok(Artifact {
                    path: media.path.clone(),
                    entry_name: entry_name(&media.relative_path),
                })
            }
            Target::Mirror(root) => root,
        };

        let relative = if skipped {
            Path::new(SKIPPED_DIR).join(&media.relative_path)
        } else {
            media.relative_path.clone()
        };
        let dest = root.join(&relative);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        let dest = claim(&dest)?;
        copy_preserving_times(&media.path, &dest)?;

        let relative = dest.strip_prefix(root).unwrap_or(&relative);
        Ok(Artifact {
            entry_name: entry_name(relative),
            path: dest,
        })
    }
}

/// Relative path as an archive entry name.
fn entry_name(relative: &Path) -> String {
    relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Reserve `dest`, or a sibling with a time-derived suffix if it is taken.
/// `create_new` keeps two workers from claiming the same name.
fn claim(dest: &Path) -> io::Result<PathBuf> {
    let stem = dest
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("file");
    let ext = dest.extension().and_then(|s| s.to_str()).unwrap_or("");

    let mut candidate = dest.to_path_buf();
    let mut attempt = 0u32;
    loop {
        match OpenOptions::new().write(true).create_new(true).open(&candidate) {
            Ok(_) => return Ok(candidate),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
            Err(e) => return Err(e),
        }
        let stamp = format!("{:x}", Utc::now().timestamp_millis() & 0xff_ffff);
        let suffix = if attempt == 0 {
            stamp
        } else {
            format!("{}-{}", stamp, attempt)
        };
        let name = if ext.is_empty() {
            format!("{}_{}", stem, suffix)
        } else {
            format!("{}_{}.{}", stem, suffix, ext)
        };
        candidate = dest.with_file_name(name);
        attempt += 1;
    }
}

/// Access and modification times of a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileTimes {
    pub accessed: FileTime,
    pub modified: FileTime,
}

impl FileTimes {
    pub fn read(path: &Path) -> io::Result<Self> {
        let meta = fs::metadata(path)?;
        Ok(Self {
            accessed: FileTime::from_last_access_time(&meta),
            modified: FileTime::from_last_modification_time(&meta),
        })
    }

    pub fn at(instant: DateTime<Utc>) -> Self {
        let ft = FileTime::from_unix_time(instant.timestamp(), instant.timestamp_subsec_nanos());
        Self {
            accessed: ft,
            modified: ft,
        }
    }

    pub fn apply(&self, path: &Path) -> io::Result<()> {
        filetime::set_file_times(path, self.accessed, self.modified)
    }
}

/// Copy a file and give the copy the source's timestamps.
pub fn copy_preserving_times(src: &Path, dest: &Path) -> io::Result<()> {
    let times = FileTimes::read(src)?;
    fs::copy(src, dest)?;
    times.apply(dest)
}
