use std::path::{Path, PathBuf};

/// Extensions (lowercase, no dot) the scanner treats as media.
pub const SUPPORTED_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "webp", "heic", "tiff", "bmp", // images
    "mov", "mp4", "m4v", "avi", "mkv", "3gp", "mpg", "mpeg", // videos
];

const VIDEO_EXTENSIONS: &[&str] = &["mov", "mp4", "m4v", "avi", "mkv", "3gp", "mpg", "mpeg"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaFile {
    /// Absolute path on disk
    pub path: PathBuf,
    /// Path relative to the scan root it was found under
    pub relative_path: PathBuf,
    /// Lowercased extension, always one of SUPPORTED_EXTENSIONS
    pub extension: String,
}

impl MediaFile {
    /// Build a MediaFile if `path` carries a supported extension.
    pub fn from_path(path: PathBuf, relative_path: PathBuf) -> Option<Self> {
        let extension = supported_extension(&path)?;
        Some(Self {
            path,
            relative_path,
            extension,
        })
    }

    pub fn filename(&self) -> &str {
        self.path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("")
    }

    pub fn is_video(&self) -> bool {
        VIDEO_EXTENSIONS.contains(&self.extension.as_str())
    }
}

/// Lowercased extension of `path` when it is in the allow-list.
pub fn supported_extension(path: &Path) -> Option<String> {
    let ext = path.extension()?.to_str()?.to_lowercase();
    SUPPORTED_EXTENSIONS.contains(&ext.as_str()).then_some(ext)
}

pub fn is_json(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map_or(false, |e| e.eq_ignore_ascii_case("json"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supported_extension() {
        assert_eq!(supported_extension(Path::new("a/IMG_1.JPG")).as_deref(), Some("jpg"));
        assert_eq!(supported_extension(Path::new("clip.3gp")).as_deref(), Some("3gp"));
        assert!(supported_extension(Path::new("notes.txt")).is_none());
        assert!(supported_extension(Path::new("photo.jpg.json")).is_none());
        assert!(supported_extension(Path::new("no_extension")).is_none());
    }

    #[test]
    fn test_media_file() {
        let m = MediaFile::from_path(PathBuf::from("/t/Photos/MOV_01.MOV"), PathBuf::from("Photos/MOV_01.MOV")).unwrap();
        assert_eq!(m.extension, "mov");
        assert_eq!(m.filename(), "MOV_01.MOV");
        assert!(m.is_video());
        assert!(is_json(Path::new("x.jpg.JSON")));
    }
}
