use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::media::MediaFile;
use crate::normalize::{self, normalize_key};

/// Longest sidecar filename the export tool writes, `.json` included.
const MAX_SIDECAR_NAME_LEN: usize = 51;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Candidate {
    path: PathBuf,
    marker: Option<u32>,
}

/// Index of sidecars by (directory, normalized key).
///
/// Several sidecars can share a key (`photo.jpg.json`, `photo.jpg(1).json`).
/// All of them are kept, sorted by path, and told apart by their duplicate
/// marker when a media file is matched.
#[derive(Debug, Default)]
pub struct SidecarIndex {
    by_key: KeyMap,
    by_stem: KeyMap,
    len: usize,
}

impl SidecarIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, sidecar: PathBuf) {
        let Some(name) = sidecar.file_name().and_then(|n| n.to_str()) else {
            return;
        };
        let dir = sidecar.parent().map(Path::to_path_buf).unwrap_or_default();
        let key = normalize_key(name);
        let stem = normalize::strip_extension(&key).to_string();
        let candidate = Candidate {
            marker: normalize::duplicate_marker(name),
            path: sidecar,
        };
        insert_sorted(self.by_stem.entry((dir.clone(), stem)).or_default(), candidate.clone());
        insert_sorted(self.by_key.entry((dir, key)).or_default(), candidate);
        self.len += 1;
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Find the sidecar for a media file. First match wins:
    ///
    /// 1. exact key with the same duplicate marker
    /// 2. duplicate media falls back to the unmarked original's sidecar
    /// 3. edited copies inherit the original's sidecar
    /// 4. extension stripped (`photo.json`, or a sibling with another extension)
    ///    and the export tool's truncated name
    /// 5. literal `<media path>.json` on disk
    pub fn find(&self, media: &MediaFile) -> Option<PathBuf> {
        let name = media.filename();
        let dir = media.path.parent().map(Path::to_path_buf).unwrap_or_default();
        let key = normalize_key(name);
        let marker = normalize::duplicate_marker(name);
        let by_key = lookup(&self.by_key, &dir, &key);

        if let Some(found) = by_key.and_then(|c| pick(c, |m| m == marker)) {
            return Some(found);
        }

        if marker.is_some() {
            if let Some(found) = by_key.and_then(|c| pick(c, |m| m.is_none())) {
                return Some(found);
            }
        }

        if normalize::has_variant_suffix(name) {
            if let Some(found) = by_key.and_then(|c| pick_preferred(c, marker)) {
                return Some(found);
            }
        }

        let stem = normalize::strip_extension(&key);
        let stemmed = lookup(&self.by_key, &dir, stem)
            .and_then(|c| pick_preferred(c, marker))
            .or_else(|| lookup(&self.by_stem, &dir, stem).and_then(|c| pick_preferred(c, marker)));
        if stemmed.is_some() {
            return stemmed;
        }

        let short = normalize_key(&shorten_name(name));
        if short != key {
            if let Some(found) = lookup(&self.by_key, &dir, &short).and_then(|c| pick_preferred(c, marker)) {
                return Some(found);
            }
        }

        let mut literal = media.path.clone().into_os_string();
        literal.push(".json");
        let literal = PathBuf::from(literal);
        literal.is_file().then_some(literal)
    }
}

type KeyMap = HashMap<(PathBuf, String), Vec<Candidate>>;

fn lookup<'a>(map: &'a KeyMap, dir: &Path, key: &str) -> Option<&'a [Candidate]> {
    map.get(&(dir.to_path_buf(), key.to_string())).map(Vec::as_slice)
}

fn insert_sorted(list: &mut Vec<Candidate>, candidate: Candidate) {
    let pos = list.partition_point(|c| c.path < candidate.path);
    list.insert(pos, candidate);
}

fn pick(candidates: &[Candidate], accept: impl Fn(Option<u32>) -> bool) -> Option<PathBuf> {
    candidates
        .iter()
        .find(|c| accept(c.marker))
        .map(|c| c.path.clone())
}

/// Same marker first, then the unmarked original. A sidecar carrying a
/// different marker belongs to another duplicate and is never taken.
fn pick_preferred(candidates: &[Candidate], marker: Option<u32>) -> Option<PathBuf> {
    pick(candidates, |m| m == marker).or_else(|| pick(candidates, |m| m.is_none()))
}

/// Cut a media filename the way the export tool does when the sidecar
/// name would exceed the limit.
fn shorten_name(filename: &str) -> String {
    let max_len = MAX_SIDECAR_NAME_LEN - ".json".len();
    if filename.len() + ".json".len() > MAX_SIDECAR_NAME_LEN {
        let mut end = max_len;
        while end > 0 && !filename.is_char_boundary(end) {
            end -= 1;
        }
        filename[..end].to_string()
    } else {
        filename.to_string()
    }
}
