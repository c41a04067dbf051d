//! Canonical matching keys for media and sidecar filenames.
//!
//! Takeout exports mangle names in several ways: `.json` and
//! `.supplemental-metadata` suffixes (sometimes cut short by the 51-char
//! limit), duplicate markers `(N)` on either side of the extension, edited
//! copies (`-edited`, `-collage`, ...) and 13-digit timestamp suffixes.
//! Every rule lives in [`RULES`]; [`normalize_key`] applies them until
//! nothing changes, which makes the key idempotent.

use regex::Regex;
use std::sync::LazyLock;
use unicode_normalization::UnicodeNormalization;

const SUPPLEMENTAL: &str = "supplemental-metadata";

static DUPLICATE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\((\d+)\)$").unwrap());
static TIMESTAMP_SUFFIX_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"_\d{13}$").unwrap());

#[derive(Clone, Copy, PartialEq, Eq)]
enum Scope {
    /// Applied to the whole (lowercased) name
    Name,
    /// Applied to the part before the last extension
    Stem,
}

enum Kind {
    Suffix(&'static str),
    Pattern(&'static LazyLock<Regex>),
    Supplemental,
}

struct Rule {
    scope: Scope,
    kind: Kind,
    /// Marks an edited/variant copy that usually has no sidecar of its own
    variant: bool,
}

const fn name(kind: Kind) -> Rule {
    Rule { scope: Scope::Name, kind, variant: false }
}

const fn stem(kind: Kind, variant: bool) -> Rule {
    Rule { scope: Scope::Stem, kind, variant }
}

/// Ordered rule table. Suffixes are lowercase.
static RULES: &[Rule] = &[
    name(Kind::Suffix(".json")),
    name(Kind::Pattern(&DUPLICATE_RE)),
    name(Kind::Supplemental),
    stem(Kind::Pattern(&DUPLICATE_RE), false),
    stem(Kind::Suffix("-edited"), true),
    stem(Kind::Suffix("_edited"), true),
    stem(Kind::Suffix("-collage"), true),
    stem(Kind::Suffix("-cinematic"), true),
    stem(Kind::Suffix("-effects"), true),
    stem(Kind::Suffix("-animation"), true),
    stem(Kind::Suffix("-remastered"), true),
    stem(Kind::Suffix("-pop_out"), true),
    stem(Kind::Suffix("-smile"), true),
    stem(Kind::Suffix("-mix"), true),
    stem(Kind::Suffix("-edytowane"), true),  // PL
    stem(Kind::Suffix("-bearbeitet"), true), // DE
    stem(Kind::Suffix("-bewerkt"), true),    // NL
    stem(Kind::Suffix("-編集済み"), true),   // JA
    stem(Kind::Suffix("-modificato"), true), // IT
    stem(Kind::Suffix("-modifié"), true),    // FR
    stem(Kind::Suffix("-ha editado"), true), // ES
    stem(Kind::Suffix("-editat"), true),     // CA
    stem(Kind::Pattern(&TIMESTAMP_SUFFIX_RE), true),
];

impl Rule {
    fn strip<'a>(&self, s: &'a str) -> Option<&'a str> {
        let rest = match &self.kind {
            Kind::Suffix(suffix) => s.strip_suffix(suffix)?,
            Kind::Pattern(re) => &s[..re.find(s)?.start()],
            Kind::Supplemental => strip_supplemental(s)?,
        };
        (!rest.is_empty()).then_some(rest)
    }
}

/// Lowercase and NFC-compose a filename; the first step of every key.
fn canonical(filename: &str) -> String {
    filename.trim().nfc().collect::<String>().to_lowercase()
}

/// Split at the last dot: ("photo", ".jpg"). Leading dots do not count.
fn split_extension(s: &str) -> (&str, &str) {
    match s.rfind('.') {
        Some(pos) if pos > 0 => (&s[..pos], &s[pos..]),
        _ => (s, ""),
    }
}

/// Remove a full or truncated `.supplemental-metadata` suffix.
///
/// The export tool cuts long sidecar names at 51 characters, so
/// `photo.jpg.supplemental-me` is as common as the full form, down to a
/// single `.s`. Truncated forms are only stripped when an extension remains
/// in front of them.
fn strip_supplemental(s: &str) -> Option<&str> {
    let pos = s.rfind('.')?;
    let (head, seg) = (&s[..pos], &s[pos + 1..]);
    if seg == SUPPLEMENTAL {
        return Some(head);
    }
    if !seg.is_empty() && SUPPLEMENTAL.starts_with(seg) && head.contains('.') {
        return Some(head);
    }
    None
}

fn strip_once(key: &str) -> Option<String> {
    for rule in RULES {
        match rule.scope {
            Scope::Name => {
                if let Some(rest) = rule.strip(key) {
                    return Some(rest.to_string());
                }
            }
            Scope::Stem => {
                let (stem, ext) = split_extension(key);
                if let Some(rest) = rule.strip(stem) {
                    return Some(format!("{}{}", rest, ext));
                }
            }
        }
    }
    None
}

/// Canonical matching key for a media or sidecar filename.
pub fn normalize_key(filename: &str) -> String {
    let mut key = canonical(filename);
    while let Some(next) = strip_once(&key) {
        key = next;
    }
    key
}

/// The key with its extension removed, for cross-extension matching.
pub fn strip_extension(key: &str) -> &str {
    split_extension(key).0
}

/// Duplicate number `N` of a name carrying a `(N)` marker, either after the
/// extension (`photo.jpg(1).json`) or before it (`photo(1).jpg`).
pub fn duplicate_marker(filename: &str) -> Option<u32> {
    let lower = canonical(filename);
    let mut s = lower.strip_suffix(".json").unwrap_or(&lower);
    if let Some(n) = trailing_marker(s) {
        return Some(n);
    }
    if let Some(rest) = strip_supplemental(s) {
        s = rest;
    }
    trailing_marker(split_extension(s).0)
}

fn trailing_marker(s: &str) -> Option<u32> {
    DUPLICATE_RE.captures(s)?.get(1)?.as_str().parse().ok()
}

/// Whether the filename's stem ends in an edited/variant suffix.
pub fn has_variant_suffix(filename: &str) -> bool {
    let lower = canonical(filename);
    let (mut stem, _) = split_extension(&lower);
    if let Some(m) = DUPLICATE_RE.find(stem) {
        stem = &stem[..m.start()];
    }
    RULES
        .iter()
        .filter(|r| r.variant)
        .any(|r| r.strip(stem).is_some())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sidecar_suffixes() {
        assert_eq!(normalize_key("IMG_20230101_120000.jpg.json"), "img_20230101_120000.jpg");
        assert_eq!(normalize_key("photo.jpg.supplemental-metadata.json"), "photo.jpg");
        assert_eq!(normalize_key("photo.jpg.supplemental-me.json"), "photo.jpg");
        assert_eq!(normalize_key("photo.jpg.supplemental-metadata(2).json"), "photo.jpg");
        assert_eq!(normalize_key("photo.jpg(1).json"), "photo.jpg");
        assert_eq!(normalize_key("photo.json"), "photo");
        assert_eq!(normalize_key("photo.jpg.s.json"), "photo.jpg");
        assert_eq!(normalize_key("photo.s.json"), "photo.s");
    }

    #[test]
    fn test_media_variants() {
        assert_eq!(normalize_key("photo(1).jpg"), "photo.jpg");
        assert_eq!(normalize_key("Photo-edited.JPG"), "photo.jpg");
        assert_eq!(normalize_key("photo-edited(1).jpg"), "photo.jpg");
        assert_eq!(normalize_key("PXL_1234-COLLAGE.jpg"), "pxl_1234.jpg");
        assert_eq!(normalize_key("clip_1609459200000.mp4"), "clip.mp4");
        assert_eq!(normalize_key("Urlaub-bearbeitet.jpg"), "urlaub.jpg");
        assert_eq!(normalize_key("-edited.jpg"), "-edited.jpg");
    }

    #[test]
    fn test_nfc() {
        // "é" decomposed vs composed
        assert_eq!(normalize_key("cafe\u{301}.jpg"), normalize_key("caf\u{e9}.jpg"));
    }

    #[test]
    fn test_idempotent() {
        for name in [
            "IMG_20230101_120000.jpg.json",
            "photo.jpg.supplemental-metadata(1).json",
            "photo(1)-edited.jpg",
            "a.json.json",
            "clip_1609459200000-effects.mp4",
            "weird..name.(3).heic",
        ] {
            let once = normalize_key(name);
            assert_eq!(normalize_key(&once), once, "{}", name);
        }
    }

    #[test]
    fn test_duplicate_marker() {
        assert_eq!(duplicate_marker("photo(1).jpg"), Some(1));
        assert_eq!(duplicate_marker("photo.jpg(2).json"), Some(2));
        assert_eq!(duplicate_marker("photo.jpg.supplemental-metadata(3).json"), Some(3));
        assert_eq!(duplicate_marker("photo.jpg.json"), None);
        assert_eq!(duplicate_marker("photo.jpg"), None);
    }

    #[test]
    fn test_variant_suffix() {
        assert!(has_variant_suffix("photo-edited.jpg"));
        assert!(has_variant_suffix("photo-EDITED(1).jpg"));
        assert!(has_variant_suffix("movie-cinematic.mov"));
        assert!(!has_variant_suffix("photo.jpg"));
        assert!(!has_variant_suffix("photo(1).jpg"));
        assert_eq!(strip_extension("photo.jpg"), "photo");
        assert_eq!(strip_extension("photo"), "photo");
    }
}
