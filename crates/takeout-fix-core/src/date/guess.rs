use chrono::{DateTime, NaiveDate, Utc};
use regex::{Captures, Regex};
use std::path::Path;
use std::sync::LazyLock;

struct DatePattern {
    regex: &'static LazyLock<Regex>,
    /// Patterns without a time component resolve to noon
    has_time: bool,
}

// YYYY[-_]MM[-_]DD[-_ .]HH[-_]MM[-_]SS, separators optional
static RE_DATETIME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?:^|\D)(?P<y>(?:19|20)\d{2})[-_]?(?P<mo>\d{2})[-_]?(?P<d>\d{2})[-_ .]?(?P<h>\d{2})[-_]?(?P<mi>\d{2})[-_]?(?P<s>\d{2})",
    )
    .unwrap()
});
// WhatsApp: IMG-20210615-WA0001
static RE_WHATSAPP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:IMG|VID)-(?P<y>\d{4})(?P<mo>\d{2})(?P<d>\d{2})-WA\d{4}").unwrap()
});
static RE_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|\D)(?P<y>(?:19|20)\d{2})[-_]?(?P<mo>\d{2})[-_]?(?P<d>\d{2})").unwrap()
});

static PATTERNS: &[DatePattern] = &[
    DatePattern { regex: &RE_DATETIME, has_time: true },
    DatePattern { regex: &RE_WHATSAPP, has_time: false },
    DatePattern { regex: &RE_DATE, has_time: false },
];

fn field(caps: &Captures, name: &str) -> Option<u32> {
    caps.name(name)?.as_str().parse().ok()
}

fn to_instant(caps: &Captures, has_time: bool) -> Option<DateTime<Utc>> {
    let date = NaiveDate::from_ymd_opt(field(caps, "y")? as i32, field(caps, "mo")?, field(caps, "d")?)?;
    let dt = if has_time {
        date.and_hms_opt(field(caps, "h")?, field(caps, "mi")?, field(caps, "s")?)?
    } else {
        date.and_hms_opt(12, 0, 0)?
    };
    Some(dt.and_utc())
}

/// Capture times encoded in a filename, most precise pattern first.
///
/// Every match of every pattern is yielded in order so the caller can skip
/// candidates that fail its own validity check.
pub fn candidates_from_filename(filename: &str) -> Vec<DateTime<Utc>> {
    let basename = Path::new(filename)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(filename);

    PATTERNS
        .iter()
        .flat_map(|pat| {
            pat.regex
                .captures_iter(basename)
                .filter_map(move |caps| to_instant(&caps, pat.has_time))
        })
        .collect()
}
