pub mod guess;
pub mod json;

use chrono::{DateTime, Datelike, Utc};
use serde::Serialize;

use self::json::Sidecar;

/// Where the resolved capture time came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Json,
    Filename,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Gps {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: Option<f64>,
}

/// Metadata chosen for one media file. Absent fields are simply `None`;
/// the tag builder only emits what is present.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedMetadata {
    pub timestamp: Option<DateTime<Utc>>,
    pub gps: Option<Gps>,
    pub description: Option<String>,
    pub title: Option<String>,
    pub source: Source,
}

impl ResolvedMetadata {
    /// Nothing worth writing: the file is routed as skipped.
    pub fn is_empty(&self) -> bool {
        self.timestamp.is_none() && self.description.is_none()
    }
}

/// A capture time is plausible if it is not the zero epoch and falls between
/// 1970 and next year.
pub fn is_valid(candidate: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    candidate.timestamp() != 0 && candidate.year() >= 1970 && candidate.year() <= now.year() + 1
}

/// Resolve metadata: sidecar time, then filename patterns, then nothing.
/// Location, description and title only ever come from the sidecar, and
/// only when the filename did not supply the time.
pub fn resolve(filename: &str, sidecar: Option<&Sidecar>) -> ResolvedMetadata {
    resolve_at(filename, sidecar, Utc::now())
}

pub fn resolve_at(filename: &str, sidecar: Option<&Sidecar>, now: DateTime<Utc>) -> ResolvedMetadata {
    let from_json = sidecar.and_then(|s| s.timestamps().find(|t| is_valid(*t, now)));
    let (timestamp, source) = match from_json {
        Some(t) => (Some(t), Source::Json),
        None => match guess::candidates_from_filename(filename)
            .into_iter()
            .find(|t| is_valid(*t, now))
        {
            Some(t) => (Some(t), Source::Filename),
            None => (None, Source::None),
        },
    };

    // Once the filename supplies the time, the sidecar contributes nothing
    let sidecar = sidecar.filter(|_| source != Source::Filename);
    let gps = sidecar.and_then(Sidecar::location).map(|g| Gps {
        latitude: g.latitude,
        longitude: g.longitude,
        altitude: g.altitude,
    });
    let description = sidecar
        .and_then(|s| s.description.as_deref())
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(str::to_string);
    // The exporter fills `title` with the filename; only a renamed title is worth keeping
    let title = sidecar
        .and_then(|s| s.title.as_deref())
        .map(str::trim)
        .filter(|t| !t.is_empty() && *t != filename)
        .map(str::to_string);

    ResolvedMetadata {
        timestamp,
        gps,
        description,
        title,
        source,
    }
}
