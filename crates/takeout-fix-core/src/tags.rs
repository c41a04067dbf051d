use std::path::Path;

use crate::date::ResolvedMetadata;
use crate::error::FixError;
use crate::media::MediaFile;

/// Timestamp format understood by exiftool for date tags.
const TAG_DATE_FORMAT: &str = "%Y:%m:%d %H:%M:%S";

/// Ordered tag assignments for one file. Only fields with data are inserted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TagMap {
    entries: Vec<(&'static str, String)>,
}

impl TagMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, tag: &'static str, value: impl Into<String>) -> &mut Self {
        self.entries.push((tag, value.into()));
        self
    }

    pub fn get(&self, tag: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(t, _)| *t == tag)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &str)> {
        self.entries.iter().map(|(t, v)| (*t, v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Build the tag set for a media file from its resolved metadata.
    pub fn from_metadata(media: &MediaFile, meta: &ResolvedMetadata) -> Self {
        let mut tags = Self::new();

        if let Some(ts) = meta.timestamp {
            let formatted = ts.format(TAG_DATE_FORMAT).to_string();
            tags.insert("AllDates", formatted.clone());
            if media.is_video() {
                for tag in ["TrackCreateDate", "TrackModifyDate", "MediaCreateDate", "MediaModifyDate"] {
                    tags.insert(tag, formatted.clone());
                }
            }
        }

        if let Some(gps) = meta.gps {
            tags.insert("GPSLatitude", gps.latitude.abs().to_string())
                .insert("GPSLatitudeRef", if gps.latitude < 0.0 { "S" } else { "N" })
                .insert("GPSLongitude", gps.longitude.abs().to_string())
                .insert("GPSLongitudeRef", if gps.longitude < 0.0 { "W" } else { "E" });
            if let Some(alt) = gps.altitude {
                tags.insert("GPSAltitude", alt.abs().to_string()).insert(
                    "GPSAltitudeRef",
                    if alt < 0.0 { "Below Sea Level" } else { "Above Sea Level" },
                );
            }
        }

        // Readers disagree on where a caption lives, so fill every common slot
        if let Some(desc) = &meta.description {
            for tag in ["Description", "ImageDescription", "Caption-Abstract", "UserComment"] {
                tags.insert(tag, desc.clone());
            }
        }

        if let Some(title) = &meta.title {
            tags.insert("Title", title.clone());
        }

        tags
    }
}

/// Applies a tag map to a file in place, without leaving a backup copy.
///
/// Implementations are shared by every worker of a batch; any queuing of
/// the actual writes is up to them.
pub trait TagWriter: Send + Sync {
    fn write_tags(&self, path: &Path, tags: &TagMap) -> Result<(), FixError>;
}
