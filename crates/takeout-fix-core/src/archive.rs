use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Datelike, Timelike, Utc};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::FixError;

/// Zip archive that many workers append to. Appends are serialized on a
/// mutex; everything before them (resolution, tagging) stays parallel.
pub struct ArchiveSink {
    path: PathBuf,
    writer: Mutex<ZipWriter<BufWriter<File>>>,
}

impl ArchiveSink {
    pub fn create(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        let file = File::create(&path)?;
        Ok(Self {
            path,
            writer: Mutex::new(ZipWriter::new(BufWriter::new(file))),
        })
    }

    /// Add `source` under `entry_name`, stamped with the file's mtime.
    pub fn append(&self, source: &Path, entry_name: &str) -> Result<(), FixError> {
        let meta = fs::metadata(source)?;
        let mut options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .compression_level(Some(9))
            .large_file(meta.len() >= u32::MAX as u64);
        if let Some(stamp) = meta.modified().ok().and_then(|t| zip_time(t.into())) {
            options = options.last_modified_time(stamp);
        }
        let mut input = File::open(source)?;

        let mut writer = self
            .writer
            .lock()
            .map_err(|_| FixError::Internal("archive writer poisoned".into()))?;
        writer.start_file(entry_name, options)?;
        io::copy(&mut input, &mut *writer)?;
        Ok(())
    }

    /// Write the central directory and close the file.
    pub fn finish(self) -> Result<PathBuf, FixError> {
        let writer = self
            .writer
            .into_inner()
            .map_err(|_| FixError::Internal("archive writer poisoned".into()))?;
        let mut out = writer.finish()?;
        out.flush()?;
        Ok(self.path)
    }
}

/// Zip timestamps cover 1980..=2107 only.
fn zip_time(t: DateTime<Utc>) -> Option<zip::DateTime> {
    zip::DateTime::from_date_and_time(
        u16::try_from(t.year()).ok()?,
        t.month() as u8,
        t.day() as u8,
        t.hour() as u8,
        t.minute() as u8,
        t.second() as u8,
    )
    .ok()
}
