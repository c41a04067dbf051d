use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use filetime::FileTime;
use takeout_fix_core::{
    process, Event, FixError, LogLevel, Mode, ProcessOptions, RunSummary, TagMap, TagWriter,
};
use tempfile::tempdir;

/// Records every write; fails for file names containing `broken`.
#[derive(Default)]
struct FakeWriter {
    writes: Mutex<Vec<(PathBuf, TagMap)>>,
}

impl FakeWriter {
    fn written(&self) -> Vec<(PathBuf, TagMap)> {
        self.writes.lock().unwrap().clone()
    }
}

impl TagWriter for FakeWriter {
    fn write_tags(&self, path: &Path, tags: &TagMap) -> Result<(), FixError> {
        let name = path.file_name().unwrap().to_string_lossy();
        if name.contains("broken") {
            return Err(FixError::TagWrite("Error: not a valid JPEG".into()));
        }
        self.writes.lock().unwrap().push((path.to_path_buf(), tags.clone()));
        Ok(())
    }
}

const JAN_2021: i64 = 1609459200;

fn write(path: &Path, contents: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
}

/// A small takeout export:
/// - IMG_1.jpg with a sidecar (fixed from JSON)
/// - IMG_20190704_101500.jpg without sidecar (fixed from filename)
/// - holiday.jpg with nothing to go on (skipped)
/// - broken.jpg with a sidecar but a failing write (failed)
fn takeout(root: &Path) {
    let album = root.join("Photos from 2021");
    write(&album.join("IMG_1.jpg"), "jpeg");
    write(
        &album.join("IMG_1.jpg.json"),
        &format!(
            r#"{{"title":"IMG_1.jpg","description":"New year","photoTakenTime":{{"timestamp":"{}"}},
               "geoData":{{"latitude":35.6,"longitude":139.7,"altitude":0.0}}}}"#,
            JAN_2021
        ),
    );
    write(&album.join("IMG_20190704_101500.jpg"), "jpeg");
    write(&album.join("holiday.jpg"), "jpeg");
    write(&album.join("broken.jpg"), "jpeg");
    write(
        &album.join("broken.jpg.json"),
        r#"{"photoTakenTime":{"timestamp":"1262304000"}}"#,
    );
    write(&root.join("archive_browser.html"), "<html>");
}

fn run(options: &ProcessOptions, writer: &FakeWriter) -> (RunSummary, Vec<Event>) {
    let events = Mutex::new(Vec::new());
    let sink = |e: Event| events.lock().unwrap().push(e);
    let summary = process(options, writer, &sink).unwrap();
    (summary, events.into_inner().unwrap())
}

fn mtime(path: &Path) -> i64 {
    FileTime::from_last_modification_time(&fs::metadata(path).unwrap()).unix_seconds()
}

#[test]
fn every_file_reaches_exactly_one_outcome() {
    let src = tempdir().unwrap();
    takeout(src.path());
    let writer = FakeWriter::default();
    let options = ProcessOptions::new(vec![src.path().to_path_buf()], Mode::InPlace, None);

    let (summary, events) = run(&options, &writer);

    assert_eq!(summary.total, 4);
    assert_eq!(summary.fixed, 2);
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.cancelled, 0);
    assert_eq!(summary.output, None);

    assert!(matches!(events.first(), Some(Event::ScanStarted { .. })));
    assert!(events.contains(&Event::ScanSummary {
        media_count: 4,
        sidecar_count: 2
    }));
    assert!(events.contains(&Event::Progress { current: 4, total: 4 }));
    assert_eq!(events.last(), Some(&Event::Summary(summary.clone())));
    assert!(events.iter().any(|e| matches!(
        e,
        Event::Log { level: LogLevel::Error, message } if message.contains("broken.jpg")
    )));
}

#[test]
fn in_place_sets_file_times_and_tags() {
    let src = tempdir().unwrap();
    takeout(src.path());
    let writer = FakeWriter::default();
    let options = ProcessOptions::new(vec![src.path().to_path_buf()], Mode::InPlace, None);
    run(&options, &writer);

    let album = src.path().join("Photos from 2021");
    assert_eq!(mtime(&album.join("IMG_1.jpg")), JAN_2021);

    let written = writer.written();
    let (_, tags) = written
        .iter()
        .find(|(p, _)| p.ends_with("IMG_1.jpg"))
        .unwrap();
    assert_eq!(tags.get("AllDates"), Some("2021:01:01 00:00:00"));
    assert_eq!(tags.get("GPSLatitudeRef"), Some("N"));
    assert_eq!(tags.get("Description"), Some("New year"));

    let (_, guessed) = written
        .iter()
        .find(|(p, _)| p.ends_with("IMG_20190704_101500.jpg"))
        .unwrap();
    assert_eq!(guessed.get("AllDates"), Some("2019:07:04 10:15:00"));
    assert_eq!(guessed.get("GPSLatitude"), None);
}

#[test]
fn merge_mirrors_tree_and_leaves_originals() {
    let src = tempdir().unwrap();
    let dest = tempdir().unwrap();
    takeout(src.path());
    let before = mtime(&src.path().join("Photos from 2021/IMG_1.jpg"));
    let writer = FakeWriter::default();
    let options = ProcessOptions::new(
        vec![src.path().to_path_buf()],
        Mode::Merge,
        Some(dest.path().to_path_buf()),
    );

    let (summary, _) = run(&options, &writer);

    assert_eq!(summary.output.as_deref(), Some(dest.path()));
    let fixed = dest.path().join("Photos from 2021/IMG_1.jpg");
    assert!(fixed.is_file());
    assert_eq!(mtime(&fixed), JAN_2021);
    assert!(dest.path().join("_SKIPPED/Photos from 2021/holiday.jpg").is_file());
    assert_eq!(mtime(&src.path().join("Photos from 2021/IMG_1.jpg")), before);
    assert!(writer.written().iter().all(|(p, _)| p.starts_with(dest.path())));
}

#[test]
fn zip_archives_outputs_and_removes_staging() {
    let src = tempdir().unwrap();
    let out = tempdir().unwrap();
    let staging = tempdir().unwrap();
    takeout(src.path());
    let archive = out.path().join("fixed.zip");
    let writer = FakeWriter::default();
    let mut options = ProcessOptions::new(
        vec![src.path().to_path_buf()],
        Mode::Zip,
        Some(archive.clone()),
    );
    options.staging_parent = Some(staging.path().to_path_buf());

    let (summary, _) = run(&options, &writer);

    assert_eq!(summary.output.as_deref(), Some(archive.as_path()));
    let mut zip = zip::ZipArchive::new(fs::File::open(&archive).unwrap()).unwrap();
    let names: Vec<String> = zip.file_names().map(String::from).collect();
    assert!(names.contains(&"Photos from 2021/IMG_1.jpg".to_string()));
    assert!(names.contains(&"Photos from 2021/IMG_20190704_101500.jpg".to_string()));
    assert!(names.contains(&"_SKIPPED/Photos from 2021/holiday.jpg".to_string()));
    assert!(!names.iter().any(|n| n.contains("broken")));
    assert!(zip.by_name("Photos from 2021/IMG_1.jpg").unwrap().size() > 0);
    assert_eq!(fs::read_dir(staging.path()).unwrap().count(), 0);
}

#[test]
fn corrupted_sidecar_does_not_disturb_batch() {
    let src = tempdir().unwrap();
    takeout(src.path());
    let album = src.path().join("Photos from 2021");
    write(&album.join("PXL_20220304_050607123.jpg"), "jpeg");
    write(&album.join("PXL_20220304_050607123.jpg.json"), "{ not json");
    let writer = FakeWriter::default();
    let options = ProcessOptions::new(vec![src.path().to_path_buf()], Mode::InPlace, None);

    let (summary, events) = run(&options, &writer);

    assert_eq!(summary.total, 5);
    assert_eq!(summary.fixed, 3);
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.failed, 1);
    assert!(events.iter().any(|e| matches!(
        e,
        Event::Log { level: LogLevel::Warn, message } if message.contains("Bad JSON")
    )));

    let written = writer.written();
    let tags_for = |name: &str| {
        written
            .iter()
            .find(|(p, _)| p.ends_with(name))
            .map(|(_, t)| t.clone())
            .unwrap()
    };
    assert_eq!(tags_for("PXL_20220304_050607123.jpg").get("AllDates"), Some("2022:03:04 05:06:07"));
    assert_eq!(tags_for("IMG_1.jpg").get("Description"), Some("New year"));
    assert_eq!(mtime(&album.join("IMG_1.jpg")), JAN_2021);
}

/// Writes like exiftool does: the file's mtime moves to "now".
struct TouchingWriter(FakeWriter);

const TOUCHED_AT: i64 = 1700000000;

impl TagWriter for TouchingWriter {
    fn write_tags(&self, path: &Path, tags: &TagMap) -> Result<(), FixError> {
        self.0.write_tags(path, tags)?;
        filetime::set_file_mtime(path, FileTime::from_unix_time(TOUCHED_AT, 0))?;
        Ok(())
    }
}

#[test]
fn description_only_write_keeps_original_times() {
    let src = tempdir().unwrap();
    let photo = src.path().join("holiday.jpg");
    write(&photo, "jpeg");
    write(&src.path().join("holiday.jpg.json"), r#"{"description": "Beach"}"#);
    let original = FileTime::from_unix_time(1300000000, 0);
    filetime::set_file_times(&photo, original, original).unwrap();

    let writer = TouchingWriter(FakeWriter::default());
    let options = ProcessOptions::new(vec![src.path().to_path_buf()], Mode::InPlace, None);
    let events = Mutex::new(Vec::new());
    let sink = |e: Event| events.lock().unwrap().push(e);
    let summary = process(&options, &writer, &sink).unwrap();

    assert_eq!(summary.fixed, 1);
    let written = writer.0.written();
    assert_eq!(written[0].1.get("Description"), Some("Beach"));
    assert_eq!(written[0].1.get("AllDates"), None);
    assert_eq!(mtime(&photo), 1300000000);
}

#[test]
fn unwritable_archive_is_reported() {
    let src = tempdir().unwrap();
    let out = tempdir().unwrap();
    let staging = tempdir().unwrap();
    takeout(src.path());
    let writer = FakeWriter::default();
    let mut options = ProcessOptions::new(
        vec![src.path().to_path_buf()],
        Mode::Zip,
        Some(out.path().join("missing/fixed.zip")),
    );
    options.staging_parent = Some(staging.path().to_path_buf());

    let events = Mutex::new(Vec::new());
    let sink = |e: Event| events.lock().unwrap().push(e);
    assert!(process(&options, &writer, &sink).is_err());

    let events = events.into_inner().unwrap();
    assert!(matches!(
        events.last(),
        Some(Event::Log { level: LogLevel::Error, message }) if message.contains("could not prepare output")
    ));
    assert!(writer.written().is_empty());
    assert_eq!(fs::read_dir(staging.path()).unwrap().count(), 0);
}

#[test]
fn setup_error_touches_nothing() {
    let src = tempdir().unwrap();
    takeout(src.path());
    let writer = FakeWriter::default();
    let options = ProcessOptions::new(vec![src.path().to_path_buf()], Mode::Merge, None);

    let events = Mutex::new(Vec::new());
    let sink = |e: Event| events.lock().unwrap().push(e);
    assert!(process(&options, &writer, &sink).is_err());
    assert!(writer.written().is_empty());
    let events = events.into_inner().unwrap();
    assert_eq!(events.len(), 1);
    assert!(matches!(&events[0], Event::Log { level: LogLevel::Error, .. }));
}
