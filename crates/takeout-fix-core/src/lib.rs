pub mod archive;
pub mod batch;
pub mod cancel;
pub mod date;
pub mod error;
pub mod events;
pub mod exiftool;
pub mod matcher;
pub mod media;
pub mod normalize;
pub mod router;
pub mod scan;
pub mod tags;

use std::fmt;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

pub use batch::ProcessOutcome;
pub use cancel::{CancellationToken, CancelledError};
pub use error::{FixError, SetupError};
pub use events::{Event, EventSink, LogLevel};
pub use exiftool::ExifTool;
pub use tags::{TagMap, TagWriter};

/// How fixed files are written out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Modify the original files
    #[value(name = "inplace")]
    InPlace,
    /// Copy into a new directory tree, originals untouched
    Merge,
    /// Copy into a zip archive, originals untouched
    Zip,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Mode::InPlace => "inplace",
            Mode::Merge => "merge",
            Mode::Zip => "zip",
        })
    }
}

fn default_concurrency() -> usize {
    25
}

fn default_write_timeout_secs() -> u64 {
    120
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessOptions {
    /// Files or directories to scan
    pub roots: Vec<PathBuf>,
    pub mode: Mode,
    /// Destination directory (merge) or archive file (zip)
    #[serde(default)]
    pub destination: Option<PathBuf>,
    /// Files in flight at once
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// A single tag write taking longer than this fails that file. Read by
    /// whoever builds the tag writer (see [`ExifTool::start`]); the pipeline
    /// itself only sees the writer's `Timeout` errors.
    #[serde(default = "default_write_timeout_secs")]
    pub write_timeout_secs: u64,
    /// Where the zip staging directory is created (default: OS temp dir)
    #[serde(default)]
    pub staging_parent: Option<PathBuf>,
}

impl ProcessOptions {
    pub fn new(roots: Vec<PathBuf>, mode: Mode, destination: Option<PathBuf>) -> Self {
        Self {
            roots,
            mode,
            destination,
            concurrency: default_concurrency(),
            write_timeout_secs: default_write_timeout_secs(),
            staging_parent: None,
        }
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }

    /// Checks that must pass before anything is scanned or written.
    pub fn validate(&self) -> Result<(), SetupError> {
        if self.roots.is_empty() {
            return Err(SetupError::NoInputs);
        }
        if let Some(missing) = self.roots.iter().find(|r| !r.exists()) {
            return Err(SetupError::MissingRoot(missing.clone()));
        }
        if self.concurrency == 0 {
            return Err(SetupError::ZeroConcurrency);
        }
        match (self.mode, &self.destination) {
            (Mode::InPlace, _) => {}
            (mode, None) => return Err(SetupError::MissingDestination(mode)),
            (Mode::Zip, Some(dest)) if dest.is_dir() => {
                return Err(SetupError::DestinationIsDirectory(dest.clone()))
            }
            _ => {}
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub total: u64,
    pub fixed: u64,
    pub skipped: u64,
    pub failed: u64,
    #[serde(default)]
    pub cancelled: u64,
    /// Output directory or archive; `None` for in-place runs
    #[serde(default)]
    pub output: Option<PathBuf>,
}

impl RunSummary {
    fn tally(outcomes: &[ProcessOutcome], output: Option<PathBuf>) -> Self {
        let mut summary = Self {
            total: outcomes.len() as u64,
            output,
            ..Self::default()
        };
        for outcome in outcomes {
            match outcome {
                ProcessOutcome::Fixed { .. } => summary.fixed += 1,
                ProcessOutcome::SkippedNoDate { .. } => summary.skipped += 1,
                ProcessOutcome::Failed { .. } => summary.failed += 1,
                ProcessOutcome::Cancelled => summary.cancelled += 1,
            }
        }
        summary
    }
}

/// Control options for process execution.
#[derive(Debug, Clone, Default)]
pub struct ProcessControl {
    /// Checked before each file starts.
    pub cancel_token: Option<CancellationToken>,
}

impl ProcessControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel_token = Some(token);
        self
    }
}

/// Run the full pipeline: scan, match, resolve, route, tag.
pub fn process(
    options: &ProcessOptions,
    tag_writer: &dyn TagWriter,
    sink: &EventSink<'_>,
) -> anyhow::Result<RunSummary> {
    process_with_control(options, &ProcessControl::default(), tag_writer, sink)
}

/// Run the full pipeline with a cancellation token.
///
/// A run-level failure (bad inputs, unwritable destination, archive that
/// cannot be finished) is sent to the sink as one error log and returned.
/// Per-file errors never escape: they are counted as `failed` in the summary.
pub fn process_with_control(
    options: &ProcessOptions,
    control: &ProcessControl,
    tag_writer: &dyn TagWriter,
    sink: &EventSink<'_>,
) -> anyhow::Result<RunSummary> {
    let result = run(options, control, tag_writer, sink);
    if let Err(e) = &result {
        sink(Event::Log {
            level: LogLevel::Error,
            message: format!("{:#}", e),
        });
    }
    result
}

fn run(
    options: &ProcessOptions,
    control: &ProcessControl,
    tag_writer: &dyn TagWriter,
    sink: &EventSink<'_>,
) -> anyhow::Result<RunSummary> {
    options.validate()?;
    let setup = events::Reporter::new(sink, 0);

    // Stage 1: Scan
    setup.emit(Event::ScanStarted {
        roots: options.roots.clone(),
    });
    setup.log(LogLevel::Info, "Scanning...");
    let t = Instant::now();
    let scan = scan::scan_roots(&options.roots);
    for warning in &scan.warnings {
        setup.log(LogLevel::Warn, warning.clone());
    }
    setup.emit(Event::ScanSummary {
        media_count: scan.media.len() as u64,
        sidecar_count: scan.sidecars.len() as u64,
    });
    tracing::debug!("scan took {:.2}s", t.elapsed().as_secs_f64());

    let total = scan.media.len() as u64;
    setup.log(
        LogLevel::Info,
        format!("Found {} media files. Starting fix process...", total),
    );

    // Stage 2: Prepare output
    let staging = match options.mode {
        Mode::Zip => Some(staging_dir(options)?),
        _ => None,
    };
    let (router, archive) = match (options.mode, &options.destination) {
        (Mode::Merge, Some(dest)) => {
            std::fs::create_dir_all(dest).map_err(SetupError::Output)?;
            (router::OutputRouter::mirror(dest), None)
        }
        (Mode::Zip, Some(dest)) => {
            let root = staging.as_ref().map(|s| s.path().to_path_buf()).unwrap_or_default();
            let archive = archive::ArchiveSink::create(dest).map_err(SetupError::Output)?;
            (router::OutputRouter::mirror(root), Some(archive))
        }
        _ => (router::OutputRouter::in_place(), None),
    };

    // Stage 3: Fix every file
    let t = Instant::now();
    let reporter = events::Reporter::new(sink, total);
    reporter.emit(Event::Progress { current: 0, total });
    let ctx = batch::BatchContext {
        sidecars: &scan.sidecars,
        router: &router,
        archive: archive.as_ref(),
        tag_writer,
        reporter: &reporter,
        cancel: control.cancel_token.as_ref(),
    };
    let outcomes = batch::run_batch(&scan.media, &ctx, options.concurrency)?;
    tracing::debug!("batch took {:.2}s", t.elapsed().as_secs_f64());

    // Stage 4: Finish output
    let output = match (archive, staging) {
        (Some(archive), staging) => {
            reporter.log(LogLevel::Info, "Finalizing archive...");
            let path = archive.finish()?;
            if let Some(staging) = staging {
                if let Err(e) = staging.close() {
                    reporter.log(LogLevel::Warn, format!("Could not remove staging directory: {}", e));
                }
            }
            Some(path)
        }
        (None, _) => router.root().map(|p| p.to_path_buf()),
    };

    let summary = RunSummary::tally(&outcomes, output);
    reporter.log(
        LogLevel::Success,
        format!(
            "Done: {} fixed, {} skipped, {} failed of {}",
            summary.fixed, summary.skipped, summary.failed, summary.total
        ),
    );
    reporter.emit(Event::Summary(summary.clone()));
    Ok(summary)
}

fn staging_dir(options: &ProcessOptions) -> Result<tempfile::TempDir, SetupError> {
    let mut builder = tempfile::Builder::new();
    builder.prefix("takeout-fix-");
    match &options.staging_parent {
        Some(parent) => builder.tempdir_in(parent),
        None => builder.tempdir(),
    }
    .map_err(SetupError::Output)
}
