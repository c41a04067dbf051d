use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;

use rayon::prelude::*;
use serde::Serialize;

use crate::archive::ArchiveSink;
use crate::cancel::CancellationToken;
use crate::date::{self, json::Sidecar};
use crate::error::FixError;
use crate::events::{LogLevel, Reporter};
use crate::matcher::SidecarIndex;
use crate::media::MediaFile;
use crate::router::{FileTimes, OutputRouter};
use crate::tags::{TagMap, TagWriter};

/// Files above this size get a heads-up log line before their write.
const LARGE_FILE: u64 = 100 * 1024 * 1024;

/// Terminal state of one media file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum ProcessOutcome {
    Fixed { artifact: PathBuf },
    /// Nothing to write. Mirrored modes still copy the file under `_SKIPPED/`.
    SkippedNoDate { artifact: Option<PathBuf> },
    Failed { reason: String },
    Cancelled,
}

/// Shared, read-only state for all workers of one batch.
pub struct BatchContext<'a> {
    pub sidecars: &'a SidecarIndex,
    pub router: &'a OutputRouter,
    pub archive: Option<&'a ArchiveSink>,
    pub tag_writer: &'a dyn TagWriter,
    pub reporter: &'a Reporter<'a>,
    pub cancel: Option<&'a CancellationToken>,
}

/// Process every file exactly once on a pool of `concurrency` workers.
/// Outcomes are returned in input order.
pub fn run_batch(
    media: &[MediaFile],
    ctx: &BatchContext,
    concurrency: usize,
) -> anyhow::Result<Vec<ProcessOutcome>> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(concurrency)
        .thread_name(|i| format!("fix-worker-{}", i))
        .build()?;

    let outcomes = pool.install(|| {
        media
            .par_iter()
            .map(|m| {
                let outcome = process_file(m, ctx);
                ctx.reporter.complete_one();
                outcome
            })
            .collect()
    });
    Ok(outcomes)
}

/// Run one file's pipeline; every failure, panics included, ends up as
/// `Failed` so the rest of the batch carries on.
pub fn process_file(media: &MediaFile, ctx: &BatchContext) -> ProcessOutcome {
    if ctx.cancel.is_some_and(|t| t.check().is_err()) {
        return ProcessOutcome::Cancelled;
    }

    let result = panic::catch_unwind(AssertUnwindSafe(|| fix_file(media, ctx)))
        .unwrap_or_else(|_| Err(FixError::Internal("panic while processing".into())));

    match result {
        Ok(outcome) => outcome,
        Err(e) => {
            ctx.reporter.log(
                LogLevel::Error,
                format!("Failed to fix {}: {}", media.filename(), e),
            );
            ProcessOutcome::Failed {
                reason: e.to_string(),
            }
        }
    }
}

fn fix_file(media: &MediaFile, ctx: &BatchContext) -> Result<ProcessOutcome, FixError> {
    let sidecar = load_sidecar(media, ctx);
    let meta = date::resolve(media.filename(), sidecar.as_ref());

    if meta.is_empty() {
        ctx.reporter
            .log_repetitive(format!("No date found for: {}", media.filename()));
        if ctx.router.root().is_none() {
            return Ok(ProcessOutcome::SkippedNoDate { artifact: None });
        }
        let artifact = ctx.router.route(media, true)?;
        if let Some(archive) = ctx.archive {
            archive.append(&artifact.path, &artifact.entry_name)?;
        }
        return Ok(ProcessOutcome::SkippedNoDate {
            artifact: Some(artifact.path),
        });
    }

    if fs::metadata(&media.path).map_or(false, |m| m.len() > LARGE_FILE) {
        ctx.reporter
            .log(LogLevel::Info, format!("Processing: {}...", media.filename()));
    }

    let original_times = FileTimes::read(&media.path)?;
    let artifact = ctx.router.route(media, false)?;
    let tags = TagMap::from_metadata(media, &meta);
    ctx.tag_writer.write_tags(&artifact.path, &tags)?;

    // Tag writing touches mtime, so the filesystem stamp goes last
    match meta.timestamp {
        Some(ts) => FileTimes::at(ts).apply(&artifact.path)?,
        None => original_times.apply(&artifact.path)?,
    }

    if let Some(archive) = ctx.archive {
        archive.append(&artifact.path, &artifact.entry_name)?;
    }

    tracing::trace!(file = %media.path.display(), source = ?meta.source, "fixed");
    Ok(ProcessOutcome::Fixed {
        artifact: artifact.path,
    })
}

/// Read and parse the matched sidecar. A missing or broken sidecar is not an
/// error: resolution falls back to the filename.
fn load_sidecar(media: &MediaFile, ctx: &BatchContext) -> Option<Sidecar> {
    let Some(path) = ctx.sidecars.find(media) else {
        tracing::debug!("no sidecar for {}", media.path.display());
        return None;
    };
    let bytes = match fs::read(&path) {
        Ok(bytes) => bytes,
        Err(e) => {
            ctx.reporter.log(
                LogLevel::Warn,
                format!("Could not read {}: {}", path.display(), e),
            );
            return None;
        }
    };
    match Sidecar::parse(&bytes) {
        Ok(sidecar) => Some(sidecar),
        Err(e) => {
            ctx.reporter.log(
                LogLevel::Warn,
                format!("Bad JSON in {}: {}", path.display(), e),
            );
            None
        }
    }
}
