use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::RunSummary;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
    Success,
}

/// Everything the surrounding shell gets to see about a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Event {
    ScanStarted { roots: Vec<PathBuf> },
    ScanSummary { media_count: u64, sidecar_count: u64 },
    Log { level: LogLevel, message: String },
    Progress { current: u64, total: u64 },
    Summary(RunSummary),
}

/// Receiver for pipeline events. Called from worker threads.
pub type EventSink<'a> = dyn Fn(Event) + Send + Sync + 'a;

/// Wraps the sink: throttles progress, rate-limits repetitive warnings.
pub struct Reporter<'a> {
    sink: &'a EventSink<'a>,
    total: u64,
    every: u64,
    completed: AtomicU64,
    noisy: AtomicU64,
}

impl<'a> Reporter<'a> {
    /// Progress is emitted roughly 200 times per batch, plus on the last file.
    pub fn new(sink: &'a EventSink<'a>, total: u64) -> Self {
        Self {
            sink,
            total,
            every: (total / 200).max(1),
            completed: AtomicU64::new(0),
            noisy: AtomicU64::new(0),
        }
    }

    pub fn emit(&self, event: Event) {
        (self.sink)(event);
    }

    pub fn log(&self, level: LogLevel, message: impl Into<String>) {
        self.emit(Event::Log {
            level,
            message: message.into(),
        });
    }

    /// Log a warning that repeats for many files: the first 10, then every 50th.
    pub fn log_repetitive(&self, message: impl Into<String>) {
        let n = self.noisy.fetch_add(1, Ordering::Relaxed) + 1;
        if n <= 10 || n % 50 == 0 {
            self.log(LogLevel::Warn, message);
        }
    }

    /// Record one finished file.
    pub fn complete_one(&self) {
        let current = self.completed.fetch_add(1, Ordering::Relaxed) + 1;
        if current % self.every == 0 || current == self.total {
            self.emit(Event::Progress {
                current,
                total: self.total,
            });
        }
    }
}
