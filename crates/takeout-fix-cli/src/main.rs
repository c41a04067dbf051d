use std::path::PathBuf;
use std::time::Instant;

use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use takeout_fix_core::{
    CancellationToken, Event, ExifTool, LogLevel, Mode, ProcessControl, ProcessOptions,
};

#[derive(Parser)]
#[command(
    name = "takeout-fix",
    version,
    about = "Restore dates, GPS and descriptions from Google Takeout JSON sidecars into media files"
)]
struct Cli {
    /// Takeout folders or single media files
    #[arg(required = true)]
    paths: Vec<PathBuf>,

    /// Where fixed files go
    #[arg(short, long, value_enum, default_value_t = Mode::InPlace)]
    mode: Mode,

    /// Output directory (merge) or .zip file (zip)
    #[arg(short, long)]
    dest: Option<PathBuf>,

    /// Files processed at once
    #[arg(short, long, default_value_t = 25)]
    concurrency: usize,

    /// Seconds before a single tag write is abandoned
    #[arg(long, default_value_t = 120)]
    write_timeout: u64,

    /// exiftool executable
    #[arg(long, env = "EXIFTOOL_PATH", default_value = "exiftool")]
    exiftool: PathBuf,

    /// Parent directory for zip staging (default: system temp dir)
    #[arg(long)]
    staging_dir: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let t_total = Instant::now();

    let options = ProcessOptions {
        roots: cli.paths,
        mode: cli.mode,
        destination: cli.dest,
        concurrency: cli.concurrency,
        write_timeout_secs: cli.write_timeout,
        staging_parent: cli.staging_dir,
    };
    options.validate()?;

    let token = CancellationToken::new();
    {
        let token = token.clone();
        ctrlc::set_handler(move || {
            eprintln!("\nCancelling: waiting for files in flight...");
            token.cancel();
        })?;
    }

    let exiftool = ExifTool::start(cli.exiftool, options.write_timeout())?;

    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("Fixing {pos}/{len} {wide_bar} {eta}")?
            .progress_chars("=> "),
    );

    let sink = |event: Event| match event {
        Event::ScanSummary {
            media_count,
            sidecar_count,
        } => {
            pb.suspend(|| {
                eprintln!(
                    "Found {} media files and {} JSON files",
                    media_count, sidecar_count
                )
            });
        }
        Event::Progress { current, total } => {
            pb.set_length(total);
            pb.set_position(current);
        }
        Event::Log { level, message } => match level {
            LogLevel::Info => tracing::info!("{}", message),
            LogLevel::Warn => pb.suspend(|| eprintln!("Warning: {}", message)),
            LogLevel::Error => pb.suspend(|| eprintln!("Error: {}", message)),
            LogLevel::Success => pb.suspend(|| eprintln!("{}", message)),
        },
        Event::ScanStarted { .. } | Event::Summary(_) => {}
    };

    let control = ProcessControl::new().with_cancel_token(token);
    let result = takeout_fix_core::process_with_control(&options, &control, &exiftool, &sink);
    pb.finish_and_clear();
    exiftool.close();
    let summary = result?;

    eprintln!(
        "Done! {} files: {} fixed, {} skipped (no date), {} failed{} ({:.2}s)",
        summary.total,
        summary.fixed,
        summary.skipped,
        summary.failed,
        if summary.cancelled > 0 {
            format!(", {} cancelled", summary.cancelled)
        } else {
            String::new()
        },
        t_total.elapsed().as_secs_f64()
    );
    if let Some(output) = &summary.output {
        eprintln!("Output: {}", output.display());
    }

    Ok(())
}
