use std::fs::File;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info, warn, LevelFilter};

use tracksync::artwork::HttpArtworkFetcher;
use tracksync::catalog::{CatalogProvider, JsonCatalog};
use tracksync::cleanup::install_interrupt_handler;
use tracksync::loudness::FfmpegNormalizer;
use tracksync::models::{RemoteTrack, SyncOptions};
use tracksync::progress::{create_spinner, format_duration, set_log_only};
use tracksync::safety::{validate_binary, validate_library_folder};
use tracksync::source::YtDlpSource;
use tracksync::sync::{Services, SyncReport, SyncSession};
use tracksync::tags::LoftyTagWriter;
use tracksync::track::{build_records, count_local, count_missing};

const LOG_FILE: &str = "tracksync.log";

#[derive(Parser)]
#[command(name = "tracksync")]
#[command(about = "Synchronize a local music folder with a remote library or playlist")]
struct Args {
    /// Library folder to synchronize
    #[arg(long, default_value = ".")]
    folder: PathBuf,

    /// Exported catalog (JSON) to synchronize against
    #[arg(long, env = "TRACKSYNC_CATALOG")]
    catalog: PathBuf,

    /// Playlist URI or id (default: the whole library)
    #[arg(long)]
    playlist: Option<String>,

    /// Look for better results for tracks already on disk
    #[arg(long)]
    replace_local: bool,

    /// Rewrite tags of tracks already on disk
    #[arg(long)]
    flush_metadata: bool,

    #[arg(long)]
    disable_normalization: bool,

    /// Confirm every accepted result before fetching
    #[arg(long)]
    interactive: bool,

    /// Also write logs to tracksync.log inside the library folder
    #[arg(long)]
    log: bool,

    /// Verbose logging; implies --serial
    #[arg(long)]
    debug: bool,

    /// Finish each track's post-processing before starting the next
    #[arg(long)]
    serial: bool,

    /// Search only, never fetch or write
    #[arg(long)]
    simulate: bool,

    /// Hide progress bars (tail-friendly output)
    #[arg(long)]
    log_only: bool,

    /// Post-processing worker threads
    #[arg(long, default_value = "2")]
    workers: usize,

    /// Threads for record construction (0 = rayon default)
    #[arg(long, default_value = "0")]
    threads: usize,

    /// Results requested per search
    #[arg(long, default_value = "10")]
    search_results: usize,

    #[arg(long, env = "TRACKSYNC_YT_DLP", default_value = "yt-dlp")]
    yt_dlp: PathBuf,

    #[arg(long, env = "TRACKSYNC_FFMPEG", default_value = "ffmpeg")]
    ffmpeg: PathBuf,
}

impl Args {
    fn sync_options(&self) -> SyncOptions {
        SyncOptions {
            replace_local: self.replace_local,
            flush_metadata: self.flush_metadata,
            disable_normalization: self.disable_normalization,
            simulate: self.simulate,
            serial: self.serial || self.debug,
            workers: self.workers.max(1),
        }
    }
}

fn init_logging(args: &Args) -> Result<()> {
    let level = if args.debug {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    let mut builder = env_logger::Builder::from_default_env();
    builder.filter_level(level);
    if args.log {
        let path = args.folder.join(LOG_FILE);
        let file = File::create(&path)
            .with_context(|| format!("Failed to create log file {}", path.display()))?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }
    builder.try_init().context("Failed to initialize logging")?;
    Ok(())
}

/// Fatal pre-flight checks: nothing is touched unless all pass.
fn preflight(args: &Args) -> Result<()> {
    validate_library_folder(&args.folder)?;
    validate_binary(&args.yt_dlp, "--version")?;
    if !args.simulate && !args.disable_normalization {
        validate_binary(&args.ffmpeg, "-version")?;
    }
    Ok(())
}

fn load_catalog(args: &Args) -> Result<Vec<RemoteTrack>> {
    let catalog = JsonCatalog::open(&args.catalog)
        .with_context(|| format!("Failed to load catalog {}", args.catalog.display()))?;
    let remote = match &args.playlist {
        Some(uri) => catalog
            .playlist(uri)
            .with_context(|| format!("Failed to load playlist {}", uri))?,
        None => catalog.library().context("Failed to load library")?,
    };
    Ok(remote)
}

fn print_summary(report: &SyncReport, rejected: usize) {
    println!("\n{:=<60}", "");
    println!("Synchronization {}", if report.interrupted { "interrupted" } else { "complete" });
    println!("  Tracks: {}", report.total);
    println!("  Committed: {}", report.committed);
    println!("  Skipped: {}", report.skipped);
    if report.simulated > 0 {
        println!("  Simulated: {}", report.simulated);
    }
    println!("  Failed: {}", report.failed.len());
    if rejected > 0 {
        println!("  Unusable remote entries: {}", rejected);
    }
    println!("  Elapsed: {}", format_duration(report.elapsed));
    println!("{:=<60}", "");
    for failure in &report.failed {
        println!("  - {}", failure);
    }
}

fn run(args: &Args) -> Result<(SyncReport, usize)> {
    if args.threads > 0 {
        rayon::ThreadPoolBuilder::new()
            .num_threads(args.threads)
            .build_global()
            .context("Failed to set thread pool size")?;
    }

    let library = args
        .folder
        .canonicalize()
        .with_context(|| format!("Failed to resolve {}", args.folder.display()))?;
    info!("Library folder: {}", library.display());

    let remote = load_catalog(args)?;
    info!("Fetched {} remote tracks", remote.len());

    let spinner = create_spinner("Inspecting library");
    let built = build_records(&remote, &library);
    spinner.finish_and_clear();
    for (index, reason) in &built.rejected {
        warn!("Ignoring remote entry {}: {}", index, reason);
    }
    if built.duplicates > 0 {
        info!("{} duplicate remote entries collapsed", built.duplicates);
    }
    info!(
        "{} missing, {} already local",
        count_missing(&built.records),
        count_local(&built.records)
    );

    let mut session = SyncSession::new(library, built.records, args.sync_options());
    install_interrupt_handler(session.artifact_snapshot(), session.interrupt_handle())
        .context("Failed to install interrupt handler")?;

    let source = YtDlpSource::new(args.yt_dlp.clone(), args.search_results, args.interactive);
    let normalizer = FfmpegNormalizer::new(args.ffmpeg.clone());
    let artwork = HttpArtworkFetcher::new();
    let services = Services {
        source: &source,
        metadata: &LoftyTagWriter,
        normalizer: &normalizer,
        artwork: &artwork,
    };

    let report = session.run(services);
    Ok((report, built.rejected.len()))
}

fn exit_code(report: &SyncReport) -> ExitCode {
    if report.is_complete() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    set_log_only(args.log_only);

    if let Err(e) = init_logging(&args) {
        eprintln!("{:#}", e);
        return ExitCode::from(2);
    }
    if let Err(e) = preflight(&args) {
        error!("{:#}", e);
        return ExitCode::from(2);
    }

    let start = Instant::now();
    match run(&args) {
        Ok((report, rejected)) => {
            print_summary(&report, rejected);
            info!("Done in {}", format_duration(start.elapsed()));
            exit_code(&report)
        }
        Err(e) => {
            error!("{:#}", e);
            ExitCode::from(2)
        }
    }
}
