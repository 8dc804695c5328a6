use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use noise_meter::audio::WavSource;
use noise_meter::{
    AppConfig, CalibrationEngine, CalibrationFactor, CalibrationInput, DirectoryReportSink,
    MeasurementContext, MemoryReportSink, ReportSink, SessionEnd, StartRequest,
};
use serde::Serialize;

#[derive(Parser, Debug)]
#[command(
    name = "noise_cli",
    about = "Offline noise measurement harness: calibrate and measure WAV recordings"
)]
struct Cli {
    /// JSON configuration file (defaults are used when absent or invalid)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Compute a calibration factor from the reference interval of a recording
    Calibrate {
        #[arg(long)]
        wav: PathBuf,
        /// Reference interval length (defaults to calibration.min_window_ms)
        #[arg(long)]
        reference_ms: Option<u64>,
        /// Write the factor to this file for later reuse
        #[arg(long)]
        save: Option<PathBuf>,
    },
    /// Run a full session over a recording and print the report
    Measure {
        #[arg(long)]
        wav: PathBuf,
        /// Reuse a saved calibration instead of calibrating on the recording
        #[arg(long)]
        factor: Option<PathBuf>,
        #[arg(long)]
        reference_ms: Option<u64>,
        /// Persist the report as <session_id>.json in this directory
        #[arg(long)]
        out_dir: Option<PathBuf>,
        /// Write the report JSON here instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// List reports stored in a directory
    List {
        #[arg(long)]
        out_dir: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:?}");
            ExitCode::from(1)
        }
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => tracing::Level::INFO,
        1 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<ExitCode> {
    let config = cli
        .config
        .as_deref()
        .map(AppConfig::load_from_file)
        .unwrap_or_default();

    match cli.command {
        Commands::Calibrate {
            wav,
            reference_ms,
            save,
        } => run_calibrate(&config, &wav, reference_ms, save),
        Commands::Measure {
            wav,
            factor,
            reference_ms,
            out_dir,
            output,
        } => run_measure(config, &wav, factor, reference_ms, out_dir, output),
        Commands::List { out_dir } => run_list(&out_dir),
    }
}

#[derive(Serialize)]
struct CalibrationPayload {
    factor: f64,
    offset_db: f64,
    reference_samples: usize,
}

fn run_calibrate(
    config: &AppConfig,
    wav: &Path,
    reference_ms: Option<u64>,
    save: Option<PathBuf>,
) -> Result<ExitCode> {
    let source = WavSource::open(wav, config.sampler.tick_interval_ms)
        .with_context(|| format!("opening {}", wav.display()))?;
    let (window, _) =
        source.split_reference(reference_ms.unwrap_or(config.calibration.min_window_ms));

    let factor = CalibrationEngine::from_config(config)
        .calibrate(&window)
        .context("calibrating reference interval")?;

    if let Some(path) = save {
        factor
            .save_to_file(&path)
            .with_context(|| format!("writing {}", path.display()))?;
    }

    let payload = CalibrationPayload {
        factor: factor.value(),
        offset_db: factor.offset_db(),
        reference_samples: window.len(),
    };
    println!("{}", serde_json::to_string_pretty(&payload)?);
    Ok(ExitCode::from(0))
}

fn run_measure(
    config: AppConfig,
    wav: &Path,
    factor_path: Option<PathBuf>,
    reference_ms: Option<u64>,
    out_dir: Option<PathBuf>,
    output: Option<PathBuf>,
) -> Result<ExitCode> {
    let source = WavSource::open(wav, config.sampler.tick_interval_ms)
        .with_context(|| format!("opening {}", wav.display()))?;

    let (calibration, frames) = match factor_path {
        Some(path) => {
            let factor = CalibrationFactor::load_from_file(&path)
                .with_context(|| format!("loading calibration {}", path.display()))?;
            (CalibrationInput::Reuse(factor), source.frames())
        }
        None => {
            let (window, rest) =
                source.split_reference(reference_ms.unwrap_or(config.calibration.min_window_ms));
            (CalibrationInput::Window(window), rest)
        }
    };
    let Some(first) = frames.first() else {
        bail!("{} has no audio after the reference interval", wav.display());
    };
    let started_at_ms = first.timestamp_ms;
    let frames = frames.to_vec();

    let sink: Arc<dyn ReportSink> = match &out_dir {
        Some(dir) => Arc::new(
            DirectoryReportSink::new(dir)
                .with_context(|| format!("opening report directory {}", dir.display()))?,
        ),
        None => Arc::new(MemoryReportSink::new()),
    };
    let context = MeasurementContext::new(config, sink);

    let runtime = tokio::runtime::Runtime::new().context("starting async runtime")?;
    runtime.block_on(async move {
        context
            .start(StartRequest {
                at_ms: started_at_ms,
                calibration,
            })
            .context("starting session")?;

        let (mut producer, consumer) = context.open_frame_queue();
        let feeder = std::thread::spawn(move || WavSource::feed_blocking(&frames, &mut producer));

        let end = context
            .run_until_finished(consumer)
            .await
            .context("measuring")?;
        let fed = feeder
            .join()
            .map_err(|_| anyhow::anyhow!("frame feeder thread panicked"))?;
        tracing::debug!(fed, ?end, "Recording consumed");

        match &end {
            SessionEnd::SourceFailed(_) | SessionEnd::Interrupted(_) => {
                let snapshot = context.snapshot(0)?;
                eprintln!(
                    "Session did not complete ({:?}), state {}: {:?}",
                    end, snapshot.state, snapshot.error
                );
                return Ok(ExitCode::from(2));
            }
            SessionEnd::SourceEnded | SessionEnd::TimedOut => {}
        }

        let report = context.finish_report().context("assembling report")?;
        let ack = context
            .save_report(&report)
            .await
            .context("saving report")?;
        tracing::info!(session_id = %ack.session_id, created = ack.created, "Report persisted");

        let json = serde_json::to_string_pretty(&report)?;
        match output {
            Some(path) => {
                fs::write(&path, json).with_context(|| format!("writing {}", path.display()))?
            }
            None => println!("{json}"),
        }

        let telemetry = context.telemetry().snapshot();
        log::debug!(
            "[noise_cli] Telemetry: {} events, missed samples {}",
            telemetry.total_events,
            context.snapshot(0)?.missed_samples
        );

        Ok::<_, anyhow::Error>(ExitCode::from(0))
    })
}

fn run_list(out_dir: &Path) -> Result<ExitCode> {
    let sink = DirectoryReportSink::new(out_dir)
        .with_context(|| format!("opening report directory {}", out_dir.display()))?;
    let ids = sink.list()?;
    if ids.is_empty() {
        println!("No reports found under {}", out_dir.display());
        return Ok(ExitCode::from(0));
    }

    for id in ids {
        match sink.load(&id)? {
            Some(report) => println!(
                "{}  avg {:.1} dB  peak {:.1} dB  {:?}",
                id, report.average_db, report.peak_db, report.verdict
            ),
            None => println!("{}", id),
        }
    }
    Ok(ExitCode::from(0))
}
