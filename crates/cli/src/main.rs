use std::path::{Path, PathBuf};
use std::process;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use crossbeam_channel::RecvTimeoutError;

use vision_host_core::capture::domain::source_spec::SourceSpec;
use vision_host_core::capture::infrastructure::ffmpeg_source::list_cameras;
use vision_host_core::orchestration::command_worker::{
    CommandOutcome, CommandWorker, EngineCommand, EngineHandle,
};
use vision_host_core::orchestration::run_status::RunStatus;
use vision_host_core::pipeline::domain::pipeline_registry::PipelineRegistry;
use vision_host_core::shared::constants::{IMAGE_EXTENSIONS, PASSTHROUGH_PIPELINE_ID};
use vision_host_core::shared::engine_config::EngineConfig;
use vision_host_core::shared::pipeline_settings::PipelineSettings;

const METRICS_INTERVAL: Duration = Duration::from_secs(1);

/// Real-time frame processing host for cameras and video files.
#[derive(Parser)]
#[command(name = "vision-host")]
struct Cli {
    /// Engine config file (defaults to the platform config directory).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Process a camera or video file through a pipeline.
    Run(RunArgs),
    /// List registered pipelines and their default settings.
    Pipelines,
    /// List cameras that can be opened.
    Cameras,
}

#[derive(clap::Args)]
struct RunArgs {
    /// Camera index or video file path.
    #[arg(long)]
    source: String,

    /// Pipeline id, or "none" to pass frames through.
    #[arg(long, default_value = "none")]
    pipeline: String,

    /// Pipeline setting override (repeatable).
    #[arg(long = "set", value_name = "KEY=VALUE")]
    settings: Vec<String>,

    /// Record the annotated stream to this video file.
    #[arg(long)]
    record: Option<PathBuf>,

    /// Save the last annotated frame to this image file.
    #[arg(long)]
    save_frame: Option<PathBuf>,

    /// Save the last result to this JSON file.
    #[arg(long)]
    save_results: Option<PathBuf>,

    /// Stop after this many seconds (required for cameras).
    #[arg(long)]
    duration: Option<f64>,
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => EngineConfig::load_from(path),
        None => EngineConfig::load(),
    };
    let registry = PipelineRegistry::with_builtins();

    match cli.command {
        Command::Run(args) => run_engine(args, config, registry),
        Command::Pipelines => {
            print_pipelines(&registry);
            Ok(())
        }
        Command::Cameras => {
            print_cameras(&config);
            Ok(())
        }
    }
}

fn run_engine(
    args: RunArgs,
    config: EngineConfig,
    registry: PipelineRegistry,
) -> Result<(), Box<dyn std::error::Error>> {
    let source: SourceSpec = args.source.parse()?;
    let settings = PipelineSettings::from_pairs(&args.settings)?;
    validate(&args, &source, &registry)?;

    let handle = CommandWorker::new(&config, registry).spawn();
    let events = handle.orchestrator().status_events();

    handle.execute(EngineCommand::Start {
        source: source.clone(),
        pipeline: Some(args.pipeline.clone()),
        settings,
    })?;
    log::info!("Running '{}' on {source}", args.pipeline);

    if let Some(path) = &args.record {
        if let CommandOutcome::RecordingStarted(info) =
            handle.execute(EngineCommand::StartRecording(path.clone()))?
        {
            log::info!("Recording at {:.1} fps", info.fps);
        }
    }

    let status = wait_for_run(&handle, &events, args.duration)?;
    eprintln!();

    if let Some(path) = &args.save_frame {
        handle.execute(EngineCommand::SaveFrame(path.clone()))?;
    }
    if let Some(path) = &args.save_results {
        handle.execute(EngineCommand::SaveResults(path.clone()))?;
    }

    match status {
        RunStatus::Errored(msg) => Err(format!("Capture failed: {msg}").into()),
        other => {
            log::info!("Run {other}");
            Ok(())
        }
    }
}

/// Waits for the run to end on its own or for `duration` to elapse,
/// printing metrics once per interval.
fn wait_for_run(
    handle: &EngineHandle,
    events: &crossbeam_channel::Receiver<RunStatus>,
    duration: Option<f64>,
) -> Result<RunStatus, Box<dyn std::error::Error>> {
    let deadline = duration.map(|secs| Instant::now() + Duration::from_secs_f64(secs));
    loop {
        if deadline.is_some_and(|d| Instant::now() >= d) {
            handle.execute(EngineCommand::Stop)?;
            return Ok(handle.orchestrator().status());
        }
        match events.recv_timeout(METRICS_INTERVAL) {
            Ok(status) if status.is_terminal() => return Ok(status),
            Ok(_) => {}
            Err(RecvTimeoutError::Timeout) => {
                let m = handle.orchestrator().metrics();
                eprint!(
                    "\rFrames {} | {:.1} fps (avg {:.1}) | latency {:.1}ms",
                    m.frame_count, m.instant_fps, m.average_fps, m.average_latency_ms
                );
            }
            Err(RecvTimeoutError::Disconnected) => return Ok(handle.orchestrator().status()),
        }
    }
}

fn validate(
    args: &RunArgs,
    source: &SourceSpec,
    registry: &PipelineRegistry,
) -> Result<(), Box<dyn std::error::Error>> {
    if args.pipeline != PASSTHROUGH_PIPELINE_ID && !registry.contains(&args.pipeline) {
        return Err(format!(
            "Unknown pipeline '{}'; available: {}",
            args.pipeline,
            registry.ids().join(", ")
        )
        .into());
    }
    match source {
        SourceSpec::File(path) if !path.exists() => {
            return Err(format!("Input file not found: {}", path.display()).into());
        }
        SourceSpec::Camera(_) if args.duration.is_none() => {
            return Err("--duration is required for camera sources".into());
        }
        _ => {}
    }
    if let Some(secs) = args.duration {
        if !(secs.is_finite() && secs > 0.0) {
            return Err(format!("Duration must be a positive number, got {secs}").into());
        }
    }
    if let Some(path) = &args.save_frame {
        if !is_image(path) {
            return Err(format!(
                "Frame output must be one of: {}, got {}",
                IMAGE_EXTENSIONS.join(", "),
                path.display()
            )
            .into());
        }
    }
    Ok(())
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

fn print_pipelines(registry: &PipelineRegistry) {
    for id in registry.ids() {
        let label = registry.label(id).unwrap_or(id);
        let defaults = registry
            .default_settings(id)
            .map(|s| s.to_string())
            .unwrap_or_default();
        if defaults.is_empty() {
            println!("{id:<12} {label}");
        } else {
            println!("{id:<12} {label} ({defaults})");
        }
    }
}

fn print_cameras(config: &EngineConfig) {
    let cameras = list_cameras(config.camera_probe_limit);
    if cameras.is_empty() {
        println!("No cameras found");
    }
    for (index, label) in cameras {
        println!("{index:>3}  {label}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(source: &str) -> RunArgs {
        RunArgs {
            source: source.to_string(),
            pipeline: "none".to_string(),
            settings: Vec::new(),
            record: None,
            save_frame: None,
            save_results: None,
            duration: Some(1.0),
        }
    }

    #[test]
    fn test_unknown_pipeline_rejected() {
        let mut a = args("0");
        a.pipeline = "pose".to_string();
        let err = validate(&a, &SourceSpec::Camera(0), &PipelineRegistry::with_builtins());
        assert!(err.unwrap_err().to_string().contains("identity, motion"));
    }

    #[test]
    fn test_camera_requires_duration() {
        let mut a = args("0");
        a.duration = None;
        assert!(validate(&a, &SourceSpec::Camera(0), &PipelineRegistry::with_builtins()).is_err());
    }

    #[test]
    fn test_save_frame_needs_image_extension() {
        let mut a = args("0");
        a.save_frame = Some(PathBuf::from("frame.txt"));
        assert!(validate(&a, &SourceSpec::Camera(0), &PipelineRegistry::with_builtins()).is_err());
        a.save_frame = Some(PathBuf::from("frame.PNG"));
        assert!(validate(&a, &SourceSpec::Camera(0), &PipelineRegistry::with_builtins()).is_ok());
    }

    #[test]
    fn test_missing_file_rejected() {
        let a = args("missing.mp4");
        let source = SourceSpec::File(PathBuf::from("/nonexistent/missing.mp4"));
        assert!(validate(&a, &source, &PipelineRegistry::with_builtins()).is_err());
    }

    #[test]
    fn test_cli_parses_repeated_settings() {
        let cli = Cli::try_parse_from([
            "vision-host",
            "run",
            "--source",
            "clip.mp4",
            "--pipeline",
            "motion",
            "--set",
            "threshold=30",
            "--set",
            "min_area=0.01",
        ])
        .unwrap();
        let Command::Run(run) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(run.settings, vec!["threshold=30", "min_area=0.01"]);
    }
}
