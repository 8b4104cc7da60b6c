use anyhow::{bail, Context, Result};
use chrono::Local;
use clap::{Args, Parser, Subcommand};
use log::info;
use nauticai::core::config::{AppConfig, Turbidity};
use nauticai::core::dataset::{remap_labels, split_dataset, DatasetLayout, SourceDataset};
use nauticai::core::detection::{Detector, ModelManager, ReplayDetector};
use nauticai::core::inspect::ImageInspector;
use nauticai::core::report::ReportRenderer;
use nauticai::core::session::SessionLog;
use nauticai::core::severity::{display_name, Severity};
use nauticai::core::video::{FfmpegSource, FrameSource, ScanControl, ScanPlan, ScanProgress, VideoScanner};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(
    name = "nauticai",
    about = "Underwater inspection: detect, deduplicate and report anomalies",
    arg_required_else_help = true
)]
struct Cli {
    /// JSON5 config file
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Inspect one or more still images
    Image(ImageArgs),
    /// Scan a video file
    Video(VideoArgs),
    /// Resolve the model, downloading the baseline if no custom weights exist
    FetchModel,
    /// Rewrite YOLO label class ids into the unified taxonomy
    RemapLabels(RemapArgs),
    /// Move a share of the training images (and labels) to validation
    SplitDataset(SplitArgs),
}

#[derive(Args, Clone)]
struct DetectArgs {
    /// Confidence threshold (0.10 - 1.0)
    #[arg(long)]
    conf: Option<f32>,

    /// Simulate underwater conditions before detection
    #[arg(long)]
    simulate: bool,

    /// low, medium or high
    #[arg(long, value_name = "LEVEL")]
    turbidity: Option<String>,

    /// Disable marine snow particles
    #[arg(long)]
    no_snow: bool,

    /// Replay recorded detections instead of running a model
    #[arg(long, value_name = "FILE")]
    detections: Option<PathBuf>,

    #[arg(long)]
    mission: Option<String>,
    #[arg(long)]
    operator: Option<String>,
    #[arg(long)]
    vessel: Option<String>,
    #[arg(long)]
    location: Option<String>,

    /// Write the PDF report here
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Write the anomaly log as JSON here
    #[arg(long, value_name = "FILE")]
    log_json: Option<PathBuf>,
}

#[derive(Args, Clone)]
struct ImageArgs {
    #[arg(required = true, value_name = "IMAGE")]
    paths: Vec<PathBuf>,

    #[command(flatten)]
    detect: DetectArgs,
}

#[derive(Args, Clone)]
struct VideoArgs {
    #[arg(value_name = "VIDEO")]
    path: PathBuf,

    /// Process every N frames (1 - 30, default about two per second)
    #[arg(long)]
    skip: Option<u32>,

    /// Max frames to scan (10 - 300, default covers the whole video)
    #[arg(long)]
    max_frames: Option<u32>,

    #[command(flatten)]
    detect: DetectArgs,
}

#[derive(Args, Clone)]
struct RemapArgs {
    #[arg(value_name = "DIR")]
    dirs: Vec<PathBuf>,

    /// underwater_bot, corrosion_pipeline or marine_debris
    #[arg(long, default_value = "underwater_bot")]
    dataset: String,
}

#[derive(Args, Clone)]
struct SplitArgs {
    /// Dataset root holding images/ and labels/
    #[arg(default_value = "dataset")]
    root: PathBuf,

    #[arg(long, default_value_t = 0.8)]
    ratio: f64,

    /// Seed for a reproducible split
    #[arg(long)]
    seed: Option<u64>,
}

fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    match path {
        Some(p) => AppConfig::load(p).with_context(|| format!("loading config {}", p.display())),
        None => Ok(AppConfig::default()),
    }
}

fn apply_overrides(config: &mut AppConfig, args: &DetectArgs) -> Result<()> {
    if let Some(conf) = args.conf {
        config.set_confidence(conf);
    }
    if args.simulate {
        config.simulation.enabled = true;
    }
    if let Some(level) = &args.turbidity {
        config.simulation.turbidity = level.parse::<Turbidity>()?;
    }
    if args.no_snow {
        config.simulation.marine_snow = false;
    }
    let mission = &mut config.mission;
    for (field, value) in [
        (&mut mission.name, &args.mission),
        (&mut mission.operator, &args.operator),
        (&mut mission.vessel, &args.vessel),
        (&mut mission.location, &args.location),
    ] {
        if let Some(v) = value {
            *field = v.clone();
        }
    }
    Ok(())
}

fn build_detector(config: &AppConfig, args: &DetectArgs) -> Result<Box<dyn Detector>> {
    if let Some(path) = &args.detections {
        let detector = ReplayDetector::from_file(path)
            .with_context(|| format!("loading detections {}", path.display()))?;
        return Ok(Box::new(detector));
    }
    load_model(config)
}

#[cfg(feature = "onnx")]
fn load_model(config: &AppConfig) -> Result<Box<dyn Detector>> {
    use nauticai::core::detection::YoloDetector;

    let source = ModelManager::new(&config.model).resolve()?;
    Ok(Box::new(YoloDetector::load(&source)?))
}

#[cfg(not(feature = "onnx"))]
fn load_model(_config: &AppConfig) -> Result<Box<dyn Detector>> {
    bail!("built without the `onnx` feature; pass --detections <file> to replay recorded detections")
}

fn finish(log: &SessionLog, config: &AppConfig, detector: &dyn Detector, args: &DetectArgs) -> Result<()> {
    println!("\n{}", log.outcome_message());
    for (class_name, count) in log.class_counts() {
        println!(
            "  {:<16} {:>3}x  {}",
            display_name(&class_name),
            count,
            Severity::of(&class_name)
        );
    }

    if let Some(path) = &args.log_json {
        std::fs::write(path, log.to_json()?).with_context(|| format!("writing {}", path.display()))?;
        println!("Anomaly log written to {}", path.display());
    }

    if let Some(path) = &args.output {
        let renderer = ReportRenderer::new(config.mission.clone(), detector.label());
        let pdf = renderer.render_log(log, Local::now().naive_local())?;
        std::fs::write(path, pdf).with_context(|| format!("writing {}", path.display()))?;
        println!("Report written to {}", path.display());
    }
    Ok(())
}

fn run_images(mut config: AppConfig, args: ImageArgs) -> Result<()> {
    apply_overrides(&mut config, &args.detect)?;
    let detector = build_detector(&config, &args.detect)?;
    let mut inspector = ImageInspector::new();
    let mut log = SessionLog::new();
    let mut rng = StdRng::from_entropy();

    for path in &args.paths {
        let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
        let id = path.to_string_lossy();
        let result = inspector.inspect(
            detector.as_ref(),
            &id,
            &bytes,
            config.confidence,
            &config.simulation,
            &mut log,
            &mut rng,
        )?;

        if result.detections.is_empty() {
            println!("{}: no anomalies detected - surface appears healthy.", path.display());
            continue;
        }
        println!("{}: {} detections, {} logged", path.display(), result.detections.len(), result.logged);
        for det in &result.detections {
            println!(
                "  {:<16} {:>3}%  {}",
                display_name(&det.class_name),
                (det.confidence * 100.0) as u32,
                Severity::of(&det.class_name)
            );
        }
    }

    finish(&log, &config, detector.as_ref(), &args.detect)
}

fn run_video(mut config: AppConfig, args: VideoArgs) -> Result<()> {
    apply_overrides(&mut config, &args.detect)?;
    if args.skip.is_some() {
        config.video.skip = args.skip;
    }
    if args.max_frames.is_some() {
        config.video.max_frames = args.max_frames;
    }
    let detector = build_detector(&config, &args.detect)?;

    let mut source = FfmpegSource::open(&args.path)?;
    let probe = source.probe();
    let recommended = ScanPlan::recommended(&probe);
    let plan = recommended.with_overrides(&config.video);
    println!(
        "{} frames @ {:.1} FPS, {:.1}s | every {} frames (recommended {}), up to {} frames",
        probe.frame_count, probe.fps, probe.duration, plan.skip, recommended.skip, plan.max_frames
    );

    let scanner = VideoScanner::new(detector.as_ref(), config.confidence, config.simulation.clone());
    let mut log = SessionLog::new();
    let mut observer = |p: &ScanProgress| {
        info!(
            "SCANNING {}/{} FRAMES | DETECTIONS LOGGED: {} | TIME: {}",
            p.processed, p.max_frames, p.total_logged, p.clock
        );
        ScanControl::Continue
    };
    let report = scanner.scan(&mut source, plan, &mut log, Some(&mut observer))?;
    println!(
        "Scanned {} of {} frames read, {} anomaly instances logged",
        report.frames_processed, report.frames_read, report.events_added
    );

    finish(&log, &config, detector.as_ref(), &args.detect)
}

fn main() -> Result<()> {
    nauticai::init_logging();
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Image(args) => run_images(config, args),
        Commands::Video(args) => run_video(config, args),
        Commands::FetchModel => {
            let source = ModelManager::new(&config.model).resolve()?;
            println!("{}: {}", source.label(), source.path().display());
            Ok(())
        }
        Commands::RemapLabels(args) => {
            if args.dirs.is_empty() {
                bail!("no label directories given");
            }
            let dataset: SourceDataset = args.dataset.parse()?;
            let map = dataset.class_map();
            for dir in &args.dirs {
                let count = remap_labels(dir, &map).with_context(|| format!("remapping {}", dir.display()))?;
                println!("Remapped {} files in {}", count, dir.display());
            }
            Ok(())
        }
        Commands::SplitDataset(args) => {
            let layout = DatasetLayout::new(&args.root);
            let mut rng = match args.seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_entropy(),
            };
            let summary = split_dataset(&layout, args.ratio, &mut rng)?;
            println!(
                "Total images: {}, moved {} images and {} labels to val",
                summary.total, summary.moved_images, summary.moved_labels
            );
            Ok(())
        }
    }
}
