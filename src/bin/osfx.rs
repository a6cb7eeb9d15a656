//! osfx CLI - Command-line interface for osf-expression
//!
//! Commands:
//! - run: Record expression classes, train, then classify the live stream
//! - inspect: Decode a capture file of raw packets
//! - schema: Print the wire layout or the feature order
//! - doctor: Diagnose configuration and listener health

use clap::{Parser, Subcommand, ValueEnum};
use log::{info, LevelFilter};
use std::fs;
use std::io::{self, BufRead, Cursor, Read, Write};
use std::net::{SocketAddr, UdpSocket};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use osf_expression::decoder::WIRE_LAYOUT;
use osf_expression::features::FEATURE_FIELDS;
use osf_expression::types::ExpressionCoefficients;
use osf_expression::{
    logging, CaptureSource, CentroidTrainer, ClassId, Config, FeatureProjector, FeatureVector,
    FrameDecoder, LabelTable, PacketSource, Prediction, TrackerError, TrainingOrchestrator,
    UdpSource, FEATURE_COUNT, FRAME_SIZE, PRODUCER_NAME, PROJECTION_VERSION, VERSION,
};

/// osfx - Facial expression training and live classification
#[derive(Parser)]
#[command(name = "osfx")]
#[command(version = VERSION)]
#[command(about = "Train and run an expression classifier on OpenSeeFace tracking data", long_about = None)]
struct Cli {
    /// Log level (off, error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info")]
    log_level: LevelFilter,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record expression classes, train, then classify the live stream
    Run {
        /// JSON configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// UDP address to listen on (overrides config)
        #[arg(long)]
        listen: Option<SocketAddr>,

        /// Samples recorded per class (overrides config)
        #[arg(long)]
        samples: Option<usize>,

        /// Class labels in recording order, comma separated (overrides config)
        #[arg(long, value_delimiter = ',')]
        labels: Vec<String>,

        /// Number of classes to record (defaults to the number of labels)
        #[arg(long)]
        class_count: Option<ClassId>,

        /// Seed for the dataset shuffle
        #[arg(long)]
        seed: Option<u64>,

        /// Write the collected dataset to this file (libsvm format)
        #[arg(long)]
        export_dataset: Option<PathBuf>,

        /// Replay a capture file instead of listening on UDP
        #[arg(long)]
        replay: Option<PathBuf>,

        /// Output format for predictions
        #[arg(long, default_value = "ndjson")]
        output_format: OutputFormat,

        /// Flush output after each prediction
        #[arg(long, default_value = "true")]
        flush: bool,
    },

    /// Decode a capture file of back-to-back raw packets
    Inspect {
        /// Capture file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Print every decoded frame as NDJSON instead of a report
        #[arg(long)]
        frames: bool,

        /// Output the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the wire layout or the feature order
    Schema {
        /// Schema to print
        #[arg(value_enum)]
        schema_type: SchemaType,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Diagnose configuration and listener health
    Doctor {
        /// JSON configuration file to check
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// UDP address to test (overrides config)
        #[arg(long)]
        listen: Option<SocketAddr>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Newline-delimited JSON (one prediction per line)
    Ndjson,
    /// Tab-separated label, class id and frame timestamp
    Text,
}

#[derive(Clone, ValueEnum)]
enum SchemaType {
    /// Packet layout (fields, offsets, widths)
    Wire,
    /// Feature vector order
    Features,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = logging::init(cli.log_level) {
        eprintln!("Failed to initialise logging: {}", e);
    }

    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e)).unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn run(command: Commands) -> Result<(), OsfxCliError> {
    match command {
        Commands::Run {
            config,
            listen,
            samples,
            labels,
            class_count,
            seed,
            export_dataset,
            replay,
            output_format,
            flush,
        } => {
            let overrides = RunOverrides {
                listen,
                samples,
                labels,
                class_count,
                seed,
                export_dataset,
            };
            let config = load_config(config.as_deref(), overrides)?;
            cmd_run(&config, replay.as_deref(), output_format, flush)
        }

        Commands::Inspect {
            input,
            frames,
            json,
        } => cmd_inspect(&input, frames, json),

        Commands::Schema { schema_type, json } => cmd_schema(schema_type, json),

        Commands::Doctor {
            config,
            listen,
            json,
        } => cmd_doctor(config.as_deref(), listen, json),
    }
}

struct RunOverrides {
    listen: Option<SocketAddr>,
    samples: Option<usize>,
    labels: Vec<String>,
    class_count: Option<ClassId>,
    seed: Option<u64>,
    export_dataset: Option<PathBuf>,
}

fn load_config(path: Option<&Path>, overrides: RunOverrides) -> Result<Config, OsfxCliError> {
    let mut config = match path {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };

    if let Some(listen) = overrides.listen {
        config.listen = listen;
    }
    if let Some(samples) = overrides.samples {
        config.samples_per_class = samples;
    }
    if !overrides.labels.is_empty() {
        config.labels = LabelTable::from_names(overrides.labels);
    }
    if overrides.class_count.is_some() {
        config.class_count = overrides.class_count;
    }
    if overrides.seed.is_some() {
        config.shuffle_seed = overrides.seed;
    }
    if overrides.export_dataset.is_some() {
        config.export_dataset = overrides.export_dataset;
    }

    config.validate()?;
    Ok(config)
}

fn cmd_run(
    config: &Config,
    replay: Option<&Path>,
    output_format: OutputFormat,
    flush: bool,
) -> Result<(), OsfxCliError> {
    let mut source: Box<dyn PacketSource> = match replay {
        Some(path) => {
            info!("Replaying capture {}", path.display());
            Box::new(CaptureSource::open(path)?)
        }
        None => Box::new(UdpSource::bind(config.listen)?),
    };

    let mut orchestrator = TrainingOrchestrator::new(config, CentroidTrainer)?;
    info!(
        "Session {}: {} classes, {} samples each, projection {} ({} features)",
        orchestrator.session_id(),
        orchestrator.class_count(),
        config.samples_per_class,
        PROJECTION_VERSION,
        FEATURE_COUNT
    );

    let interactive = replay.is_none() && atty::is(atty::Stream::Stdin);
    let mut stdout = io::stdout();

    orchestrator.run(
        source.as_mut(),
        |class_id, label| prompt_operator(interactive, class_id, label),
        |prediction| {
            let line = format_prediction(prediction, &output_format)?;
            writeln!(stdout, "{}", line)?;
            if flush {
                stdout.flush()?;
            }
            Ok(())
        },
    )?;

    Ok(())
}

/// Ask the operator to pose the next class. Non-interactive runs start
/// recording immediately.
fn prompt_operator(interactive: bool, class_id: ClassId, label: &str) -> io::Result<()> {
    if !interactive {
        info!("Recording class {} ({})", class_id, label);
        return Ok(());
    }

    eprint!(
        "Pose \"{}\" (class {}) and press Enter to start recording... ",
        label, class_id
    );
    io::stderr().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(())
}

fn format_prediction(
    prediction: &Prediction,
    format: &OutputFormat,
) -> Result<String, TrackerError> {
    match format {
        OutputFormat::Ndjson => Ok(serde_json::to_string(prediction)?),
        OutputFormat::Text => Ok(format!(
            "{}\t{}\t{:.3}",
            prediction.label, prediction.class_id, prediction.frame_timestamp
        )),
    }
}

fn cmd_inspect(input: &Path, frames: bool, json: bool) -> Result<(), OsfxCliError> {
    // Read input
    let data = if input.to_string_lossy() == "-" {
        let mut buffer = Vec::new();
        io::stdin().read_to_end(&mut buffer)?;
        buffer
    } else {
        fs::read(input)?
    };

    let mut source = CaptureSource::new(Cursor::new(data));
    let mut report = InspectReport {
        frame_size: FRAME_SIZE,
        total_chunks: 0,
        valid_frames: 0,
        malformed_chunks: 0,
        errors: Vec::new(),
    };

    while let Some(chunk) = source.recv()? {
        let index = report.total_chunks;
        report.total_chunks += 1;

        match FrameDecoder::decode(&chunk) {
            Ok(frame) => {
                report.valid_frames += 1;
                if frames {
                    let summary = FrameSummary {
                        index,
                        timestamp: frame.timestamp,
                        id: frame.id,
                        success: frame.success,
                        pnp_error: frame.pnp_error,
                        quaternion: frame.quaternion,
                        euler: frame.euler,
                        translation: frame.translation,
                        expression: frame.expression,
                        features: FeatureProjector::project(&frame),
                    };
                    println!("{}", serde_json::to_string(&summary)?);
                }
            }
            Err(e) => {
                report.malformed_chunks += 1;
                report.errors.push(InspectErrorDetail {
                    index,
                    error: e.to_string(),
                });
            }
        }
    }

    if !frames {
        if json {
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            println!("Capture Report");
            println!("==============");
            println!("Frame size:       {} bytes", report.frame_size);
            println!("Total chunks:     {}", report.total_chunks);
            println!("Valid frames:     {}", report.valid_frames);
            println!("Malformed chunks: {}", report.malformed_chunks);

            if !report.errors.is_empty() {
                println!("\nErrors:");
                for err in &report.errors {
                    println!("  - Chunk {}: {}", err.index, err.error);
                }
            }
        }
    }

    if report.malformed_chunks > 0 {
        Err(OsfxCliError::InspectFailed(report.malformed_chunks))
    } else {
        Ok(())
    }
}

fn cmd_schema(schema_type: SchemaType, json: bool) -> Result<(), OsfxCliError> {
    match schema_type {
        SchemaType::Wire => {
            let mut offset = 0;
            let mut fields = Vec::with_capacity(WIRE_LAYOUT.len());
            for field in WIRE_LAYOUT.iter() {
                fields.push(WireFieldInfo {
                    name: field.name,
                    offset,
                    width: field.width,
                });
                offset += field.width;
            }

            if json {
                let schema = serde_json::json!({
                    "frame_size": FRAME_SIZE,
                    "byte_order": "little-endian",
                    "fields": fields,
                });
                println!("{}", serde_json::to_string_pretty(&schema)?);
            } else {
                println!("Wire Layout: {} bytes, little-endian, packed", FRAME_SIZE);
                println!();
                println!("{:>6}  {:>5}  field", "offset", "width");
                for f in &fields {
                    println!("{:>6}  {:>5}  {}", f.offset, f.width, f.name);
                }
            }
        }
        SchemaType::Features => {
            let names = FeatureProjector::field_names();

            if json {
                let schema = serde_json::json!({
                    "projection": PROJECTION_VERSION,
                    "length": FEATURE_COUNT,
                    "fields": names,
                });
                println!("{}", serde_json::to_string_pretty(&schema)?);
            } else {
                println!(
                    "Feature Projection: {} ({} features, 1-based indices)",
                    PROJECTION_VERSION,
                    FEATURE_FIELDS.len()
                );
                println!();
                for (i, name) in names.iter().enumerate() {
                    println!("{:>3}  {}", i + 1, name);
                }
            }
        }
    }

    Ok(())
}

fn cmd_doctor(
    config_path: Option<&Path>,
    listen: Option<SocketAddr>,
    json: bool,
) -> Result<(), OsfxCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "version".to_string(),
        status: CheckStatus::Ok,
        message: format!("osf-expression version {}", VERSION),
    });

    checks.push(DoctorCheck {
        name: "protocol".to_string(),
        status: CheckStatus::Ok,
        message: format!(
            "Frame size {} bytes, projection {} ({} features)",
            FRAME_SIZE, PROJECTION_VERSION, FEATURE_COUNT
        ),
    });

    // Check configuration file if provided
    let mut config = Config::default();
    if let Some(path) = config_path {
        match Config::from_file(path) {
            Ok(loaded) => {
                let status = match loaded.validate() {
                    Ok(()) => DoctorCheck {
                        name: "config".to_string(),
                        status: CheckStatus::Ok,
                        message: format!(
                            "{} classes, {} samples each",
                            loaded.classes(),
                            loaded.samples_per_class
                        ),
                    },
                    Err(e) => DoctorCheck {
                        name: "config".to_string(),
                        status: CheckStatus::Error,
                        message: e.to_string(),
                    },
                };
                checks.push(status);
                config = loaded;
            }
            Err(e) => checks.push(DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Error,
                message: format!("Cannot load config: {}", e),
            }),
        }
    } else {
        checks.push(DoctorCheck {
            name: "config".to_string(),
            status: CheckStatus::Warning,
            message: "No config file given; labels must be passed to 'osfx run'".to_string(),
        });
    }

    // Check the listen address can be bound
    let addr = listen.unwrap_or(config.listen);
    checks.push(match UdpSocket::bind(addr) {
        Ok(_) => DoctorCheck {
            name: "listen".to_string(),
            status: CheckStatus::Ok,
            message: format!("{} is available", addr),
        },
        Err(e) => DoctorCheck {
            name: "listen".to_string(),
            status: CheckStatus::Error,
            message: format!("Cannot bind {}: {}", addr, e),
        },
    });

    // Check stdin is available (for operator prompts)
    checks.push(if atty::is(atty::Stream::Stdin) {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a TTY (operator prompts enabled)".to_string(),
        }
    } else {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Warning,
            message: "stdin is not a TTY (classes are recorded back to back)".to_string(),
        }
    });

    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("osfx Doctor Report");
        println!("==================");
        println!("Producer: {}", report.producer);
        println!("Version:  {}", report.version);
        println!("\nChecks:");

        for check in &report.checks {
            let status_icon = match check.status {
                CheckStatus::Ok => "[OK]",
                CheckStatus::Warning => "[WARN]",
                CheckStatus::Error => "[ERR]",
            };
            println!("  {} {}: {}", status_icon, check.name, check.message);
        }
    }

    let has_errors = report
        .checks
        .iter()
        .any(|c| matches!(c.status, CheckStatus::Error));
    if has_errors {
        Err(OsfxCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

// Error types

#[derive(Debug)]
enum OsfxCliError {
    Io(io::Error),
    Tracker(TrackerError),
    Json(serde_json::Error),
    InspectFailed(usize),
    DoctorFailed,
}

impl From<io::Error> for OsfxCliError {
    fn from(e: io::Error) -> Self {
        OsfxCliError::Io(e)
    }
}

impl From<TrackerError> for OsfxCliError {
    fn from(e: TrackerError) -> Self {
        OsfxCliError::Tracker(e)
    }
}

impl From<serde_json::Error> for OsfxCliError {
    fn from(e: serde_json::Error) -> Self {
        OsfxCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<OsfxCliError> for CliError {
    fn from(e: OsfxCliError) -> Self {
        match e {
            OsfxCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            OsfxCliError::Tracker(e) => tracker_error(e),
            OsfxCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: None,
            },
            OsfxCliError::InspectFailed(count) => CliError {
                code: "INSPECT_FAILED".to_string(),
                message: format!("{} chunks failed to decode", count),
                hint: Some(format!(
                    "Captures must be back-to-back {}-byte packets",
                    FRAME_SIZE
                )),
            },
            OsfxCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
        }
    }
}

fn tracker_error(e: TrackerError) -> CliError {
    let (code, hint) = match &e {
        TrackerError::Format(_) => ("FORMAT_ERROR", None),
        TrackerError::Transport(_) => (
            "TRANSPORT_ERROR",
            Some("Check the listen address and that the tracker is running"),
        ),
        TrackerError::Training(_) => (
            "TRAINING_FAILED",
            Some("Re-record the classes; no model was produced"),
        ),
        TrackerError::UnknownLabel(_) => (
            "UNKNOWN_LABEL",
            Some("The label table does not match the trained classes"),
        ),
        TrackerError::InvalidTransition { .. } => ("INVALID_STATE", None),
        TrackerError::Config(_) => (
            "CONFIG_ERROR",
            Some("Run 'osfx doctor --config <file>' for details"),
        ),
        TrackerError::Json(_) => ("JSON_ERROR", Some("Check JSON syntax")),
    };

    CliError {
        code: code.to_string(),
        message: e.to_string(),
        hint: hint.map(str::to_string),
    }
}

// Report types

#[derive(serde::Serialize)]
struct FrameSummary {
    index: usize,
    timestamp: f64,
    id: i32,
    success: bool,
    pnp_error: f32,
    quaternion: [f32; 4],
    euler: [f32; 3],
    translation: [f32; 3],
    expression: ExpressionCoefficients,
    features: FeatureVector,
}

#[derive(serde::Serialize)]
struct InspectReport {
    frame_size: usize,
    total_chunks: usize,
    valid_frames: usize,
    malformed_chunks: usize,
    errors: Vec<InspectErrorDetail>,
}

#[derive(serde::Serialize)]
struct InspectErrorDetail {
    index: usize,
    error: String,
}

#[derive(serde::Serialize)]
struct WireFieldInfo {
    name: &'static str,
    offset: usize,
    width: usize,
}

#[derive(serde::Serialize)]
struct DoctorReport {
    producer: String,
    version: String,
    checks: Vec<DoctorCheck>,
}

#[derive(serde::Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    message: String,
}

#[derive(serde::Serialize)]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}
