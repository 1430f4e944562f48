use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use facedoor::{DoorApp, DoorError, FacedoorConfig};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;

#[derive(Parser, Debug)]
#[command(name = "facedoor")]
#[command(about = "Face recognition door access controller")]
#[command(version)]
#[command(long_about = "Recognizes enrolled faces from a camera feed and drives a door lock \
through a serial-connected microcontroller. Enroll people first, then run the live loop.")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "facedoor.toml", help = "Path to TOML configuration file")]
    config: String,

    /// Enable debug logging (most verbose)
    #[arg(short, long, help = "Enable debug level logging")]
    debug: bool,

    /// Enable verbose logging (info level)
    #[arg(short, long, help = "Enable verbose info level logging")]
    verbose: bool,

    /// Enable quiet mode (errors only)
    #[arg(short, long, help = "Enable quiet mode - only log errors")]
    quiet: bool,

    /// Override log format (json, pretty, compact)
    #[arg(long, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    log_format: Option<String>,

    /// Also write logs to this file
    #[arg(long, value_name = "PATH", help = "Write logs to a file in addition to stderr")]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Capture face samples for a person
    Enroll {
        /// Name to enroll (letters, digits and underscores work best)
        #[arg(short, long)]
        name: String,

        /// Number of samples to capture (defaults to the configured value)
        #[arg(short, long)]
        samples: Option<u32>,
    },
    /// Train the recognizer from the enrollment folder and report who is enrolled
    Train,
    /// Run the recognition and door control loop
    Run {
        /// Replay frames from a folder instead of the camera
        #[arg(long, value_name = "DIR")]
        frames: Option<PathBuf>,

        /// Do not listen for the q/Esc quit keys
        #[arg(long)]
        no_keyboard: bool,
    },
    /// Print default configuration in TOML format and exit
    PrintConfig,
    /// Validate configuration file and exit
    ValidateConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Handle special modes that don't require full initialization
    if let Command::PrintConfig = args.command {
        print_default_config()?;
        return Ok(());
    }

    let guard = init_logging(&args)?;

    info!("Starting facedoor v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    let exit_code = execute(args).await;

    info!("facedoor exited with code: {}", exit_code);
    drop(guard);
    std::process::exit(exit_code);
}

async fn execute(args: Args) -> i32 {
    let config = match FacedoorConfig::load_from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            eprintln!("✗ Failed to load configuration: {}", e);
            return 1;
        }
    };

    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        eprintln!("✗ Configuration validation failed: {}", e);
        return 1;
    }

    let keyboard_quit = config.system.keyboard_quit;
    let mut app = DoorApp::new(config);

    match args.command {
        Command::ValidateConfig | Command::PrintConfig => {
            info!("Configuration validation successful");
            println!("✓ Configuration is valid");
            0
        }
        Command::Enroll { name, samples } => {
            app.set_keyboard_enabled(keyboard_quit);
            match app.enroll(name, samples).await {
                Ok(report) if report.captured() > 0 => {
                    println!(
                        "✓ Captured {}/{} samples for {}",
                        report.captured(),
                        report.requested,
                        report.name
                    );
                    0
                }
                Ok(report) => {
                    eprintln!("✗ No samples captured for {}", report.name);
                    1
                }
                Err(e) => {
                    error!("Enrollment failed: {}", e);
                    eprintln!("✗ Enrollment failed: {}", e);
                    1
                }
            }
        }
        Command::Train => match app.train() {
            Some(recognizer) => {
                use facedoor::FaceClassifier;
                println!("✓ Trained recognizer for: {}", recognizer.labels().join(", "));
                0
            }
            None => {
                eprintln!(
                    "✗ No face samples found in {}, run `facedoor enroll` first",
                    app.config().enrollment.path
                );
                1
            }
        },
        Command::Run {
            frames,
            no_keyboard,
        } => {
            app.set_keyboard_enabled(keyboard_quit && !no_keyboard);
            match app.run(frames).await {
                Ok(report) => {
                    println!(
                        "Stopped after {} frames ({}): {} authorized, {} unknown faces",
                        report.frames,
                        report.reason,
                        report.authorized_faces,
                        report.unknown_faces
                    );
                    report.reason.exit_code()
                }
                Err(DoorError::NotTrained) => {
                    eprintln!("✗ No trained model, run `facedoor enroll` first");
                    1
                }
                Err(e) => {
                    error!("Door system failed to start: {}", e);
                    eprintln!("✗ {}", e);
                    1
                }
            }
        }
    }
}

fn init_logging(args: &Args) -> Result<Option<WorkerGuard>> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    // Determine log level based on flags
    let log_level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else if args.quiet {
        "error"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(log_level)));

    let fmt_layer = match args.log_format.as_deref() {
        Some("json") => fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        Some("compact") => fmt::layer()
            .compact()
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .boxed(),
        Some("pretty") | None => fmt::layer()
            .pretty()
            .with_target(true)
            .with_thread_ids(args.debug)
            .with_file(args.debug)
            .with_line_number(args.debug)
            .boxed(),
        Some(format) => {
            eprintln!("Warning: Unknown log format '{}', using default", format);
            fmt::layer()
                .with_target(true)
                .with_thread_ids(args.debug)
                .with_file(args.debug)
                .with_line_number(args.debug)
                .boxed()
        }
    };

    let (file_layer, guard) = match &args.log_file {
        Some(path) => {
            let file_name = path
                .file_name()
                .ok_or_else(|| anyhow!("Invalid log file path: {}", path.display()))?;
            let directory = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let appender = tracing_appender::rolling::never(directory, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_writer(writer).with_ansi(false)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(file_layer)
        .with(env_filter)
        .init();

    if guard.is_some() {
        warn!("Logging to file enabled");
    }

    Ok(guard)
}

/// Filter used when `RUST_LOG` is unset.
///
/// Door events stay visible at the default level so the log keeps the audit trail.
fn default_directives(log_level: &str) -> String {
    match log_level {
        "warn" => "facedoor=warn,facedoor::events=info".to_string(),
        level => format!("facedoor={}", level),
    }
}

/// Print default configuration in TOML format
fn print_default_config() -> Result<()> {
    println!("# facedoor configuration file");
    println!("# This is the default configuration with all available options");
    println!("# Any value can be overridden with FACEDOOR_<SECTION>__<KEY>, e.g. FACEDOOR_ACTUATOR__PORT");
    println!();
    println!("{}", toml::to_string_pretty(&FacedoorConfig::default())?);
    Ok(())
}
