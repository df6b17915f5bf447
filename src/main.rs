use anyhow::Result;
use clap::{Parser, Subcommand};
use polyscan::analysis::{render_history, FAILURE_MESSAGE};
use polyscan::{
    AnalysisClient, EventBus, HttpAnalysisClient, ImagePayload, PipelineOrchestrator,
    PolyscanConfig,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info};

#[derive(Parser, Debug)]
#[command(name = "polyscan")]
#[command(about = "Optical sensor stream monitor and microplastic analysis client")]
#[command(version)]
#[command(long_about = "Keeps a live connection to a networked optical sensor, reconnecting \
automatically when it drops, and submits sample images to a classification backend for \
microplastic analysis.")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "polyscan.toml", help = "Path to TOML configuration file")]
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

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration file and exit")]
    validate_config: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,

    /// Override log format (json, pretty, compact)
    #[arg(long, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    log_format: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Watch the live sensor stream until interrupted (default)
    Monitor {
        /// Sensor address to use instead of the configured default
        #[arg(long, value_name = "ADDR")]
        endpoint: Option<String>,
    },
    /// Submit an image for analysis while the stream is monitored
    Analyze {
        /// Image file to analyze
        file: PathBuf,

        /// Sensor address to use instead of the configured default
        #[arg(long, value_name = "ADDR")]
        endpoint: Option<String>,
    },
    /// Print the backend's analysis history
    History,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_config {
        print_default_config()?;
        return Ok(());
    }

    init_logging(&args)?;

    info!("Starting polyscan v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    let config = match PolyscanConfig::load_from_file(&args.config) {
        Ok(config) => {
            info!("Configuration loaded successfully from: {}", args.config);
            config
        }
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        eprintln!("✗ Configuration validation failed: {}", e);
        std::process::exit(1);
    }

    if args.validate_config {
        info!("Configuration validation successful");
        println!("✓ Configuration is valid");
        return Ok(());
    }

    let exit_code = match args.command {
        None => run_monitor(build_orchestrator(config, args.debug)?, None).await?,
        Some(Command::Monitor { endpoint }) => {
            run_monitor(build_orchestrator(config, args.debug)?, endpoint).await?
        }
        Some(Command::Analyze { file, endpoint }) => {
            run_analyze(build_orchestrator(config, args.debug)?, file, endpoint).await?
        }
        Some(Command::History) => run_history(&config).await?,
    };

    info!("polyscan exited with code: {}", exit_code);
    std::process::exit(exit_code);
}

fn build_orchestrator(config: PolyscanConfig, debug_events: bool) -> Result<PipelineOrchestrator> {
    let client = HttpAnalysisClient::new(&config.analysis)?;
    let capacity = config.system.event_bus_capacity;
    let event_bus = if debug_events {
        EventBus::with_debug_logging(capacity)
    } else {
        EventBus::new(capacity)
    };
    Ok(PipelineOrchestrator::new(config, Arc::new(client), event_bus))
}

async fn run_monitor(
    mut orchestrator: PipelineOrchestrator,
    endpoint: Option<String>,
) -> Result<i32> {
    orchestrator.start().await?;
    if let Some(endpoint) = endpoint {
        orchestrator.override_endpoint(&endpoint);
    }

    // Print the status badge whenever it changes
    if let Some(stream) = orchestrator.stream() {
        let mut status = stream.subscribe_status();
        tokio::spawn(async move {
            let mut last = String::new();
            loop {
                let line = status.borrow_and_update().status_line();
                if line != last {
                    println!("{}", line);
                    last = line;
                }
                if status.changed().await.is_err() {
                    break;
                }
            }
        });

        let mut frames = stream.subscribe_frames();
        tokio::spawn(async move {
            while frames.changed().await.is_ok() {
                if let Some(frame) = frames.borrow_and_update().as_ref() {
                    debug!(
                        "Frame {} of attempt {}: {} bytes",
                        frame.sequence,
                        frame.attempt_id,
                        frame.data.len()
                    );
                }
            }
        });
    }

    let (reason, exit_code) = orchestrator.run_until_signal().await;
    info!("Monitor stopped: {:?}", reason);
    Ok(exit_code)
}

async fn run_analyze(
    mut orchestrator: PipelineOrchestrator,
    file: PathBuf,
    endpoint: Option<String>,
) -> Result<i32> {
    let payload = ImagePayload::from_path(&file).await?;
    println!("Selected {} ({})", payload.file_name(), payload.size_label());

    orchestrator.start().await?;
    if let Some(endpoint) = endpoint {
        orchestrator.override_endpoint(&endpoint);
    }

    orchestrator.begin_acquisition();
    orchestrator.select_file(payload);
    let succeeded = orchestrator.submit().await;

    if let Some(snapshot) = orchestrator.stream_snapshot() {
        println!("{}", snapshot.status_line());
    }

    let exit_code = match orchestrator.report_view() {
        Some(view) if succeeded => {
            println!("{}", view);
            0
        }
        _ => {
            eprintln!(
                "{}",
                orchestrator
                    .pipeline()
                    .error_message()
                    .unwrap_or(FAILURE_MESSAGE)
            );
            1
        }
    };

    let shutdown_code = orchestrator.shutdown().await;
    Ok(exit_code.max(shutdown_code))
}

async fn run_history(config: &PolyscanConfig) -> Result<i32> {
    let client = HttpAnalysisClient::new(&config.analysis)?;
    let records = client.fetch_history().await?;
    print!("{}", render_history(&records));
    if records.is_empty() {
        println!();
    }
    Ok(0)
}

fn init_logging(args: &Args) -> Result<()> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

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
        .unwrap_or_else(|_| EnvFilter::new(format!("polyscan={}", log_level)));

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

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(env_filter)
        .init();

    Ok(())
}

/// Print default configuration in TOML format
fn print_default_config() -> Result<()> {
    println!("# polyscan configuration file");
    println!("# Every key may also be set through the environment, e.g.");
    println!("# POLYSCAN_STREAM__DEFAULT_URL=http://192.168.1.50:81/stream");
    println!();
    println!("{}", PolyscanConfig::default().to_toml()?);
    Ok(())
}
