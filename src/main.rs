// Module-specific lints configuration
#![allow(clippy::uninlined_format_args)]

use anyhow::{anyhow, Context, Result};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{generate, Shell};
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn, Level, LevelFilter, Log, Metadata, Record, SetLoggerError};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use emotia::app_config::{self, Config};
use emotia::app_controller::Controller;
use emotia::file_utils::FileManager;
use emotia::inference::EmotionPredictor;

/// CLI Wrapper for LogLevel to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliLogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<CliLogLevel> for app_config::LogLevel {
    fn from(cli_level: CliLogLevel) -> Self {
        match cli_level {
            CliLogLevel::Error => app_config::LogLevel::Error,
            CliLogLevel::Warn => app_config::LogLevel::Warn,
            CliLogLevel::Info => app_config::LogLevel::Info,
            CliLogLevel::Debug => app_config::LogLevel::Debug,
            CliLogLevel::Trace => app_config::LogLevel::Trace,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the HTTP and WebSocket server (default command)
    Serve {
        /// Interface to bind
        #[arg(long)]
        host: Option<String>,

        /// Port to bind
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Create or migrate the database schema
    InitDb,

    /// Insert the demo admin, psychologist and patient into an empty database
    Seed,

    /// Classify an image, or every image under a directory, locally
    Predict {
        /// Image file or directory
        #[arg(value_name = "INPUT_PATH")]
        input_path: PathBuf,
    },

    /// Upload an image to a running server's /predict endpoint
    Send {
        /// Image file to upload
        #[arg(value_name = "IMAGE")]
        image: PathBuf,

        /// Server base URL (defaults to the configured address)
        #[arg(short, long)]
        url: Option<String>,
    },

    /// Generate shell completions for emotia
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// EMOTIA - live emotion recognition for remote therapy sessions
#[derive(Parser, Debug)]
#[command(name = "emotia")]
#[command(version)]
#[command(about = "Telehealth backend with live facial emotion recognition")]
#[command(long_about = "EMOTIA serves the clinic API (accounts, meetings, reports, chat) and relays
per-session emotion predictions over WebSockets.

EXAMPLES:
    emotia                                  # Serve using conf.json
    emotia serve --port 9000                # Serve on another port
    emotia init-db                          # Create the database schema
    emotia seed                             # Insert demo accounts
    emotia predict face.jpg                 # Classify one image locally
    emotia predict dataset/test/            # Classify a directory with a progress bar
    emotia send face.jpg --url http://localhost:8000
    emotia completions bash > emotia.bash   # Generate bash completions

CONFIGURATION:
    Configuration is stored in conf.json by default. If the file does not exist a
    default one is created. EMOTIA_JWT_SECRET and EMOTIA_DATABASE_PATH override
    the file.")]
struct CommandLineOptions {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file path
    #[arg(short, long, default_value = "conf.json", global = true)]
    config_path: String,

    /// Set logging level
    #[arg(short, long, value_enum, global = true)]
    log_level: Option<CliLogLevel>,
}

// @struct: Custom logger implementation
struct CustomLogger {
    level: LevelFilter,
}

impl CustomLogger {
    // @creates: New logger with specified level
    fn new(level: LevelFilter) -> Self {
        CustomLogger { level }
    }

    // @initializes: Global logger
    fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
        let logger = Box::new(CustomLogger::new(level));
        log::set_boxed_logger(logger)?;
        log::set_max_level(level);
        Ok(())
    }

    // @returns: ANSI colour and tag for a level
    fn style_for_level(level: Level) -> (&'static str, &'static str) {
        match level {
            Level::Error => ("\x1B[1;31m", "ERROR"),
            Level::Warn => ("\x1B[1;33m", "WARN "),
            Level::Info => ("\x1B[1;32m", "INFO "),
            Level::Debug => ("\x1B[1;36m", "DEBUG"),
            Level::Trace => ("\x1B[1;35m", "TRACE"),
        }
    }
}

impl Log for CustomLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let now = chrono::Local::now().format("%H:%M:%S.%3f");
            let (colour, tag) = Self::style_for_level(record.level());

            let mut stderr = std::io::stderr();
            let _ = writeln!(stderr, "{}{} {} {}\x1B[0m", colour, now, tag, record.args());
        }
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // The level is lowered or raised once the config is loaded
    CustomLogger::init(LevelFilter::Trace)?;
    log::set_max_level(LevelFilter::Info);

    let cli = CommandLineOptions::parse();

    if let Some(Commands::Completions { shell }) = &cli.command {
        let mut cmd = CommandLineOptions::command();
        generate(*shell, &mut cmd, "emotia", &mut std::io::stdout());
        return Ok(());
    }

    let config = load_config(&cli)?;
    log::set_max_level(config.log_level.to_level_filter());

    match cli.command {
        None => Controller::with_config(config)?.serve().await,
        Some(Commands::Serve { host, port }) => {
            let mut config = config;
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            Controller::with_config(config)?.serve().await
        }
        Some(Commands::InitDb) => {
            let stats = Controller::with_config(config)?.init_db()?;
            println!("{}", stats);
            Ok(())
        }
        Some(Commands::Seed) => {
            let created = Controller::with_config(config)?.seed().await?;
            if created == 0 {
                println!("Users already present, nothing seeded");
            } else {
                println!("Seeded {} users", created);
            }
            Ok(())
        }
        Some(Commands::Predict { input_path }) => {
            let controller = Controller::with_config(config)?;
            let predictor = controller.build_predictor()?;
            run_predict(&predictor, &input_path)
        }
        Some(Commands::Send { image, url }) => {
            let base_url = url.unwrap_or_else(|| format!("http://{}", config.server.bind_address()));
            run_send(&image, &base_url).await
        }
        Some(Commands::Completions { .. }) => Ok(()),
    }
}

fn load_config(cli: &CommandLineOptions) -> Result<Config> {
    let mut config = Config::load_or_create(&cli.config_path)?;
    config.apply_env_overrides();

    if let Some(log_level) = &cli.log_level {
        config.log_level = log_level.clone().into();
    }

    Ok(config)
}

fn run_predict(predictor: &EmotionPredictor, input_path: &Path) -> Result<()> {
    if FileManager::file_exists(input_path) {
        let bytes = FileManager::read_bytes(input_path)?;
        let prediction = predictor
            .predict(&bytes)
            .with_context(|| format!("Prediction failed for {:?}", input_path))?;

        println!(
            "{}: {} ({:.2}%){}",
            FileManager::display_name(input_path),
            prediction.emotion,
            prediction.confidence * 100.0,
            if prediction.face_detected { "" } else { " [no face, centre crop]" }
        );

        let mut scores: Vec<_> = prediction.scores.iter().collect();
        scores.sort_by(|a, b| b.1.total_cmp(a.1));
        for (label, score) in scores {
            println!("  {:<10} {:6.2}%", label, score * 100.0);
        }
        return Ok(());
    }

    if !FileManager::dir_exists(input_path) {
        return Err(anyhow!("Input path does not exist: {:?}", input_path));
    }

    let images = FileManager::find_images(input_path)?;
    if images.is_empty() {
        warn!("No images found under {:?}", input_path);
        return Ok(());
    }
    info!("Classifying {} images under {:?}", images.len(), input_path);

    let progress = ProgressBar::new(images.len() as u64);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .map_err(|e| anyhow!("Invalid progress template: {}", e))?
            .progress_chars("#>-"),
    );

    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    let mut failures = 0usize;
    for path in &images {
        progress.set_message(FileManager::display_name(path));
        let result = FileManager::read_bytes(path).and_then(|bytes| Ok(predictor.predict(&bytes)?));
        match result {
            Ok(prediction) => *counts.entry(prediction.emotion).or_default() += 1,
            Err(e) => {
                failures += 1;
                progress.suspend(|| error!("{:?}: {}", path, e));
            }
        }
        progress.inc(1);
    }
    progress.finish_with_message("done");

    for (emotion, count) in &counts {
        println!("{:<10} {}", emotion, count);
    }
    if failures > 0 {
        println!("{} images failed", failures);
    }
    Ok(())
}

async fn run_send(image: &Path, base_url: &str) -> Result<()> {
    let bytes = FileManager::read_bytes(image)?;
    let file_name = FileManager::display_name(image);
    let mime = match image.extension().map(|e| e.to_string_lossy().to_lowercase()).as_deref() {
        Some("png") => "image/png",
        _ => "image/jpeg",
    };

    let part = reqwest::multipart::Part::bytes(bytes)
        .file_name(file_name)
        .mime_str(mime)
        .context("Invalid MIME type")?;
    let form = reqwest::multipart::Form::new().part("file", part);

    let url = format!("{}/predict", base_url.trim_end_matches('/'));
    info!("Uploading {:?} to {}", image, url);

    let response = reqwest::Client::new()
        .post(&url)
        .multipart(form)
        .send()
        .await
        .with_context(|| format!("Request to {} failed", url))?;

    let status = response.status();
    let body: serde_json::Value = response.json().await.context("Server returned invalid JSON")?;
    println!("{}", serde_json::to_string_pretty(&body)?);

    if !status.is_success() {
        return Err(anyhow!("Server answered {}", status));
    }
    Ok(())
}
