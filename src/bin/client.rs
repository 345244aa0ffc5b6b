//! # Client Binary Entry Point
//!
//! Terminal front-end for the remote steganography service.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --bin client -- --config config/client.toml inspect cat.png
//! cargo run --bin client -- embed cat.png notes.txt photo.jpg --password s3cret
//! cargo run --bin client -- extract cat.png
//! ```
//!
//! Each command:
//! 1. Loads configuration from the specified TOML file
//! 2. Selects and uploads the carrier image
//! 3. Runs the requested operation through the session middleware
//! 4. Exports metrics to JSON (if `--metrics-output` is given)

use anyhow::Context;
use clap::{Parser, Subcommand};
use log::LevelFilter;
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, BufReader};

use peekaboo_client::client::presenter::{PasswordPurpose, Presenter, Warning};
use peekaboo_client::client::{HttpStegoClient, SessionMetrics, SessionMiddleware};
use peekaboo_client::common::config::ClientConfig;
use peekaboo_client::common::messages::FileCategory;
use peekaboo_client::session::state::{CarrierImage, Completion, ExtractOutcome};
use peekaboo_client::session::CandidateFile;
use peekaboo_client::utils::init_logger;

/// Command-line arguments for the client binary
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the client configuration file (TOML format)
    #[arg(short, long, default_value = "config/client.toml")]
    config: String,

    /// Path to write metrics JSON output (optional)
    #[arg(long)]
    metrics_output: Option<String>,

    /// Log at debug level
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Upload a carrier image and show its analysis
    Inspect { image: PathBuf },
    /// Hide files inside a carrier image
    Embed {
        image: PathBuf,
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Password protecting the embedded files (prompted for if omitted)
        #[arg(long)]
        password: Option<String>,
    },
    /// Recover files hidden inside a carrier image
    Extract {
        image: PathBuf,
        /// Password for the first attempt (prompted for if omitted and required)
        #[arg(long)]
        password: Option<String>,
    },
}

/// Presents the session on the terminal.
struct TerminalPresenter;

impl Presenter for TerminalPresenter {
    fn busy(&self, visible: bool) {
        if visible {
            eprintln!("⏳ Working...");
        }
    }

    fn warn(&self, warning: &Warning) {
        eprintln!("⚠️  {}", warning);
    }

    async fn prompt_password(&self, purpose: PasswordPurpose) -> Option<String> {
        eprint!("🔑 {}: ", purpose);
        let _ = std::io::stderr().flush();

        let mut line = String::new();
        match BufReader::new(tokio::io::stdin()).read_line(&mut line).await {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(line.trim_end_matches(['\r', '\n']).to_string()),
        }
    }
}

fn category_icon(category: FileCategory) -> &'static str {
    match category {
        FileCategory::Image => "🖼️ ",
        FileCategory::Video => "🎞️ ",
        FileCategory::Text => "📄",
        FileCategory::Audio => "🎵",
        FileCategory::Pdf => "📕",
        FileCategory::Archive => "📦",
        FileCategory::Generic => "📁",
    }
}

type Middleware = SessionMiddleware<HttpStegoClient, TerminalPresenter>;

/// Selects and uploads the carrier, printing its analysis.
async fn open_carrier(middleware: &Middleware, image: &Path) -> anyhow::Result<()> {
    let image = CarrierImage::from_path(image)
        .await
        .with_context(|| format!("cannot open {}", image.display()))?;
    middleware.select_image(image)?;

    if let Completion::Applied(_) = middleware.upload().await? {
        let session = middleware.session();
        let session = session.borrow();
        if let Some(carrier) = session.carrier() {
            println!("{}", carrier);
            println!("{}", carrier.ledger().summary());
        }
    }
    Ok(())
}

async fn run(middleware: &Middleware, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Inspect { image } => open_carrier(middleware, &image).await,

        Command::Embed { image, files, password } => {
            open_carrier(middleware, &image).await?;

            let mut batch = Vec::with_capacity(files.len());
            for path in &files {
                let file = CandidateFile::from_path(path)
                    .await
                    .with_context(|| format!("cannot read {}", path.display()))?;
                batch.push(file);
            }

            let report = middleware.queue_files(batch)?;
            println!("{} [{}]", report.summary, report.summary.urgency);

            let completion = match password {
                Some(password) => middleware.embed_with_password(Some(password)).await?,
                None => middleware.embed().await?,
            };
            match completion {
                Completion::Applied(response) => {
                    println!("✅ Embedded {} file(s)", response.embedded_count);
                    if let Some(elapsed) = response.elapsed {
                        println!("   took {:.3} sec", elapsed.as_secs_f64());
                    }
                    if let Some(artifact) = response.artifact {
                        println!("   new carrier: {}", artifact);
                    }
                }
                _ => println!("Embedding cancelled"),
            }
            Ok(())
        }

        Command::Extract { image, password } => {
            open_carrier(middleware, &image).await?;

            match middleware.extract_with_password(password).await? {
                Completion::Applied(ExtractOutcome::Extracted(response)) => {
                    println!("✅ Extracted {} file(s) ({:?})", response.files.len(), response.status);
                    for file in &response.files {
                        let coded = if file.is_coded_carrier() { " [coded]" } else { "" };
                        println!(
                            "   {} {} -> {}{}",
                            category_icon(file.category()),
                            file.name,
                            file.path,
                            coded
                        );
                    }
                }
                Completion::Applied(ExtractOutcome::WrongPassword(_)) => {
                    anyhow::bail!("extraction gave up after repeated wrong passwords")
                }
                _ => println!("Extraction cancelled"),
            }
            Ok(())
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Parse command-line arguments
    let args = Args::parse();

    init_logger(if args.verbose { LevelFilter::Debug } else { LevelFilter::Info });

    // Load client configuration from TOML file
    let config = ClientConfig::from_file(&args.config)?;

    let service = HttpStegoClient::new(&config.service)?;
    let mut middleware = SessionMiddleware::new(config.session, service, TerminalPresenter);

    if args.metrics_output.is_some() {
        middleware = middleware.with_metrics(SessionMetrics::new(format!(
            "client-{}",
            std::process::id()
        )));
    }

    let result = run(&middleware, args.command).await;

    // Export metrics if enabled
    if let (Some(metrics), Some(output_path)) = (middleware.into_metrics(), args.metrics_output) {
        metrics.export_to_json(&output_path)?;
        println!("Metrics exported to: {}", output_path);
    }

    result
}
