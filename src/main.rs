use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::runtime::Runtime;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use novelweave::ai::QualityMode;
use novelweave::cli::commands::{estimate, generate, init, resume, status};
use novelweave::config::{Config, ConfigLoader};

/// Parse quality mode from string
fn parse_quality_mode(s: &str) -> Result<QualityMode, String> {
    QualityMode::parse(&s.to_lowercase()).ok_or_else(|| {
        format!("Invalid mode '{s}'. Valid values: fast, standard, premium")
    })
}

#[derive(Parser)]
#[command(name = "novelweave")]
#[command(version, about = "AI-assisted chapter generation for long-form fiction")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, short, help = "Path to a config file, bypassing the usual lookup")]
    config: Option<PathBuf>,

    #[arg(long)]
    verbose: bool,

    #[arg(long, short)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a NovelWeave project in the current directory
    Init,

    /// Generate a book from a blueprint
    Generate {
        #[arg(help = "Path to the blueprint YAML")]
        blueprint: PathBuf,
        #[arg(long, value_parser = parse_quality_mode, help = "Quality mode: fast, standard, premium")]
        mode: Option<QualityMode>,
        #[arg(long, help = "LLM provider (openai, anthropic)")]
        provider: Option<String>,
        #[arg(long, help = "Model to use, bypassing the quality-mode catalog")]
        model: Option<String>,
    },

    /// Resume a paused or interrupted session from its checkpoint
    Resume {
        #[arg(help = "Path to the blueprint YAML")]
        blueprint: PathBuf,
        #[arg(long, short, help = "Session id (defaults to the latest session)")]
        session: Option<String>,
    },

    /// Show the state of a session
    Status {
        #[arg(long, short, help = "Session id (defaults to the latest session)")]
        session: Option<String>,
    },

    /// Project token usage and cost for a blueprint
    Estimate {
        #[arg(help = "Path to the blueprint YAML")]
        blueprint: PathBuf,
        #[arg(long, value_parser = parse_quality_mode, help = "Quality mode: fast, standard, premium")]
        mode: Option<QualityMode>,
    },
}

/// Set up panic handler for graceful error reporting
fn setup_panic_handler() {
    let default_hook = std::panic::take_hook();

    std::panic::set_hook(Box::new(move |panic_info| {
        let message = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };

        eprintln!("\n\x1b[1;31m━━━ PANIC ━━━\x1b[0m");
        eprintln!("\x1b[31mNovelWeave encountered an unexpected error:\x1b[0m");
        eprintln!("  {}", message);

        if let Some(location) = panic_info.location() {
            eprintln!(
                "\x1b[90mLocation: {}:{}:{}\x1b[0m",
                location.file(),
                location.line(),
                location.column()
            );
        }
        eprintln!();

        // Call default hook for backtrace (if RUST_BACKTRACE=1)
        default_hook(panic_info);
    }));
}

fn main() -> ExitCode {
    setup_panic_handler();

    match run_cli() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("\x1b[31mError:\x1b[0m {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run_cli() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = load_config(&cli)?;

    match cli.command {
        Commands::Init => {
            init::run()?;
        }
        Commands::Generate {
            blueprint,
            mode,
            provider,
            model,
        } => {
            let runtime = Runtime::new()?;
            runtime.block_on(generate::run(
                config,
                generate::GenerateOptions {
                    blueprint,
                    mode,
                    provider,
                    model,
                },
            ))?;
        }
        Commands::Resume { blueprint, session } => {
            let runtime = Runtime::new()?;
            runtime.block_on(resume::run(
                config,
                resume::ResumeOptions { blueprint, session },
            ))?;
        }
        Commands::Status { session } => {
            let runtime = Runtime::new()?;
            runtime.block_on(status::run(config, status::StatusOptions { session }))?;
        }
        Commands::Estimate { blueprint, mode } => {
            estimate::run(config, estimate::EstimateOptions { blueprint, mode })?;
        }
    }

    Ok(())
}

fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let config = match &cli.config {
        Some(path) => ConfigLoader::load_from_file(path)?,
        None => ConfigLoader::load()?,
    };
    Ok(config)
}
