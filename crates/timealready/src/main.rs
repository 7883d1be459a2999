use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use coordination::escalation::HealingOrchestrator;
use coordination::memory::{FixMemory, InMemoryFixMemory, JsonFileFixMemory};
use timealready::config::HealerConfig;
use timealready::generator::RigFixGenerator;
use timealready::report::{render_json, render_text};
use timealready::sandbox::HttpSandboxValidator;
use timealready::telemetry::{append_session, SessionRecord};
use tracing::info;

/// Fix the code behind a stack trace: cheap model first, fix memory next,
/// smart model last.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Error text, or a path to a file containing it
    input: String,

    /// Project root the trace's file paths are relative to
    #[arg(default_value = ".")]
    codebase_root: PathBuf,

    /// TOML config file (default: ~/.timealready/config.toml when present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Fix memory JSON file (overrides the configured memory path)
    #[arg(long)]
    memory: Option<PathBuf>,

    /// Keep fix memory in-process only; nothing is persisted
    #[arg(long, default_value_t = false)]
    ephemeral: bool,

    /// Append a JSON line describing the session to this file
    #[arg(long)]
    telemetry: Option<PathBuf>,

    /// Print the outcome as JSON
    #[arg(long, default_value_t = false)]
    json: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let code = if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
            let _ = e.print();
            return code;
        }
    };

    HealerConfig::load_dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(args).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<ExitCode> {
    let raw = read_input(&args.input)?;

    let config = HealerConfig::load(args.config.as_deref())?;
    config.validate()?;
    info!(
        cheap = %config.cheap.model,
        smart = %config.smart.model,
        sandbox = %config.sandbox.url,
        "timealready starting"
    );

    let memory: Arc<dyn FixMemory> = if args.ephemeral {
        Arc::new(InMemoryFixMemory::new())
    } else {
        let path = args.memory.clone().unwrap_or_else(|| config.memory_path.clone());
        Arc::new(
            JsonFileFixMemory::open(&path)
                .with_context(|| format!("Failed to open fix memory at {}", path.display()))?,
        )
    };
    let generator = Arc::new(RigFixGenerator::from_config(&config)?);
    let validator = Arc::new(
        HttpSandboxValidator::new(
            &config.sandbox,
            Duration::from_secs(config.validation_timeout_secs),
        )
        .context("Failed to build sandbox client")?,
    );

    let orchestrator = Arc::new(
        HealingOrchestrator::new(&args.codebase_root, memory, generator, validator)
            .with_config(config.escalation()),
    );
    let outcome = orchestrator.heal_detached(raw).await;

    if let Some(path) = &args.telemetry {
        append_session(&SessionRecord::from_outcome(&outcome), path);
    }

    if args.json {
        println!("{}", render_json(&outcome)?);
    } else {
        print!("{}", render_text(&outcome));
    }

    Ok(if outcome.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// An existing path is read; anything else is the error text itself.
fn read_input(input: &str) -> Result<String> {
    let path = PathBuf::from(input);
    if path.is_file() {
        std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read error file {}", path.display()))
    } else {
        Ok(input.to_string())
    }
}
