//! `glint`: a thin command-line front end over `glint-engine`.
//!
//! This binary owns no engine logic of its own — it parses arguments,
//! reads source text, and hands it to an [`Engine`], mapping whatever
//! comes back to a process exit code.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use glint_engine::{Engine, EngineError, EngineFlags};
use tracing_subscriber::filter::EnvFilter;

#[derive(Parser)]
#[command(name = "glint", version, about = "An embeddable ES5.1 execution engine")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a source file as a top-level program.
    Run {
        /// Path to the script to execute.
        entry: PathBuf,
        /// Treat the program as strict mode regardless of its own directive.
        #[arg(long)]
        strict: bool,
    },
    /// Evaluate a single expression or statement list given on the command line.
    Eval {
        /// Source text to compile and run.
        source: String,
        #[arg(long)]
        strict: bool,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(CliError::Engine(err)) => {
            eprintln!("glint: {err}");
            ExitCode::from(err.exit_code() as u8)
        }
        Err(CliError::Other(err)) => {
            eprintln!("glint: {err:#}");
            ExitCode::from(1)
        }
    }
}

enum CliError {
    Engine(EngineError),
    Other(anyhow::Error),
}

impl From<anyhow::Error> for CliError {
    fn from(err: anyhow::Error) -> Self {
        CliError::Other(err)
    }
}

impl From<EngineError> for CliError {
    fn from(err: EngineError) -> Self {
        CliError::Engine(err)
    }
}

fn run() -> Result<(), CliError> {
    let cli = Cli::parse();
    let mut engine = Engine::init(EngineFlags::default());

    let (source, strict) = match cli.command {
        Commands::Run { entry, strict } => {
            let source: Result<String> = std::fs::read_to_string(&entry)
                .with_context(|| format!("reading {}", entry.display()));
            (source?, strict)
        }
        Commands::Eval { source, strict } => (source, strict),
    };

    let result = engine.parse_and_run(&source, strict)?;

    if result.is_abrupt() {
        let message = engine.context_mut().to_string(result.into_completion_value());
        return Err(anyhow::anyhow!("uncaught exception: {message}").into());
    }

    Ok(())
}
