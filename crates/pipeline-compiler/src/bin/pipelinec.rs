//! Pipeline compiler CLI

use std::path::PathBuf;
use std::process;

use anyhow::Context;
use clap::{Parser, Subcommand};
use pipeline_compiler::{CompileOptions, Compiler, ExecutionMode, builtin_registry};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "pipelinec")]
#[command(about = "Pipeline compiler - turns pipeline configuration into workflow manifests")]
#[command(version)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compile a pipeline configuration into a manifest
    Compile {
        /// Pipeline configuration file
        #[arg(long = "pipeline_config", value_name = "FILE")]
        pipeline_config: PathBuf,

        /// Provider configuration file
        #[arg(long = "provider_config", value_name = "FILE")]
        provider_config: Option<PathBuf>,

        /// Execution mode, overrides the provider configuration (v1 or v2)
        #[arg(long = "execution_mode", value_name = "MODE", value_parser = parse_mode)]
        execution_mode: Option<ExecutionMode>,

        /// Manifest destination (.json, .yaml or .yml)
        #[arg(long = "output_file", value_name = "FILE")]
        output_file: PathBuf,
    },
}

fn parse_mode(s: &str) -> Result<ExecutionMode, String> {
    s.parse::<ExecutionMode>().map_err(|e| e.to_string())
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Compile {
            pipeline_config,
            provider_config,
            execution_mode,
            output_file,
        } => {
            let mut options = CompileOptions::new(&pipeline_config, output_file);
            if let Some(provider) = provider_config {
                options = options.provider_config(provider);
            }
            if let Some(mode) = execution_mode {
                options = options.execution_mode(mode);
            }

            let output = Compiler::new(options, builtin_registry())
                .compile()
                .with_context(|| format!("compiling {}", pipeline_config.display()))?;

            tracing::debug!(
                nodes = output.node_count,
                expansion = ?output.expansion,
                "Compiled {}",
                output.pipeline_name
            );
            Ok(())
        }
    }
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("Compilation failed: {:#}", e);
        process::exit(1);
    }
}
