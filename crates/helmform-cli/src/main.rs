//! helmform CLI - the value merging, chart resolution and manifest
//! normalization of the helmform provider, from the command line

use clap::{ArgAction, Parser, Subcommand};
use miette::{IntoDiagnostic, Result};
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, fmt as tracing_fmt, prelude::*};

mod commands;
mod error;
mod exit_codes;

use commands::resolve::{ChartArgs, RepositoryArgs};
use commands::template::TemplateArgs;
use commands::values::ValueArgs;

#[derive(Parser)]
#[command(name = "helmform")]
#[command(version)]
#[command(about = "Helm releases as declarative resources", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Merge values files and overrides, printing the cloaked tree
    Values {
        #[command(flatten)]
        values: ValueArgs,

        /// Print sensitive values instead of redacting them
        #[arg(long)]
        reveal: bool,

        /// Output JSON instead of YAML
        #[arg(long)]
        json: bool,
    },

    /// Resolve a chart reference to a local path
    Resolve {
        #[command(flatten)]
        chart: ChartArgs,

        #[command(flatten)]
        repository: RepositoryArgs,

        /// Output JSON with the chart metadata
        #[arg(long)]
        json: bool,
    },

    /// Normalize a multi-document manifest to JSON
    Manifest {
        /// Rendered manifest file
        file: PathBuf,

        /// Compare with another rendered manifest
        #[arg(long)]
        diff: Option<PathBuf>,

        /// Literal value to redact (repeatable)
        #[arg(long = "sensitive")]
        sensitive: Vec<String>,
    },

    /// Render a chart with the helm binary and print the manifests
    Template(TemplateArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    miette::set_panic_hook();
    let cli = Cli::parse();
    init_tracing(cli.verbose)?;

    let result = match cli.command {
        Commands::Values { values, reveal, json } => commands::values::run(&values, reveal, json),
        Commands::Resolve { chart, repository, json } => commands::resolve::run(&chart, &repository, json).await,
        Commands::Manifest { file, diff, sensitive } => commands::manifest::run(&file, diff.as_deref(), &sensitive),
        Commands::Template(args) => commands::template::run(&args).await,
    };

    if let Err(err) = result {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
    Ok(())
}

fn init_tracing(verbose: u8) -> Result<()> {
    let filter = if std::env::var_os("RUST_LOG").is_some() {
        EnvFilter::try_from_default_env().into_diagnostic()?
    } else {
        let level = match verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        };
        EnvFilter::new(format!("error,helmform={level},helmform_core={level},helmform_repo={level},helmform_release={level},helmform_provider={level}"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_fmt::layer().with_writer(std::io::stderr))
        .init();

    Ok(())
}
