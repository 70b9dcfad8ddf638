//! readcheck CLI: the user-facing command-line interface.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "readcheck",
    version,
    about = "Reading comprehension checks with AI-generated questions and feedback"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Take a reading comprehension check
    Take {
        /// Start with the passage that has this ID
        #[arg(long, conflicts_with = "passage_file")]
        passage_id: Option<String>,

        /// Use the text in this file as the passage
        #[arg(long)]
        passage_file: Option<PathBuf>,

        /// Passage library file or directory (default: configured or bundled library)
        #[arg(long, conflicts_with = "passage_file")]
        library: Option<PathBuf>,

        /// Provider to use (default: from config)
        #[arg(long)]
        provider: Option<String>,

        /// Model to use (default: from config)
        #[arg(long)]
        model: Option<String>,

        /// Save results to this directory
        #[arg(long)]
        output: Option<PathBuf>,

        /// Save results to the configured output directory
        #[arg(long)]
        save: bool,

        /// Output format: json, html, all
        #[arg(long, default_value = "json")]
        format: String,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// List the passages in a library
    Passages {
        /// Passage library file or directory (default: configured or bundled library)
        #[arg(long)]
        library: Option<PathBuf>,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Validate a passage library
    Validate {
        /// Path to passage file or directory
        #[arg(long)]
        passages: PathBuf,
    },

    /// List available models
    ListModels {
        /// Filter to specific provider
        #[arg(long)]
        provider: Option<String>,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Create starter config and example passage library
    Init,
}

#[tokio::main]
async fn main() {
    let filter = tracing_subscriber::EnvFilter::from_default_env();
    let filter = match "readcheck=info".parse() {
        Ok(directive) => filter.add_directive(directive),
        Err(_) => filter,
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Take {
            passage_id,
            passage_file,
            library,
            provider,
            model,
            output,
            save,
            format,
            config,
        } => {
            commands::take::execute(
                passage_id,
                passage_file,
                library,
                provider,
                model,
                output,
                save,
                format,
                config,
            )
            .await
        }
        Commands::Passages { library, config } => commands::passages::execute(library, config),
        Commands::Validate { passages } => commands::validate::execute(passages),
        Commands::ListModels { provider, config } => {
            commands::list_models::execute(provider, config).await
        }
        Commands::Init => commands::init::execute(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
