use clap::{Parser, Subcommand};
use resume_match::Result;
use resume_match::commands::{convert_records, match_documents, score_documents, show_status};
use resume_match::config::{Config, resolve_config_dir, run_interactive_config, show_config};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "resume-match")]
#[command(about = "Embedding-based resume and job description matching")]
#[command(version)]
struct Cli {
    /// Configuration directory (defaults to ~/.resume-match)
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure Ollama connection and scoring settings
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Convert structured records into vector documents
    Convert {
        /// Structured record JSON files
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Score a stored resume vector document against a stored JD vector document
    Score {
        /// JD vector document
        jd: PathBuf,
        /// Resume vector document
        resume: PathBuf,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Convert and score every JD against every resume
    Match {
        /// JD structured record files
        #[arg(long, required = true, num_args = 1..)]
        jd: Vec<PathBuf>,
        /// Resume structured record files
        #[arg(long, required = true, num_args = 1..)]
        resume: Vec<PathBuf>,
        /// Directory for per-pair reports and summary.json
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Show Ollama health and vector store contents
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config_dir = resolve_config_dir(cli.config_dir)
        .map_err(|e| resume_match::MatchError::Config(e.to_string()))?;

    match cli.command {
        Commands::Config { show } => {
            if show {
                show_config(&config_dir)?;
            } else {
                run_interactive_config(&config_dir)?;
            }
        }
        Commands::Convert { files } => {
            let config = Config::load(&config_dir)?;
            convert_records(&config, files).await?;
        }
        Commands::Score { jd, resume, json } => {
            let config = Config::load(&config_dir)?;
            score_documents(&config, &jd, &resume, json)?;
        }
        Commands::Match { jd, resume, output } => {
            let config = Config::load(&config_dir)?;
            match_documents(&config, jd, resume, output).await?;
        }
        Commands::Status => {
            let config = Config::load(&config_dir)?;
            show_status(&config)?;
        }
    }

    Ok(())
}
