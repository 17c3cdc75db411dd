mod chart;
mod completion;
mod config;
mod error;
mod history;
mod ingest;
mod models;
mod pipeline;
mod prompt;
mod response;
mod web;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::completion::GroqClient;
use crate::models::{DocumentKind, UploadedDocument};
use crate::pipeline::{AskOutcome, Session};

#[derive(Parser)]
#[command(name = "fin-insights")]
#[command(about = "Financial Insights Chatbot - ask questions about PDF and CSV files", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the web interface
    Serve {
        /// Address to listen on
        #[arg(short, long)]
        bind: Option<String>,
        /// Directory scanned for PDF/CSV files when a session starts
        #[arg(short, long)]
        uploads_dir: Option<PathBuf>,
    },
    /// Ask a single question from the command line
    Ask {
        /// The question to ask
        question: String,
        /// Directory to read PDF/CSV files from
        #[arg(short, long)]
        uploads_dir: Option<PathBuf>,
        /// Extra PDF/CSV files to include
        files: Vec<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let mut config = config::Config::from_env().context("Failed to load configuration")?;

    match cli.command {
        Commands::Serve { bind, uploads_dir } => {
            if let Some(bind) = bind {
                config.bind_addr = bind;
            }
            if let Some(dir) = uploads_dir {
                config.uploads_dir = dir;
            }
            web::serve(config).await?;
        }
        Commands::Ask {
            question,
            uploads_dir,
            files,
        } => {
            if let Some(dir) = uploads_dir {
                config.uploads_dir = dir;
            }
            run_ask(&config, &question, &files).await?;
        }
    }

    Ok(())
}

async fn run_ask(config: &config::Config, question: &str, files: &[PathBuf]) -> Result<()> {
    let mut documents = match ingest::scan_dir(&config.uploads_dir) {
        Ok(docs) => docs,
        Err(e) => {
            tracing::warn!("{}", e);
            vec![]
        }
    };

    for path in files {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .with_context(|| format!("Invalid file name: {}", path.display()))?;
        let Some(kind) = DocumentKind::from_name(&name) else {
            tracing::warn!("Ignoring unsupported file {}", path.display());
            continue;
        };
        let bytes =
            std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
        documents.push(UploadedDocument::new(name, kind, bytes));
    }

    let corpus = ingest::ingest(documents);
    for (name, reason) in &corpus.failures {
        eprintln!("Skipped {}: {}", name, reason);
    }

    let client = GroqClient::new(config)?;
    let mut session = Session::new(corpus);
    let outcome =
        pipeline::ask(&mut session, &client, config.response_format, question).await?;

    let AskOutcome::Answered { turn, chart } = outcome else {
        return Ok(());
    };

    println!("\n{}", "=".repeat(80));
    println!("Question: {}", turn.question);
    println!("{}", "=".repeat(80));
    println!("\n{}\n", turn.answer);

    if let Some(chart) = chart {
        for warning in &chart.warnings {
            eprintln!("Warning: {}", warning);
        }
        if let Some(spec) = chart.spec {
            println!("{}", "-".repeat(80));
            println!("{} ({:?})", spec.title, chart.source);
            println!("{}", serde_json::to_string_pretty(&spec.to_plotly())?);
        }
    }

    Ok(())
}
