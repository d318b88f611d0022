use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use hhv_sync::{render_summary, run_menu, Stage, SyncConfig, SyncPipeline};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "hhv-cli")]
#[command(about = "Harvest hh.ru employers and vacancies into Postgres, then browse reports")]
struct Cli {
    /// YAML file with database connection sections.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Section of the config file to read.
    #[arg(long)]
    section: Option<String>,
    /// Target database; dropped and recreated on every run.
    #[arg(long)]
    db_name: Option<String>,
    /// Employer to harvest; repeat to replace the default list.
    #[arg(long = "employer-id")]
    employer_ids: Vec<String>,
}

impl Cli {
    fn apply(self, mut config: SyncConfig) -> SyncConfig {
        if let Some(path) = self.config {
            config.config_path = path;
        }
        if let Some(section) = self.section {
            config.config_section = section;
        }
        if let Some(db_name) = self.db_name {
            config.database_name = db_name;
        }
        if !self.employer_ids.is_empty() {
            config.employer_ids = self.employer_ids;
        }
        config
    }
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(config: SyncConfig) -> Result<()> {
    let mut stdout = std::io::stdout();
    let pipeline = SyncPipeline::new(config)?;
    let summary = pipeline.ingest(&mut stdout).await?;
    writeln!(stdout, "{}", render_summary(&summary))?;

    let mut stdin = tokio::io::BufReader::new(tokio::io::stdin());
    run_menu(pipeline.repository(), &mut stdin, &mut stdout).await
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let config = Cli::parse().apply(SyncConfig::from_env());

    tokio::select! {
        result = run(config) => {
            info!(stage = ?Stage::Terminated, "pipeline stage");
            match result {
                Ok(()) => ExitCode::SUCCESS,
                Err(err) => {
                    eprintln!("An error occurred: {err:#}");
                    ExitCode::FAILURE
                }
            }
        }
        _ = tokio::signal::ctrl_c() => {
            eprintln!("\nStopped by user");
            // The blocking stdin reader would keep the runtime alive on shutdown.
            std::process::exit(0);
        }
    }
}
