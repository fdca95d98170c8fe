use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use formpilot_actors::queue::QueueMsg;
use formpilot_common::observability::{init_logging, LogConfig};
use formpilot_common::DocumentKind;
use formpilot_config::{FormpilotConfig, FormpilotConfigLoader};
use formpilot_pipeline::ApplicationRequest;
use formpilot_runtime::PilotRuntime;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

mod worker;

#[derive(Parser)]
#[command(name = "formpilot", about = "Automated job-application form pipeline")]
struct Cli {
    /// Path to the configuration file.
    #[arg(long, default_value = "formpilot.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Apply to one job posting and wait for the outcome event.
    Apply {
        /// Target application form URL.
        #[arg(long)]
        url: String,
        /// Candidate profile YAML.
        #[arg(long)]
        profile: PathBuf,
        /// Override the profile's resume document.
        #[arg(long)]
        resume: Option<PathBuf>,
        /// Override the profile's cover letter document.
        #[arg(long)]
        cover_letter: Option<PathBuf>,
    },
    /// Run the worker pool, draining the queue until interrupted.
    Serve,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let runtime = PilotRuntime::build("formpilot-worker", None)?;
    let cancel = runtime.handle().cancellation();
    let result = runtime.block_on(run(cli, cancel));
    runtime.shutdown(Duration::from_secs(5));
    result
}

async fn run(cli: Cli, cancel: Arc<CancellationToken>) -> Result<()> {
    // env wins over file values
    let cfg: FormpilotConfig = FormpilotConfigLoader::new()
        .with_optional_file(&cli.config)
        .load()?;

    let log_path = init_logging(LogConfig::default())?;
    tracing::info!(log_path = %log_path.display(), "formpilot starting");

    match cli.command {
        Command::Apply {
            url,
            profile,
            resume,
            cover_letter,
        } => {
            let system = worker::build_system(&cfg, cancel).await?;
            let mut outcomes = system.outcomes.subscribe();

            let mut request = ApplicationRequest::new(url, profile);
            if let Some(path) = resume {
                request.document_refs.insert(DocumentKind::Resume, path);
            }
            if let Some(path) = cover_letter {
                request.document_refs.insert(DocumentKind::CoverLetter, path);
            }
            let run_id = request.run_id;

            system
                .queue
                .send(QueueMsg::Enqueue(request))
                .await
                .map_err(|_| anyhow!("job queue unavailable"))?;

            let event = loop {
                match outcomes.recv().await {
                    Ok(event) if event.run_id == run_id => break event,
                    Ok(_) => continue,
                    Err(e) => return Err(anyhow!("outcome channel closed: {e}")),
                }
            };

            println!("{}", serde_json::to_string_pretty(&event)?);
            system.builder.graceful_shutdown().await
        }
        Command::Serve => {
            let system = worker::build_system(&cfg, cancel).await?;
            tracing::info!(pool_size = cfg.browser.pool_size, "worker pool running");
            system.builder.run_until_ctrl_c().await
        }
    }
}
