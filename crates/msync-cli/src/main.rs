mod logging;
mod tui;

use anyhow::Context;
use clap::{Parser, Subcommand};
use msync_api::ApiClient;
use msync_core::bootstrap::{self, AuthState};
use msync_core::session::{TokenStore, default_token_path};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

const LOG_BUFFER_CAPACITY: usize = 200;

#[derive(Parser)]
#[command(name = "msync", about = "Terminal client for the media sync service")]
struct Cli {
    /// Base URL of the sync service API.
    #[arg(long, default_value = "http://127.0.0.1:8000/api/")]
    base_url: String,

    #[command(subcommand)]
    command: Option<CliCommand>,
}

#[derive(Subcommand)]
enum CliCommand {
    /// Interactive terminal UI (the default).
    Tui,
    /// Print a one-shot session and task summary.
    Status,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.command.unwrap_or(CliCommand::Tui) {
        CliCommand::Tui => {
            // Raw-mode terminal: logs go to the in-TUI panel, never stderr.
            let log_buffer = logging::LogBuffer::new(LOG_BUFFER_CAPACITY);
            tracing_subscriber::registry()
                .with(EnvFilter::from_default_env())
                .with(logging::LogLayer::new(log_buffer.clone()))
                .init();
            tui::run(&cli.base_url, log_buffer)
        }
        CliCommand::Status => {
            tracing_subscriber::fmt()
                .with_env_filter(EnvFilter::from_default_env())
                .init();
            print_status(&cli.base_url)
        }
    }
}

fn print_status(base_url: &str) -> anyhow::Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("build runtime")?;
    runtime.block_on(async {
        let client = ApiClient::new(base_url)?;
        let session = TokenStore::load(&default_token_path()?)?;
        match bootstrap::resolve_session(&client, &session).await {
            AuthState::Authenticated => {
                let accounts = client.list_accounts().await?;
                let tasks = client.active_tasks().await?;
                let scheduler = client.scheduler_status().await?;
                println!("session: active");
                println!("accounts tracked: {}", accounts.len());
                println!("active tasks: {}", tasks.len());
                for task in &tasks {
                    let label = if task.is_global_scan() {
                        "global scan"
                    } else {
                        task.target_id.as_str()
                    };
                    println!("  {} | {} | {}%", task.id, label, task.progress);
                }
                println!("scheduler running: {}", scheduler.is_running);
                if let Some(next_run) = scheduler.next_run {
                    println!("next scheduled run: {}", tui::format_unix_timestamp(next_run));
                }
            }
            _ => println!("session: logged out (run the TUI to sign in)"),
        }
        Ok(())
    })
}
