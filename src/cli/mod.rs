//! CLI entry point: argument parsing and command dispatch. Kept thin by
//! design — the command surface is an external collaborator's concern;
//! this module only wires parsed arguments through to the Gateway and the
//! Supervisor/Scheduler loops.

pub mod commands;
pub mod types;

use std::sync::Arc;

use clap::Parser;

use crate::context::AppContext;
use crate::infrastructure::config::Config;
use types::{Cli, Commands};

pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;
    let _logger_guard = crate::infrastructure::logging::init(&config.logging)?;

    let ctx = Arc::new(AppContext::build(config).await?);

    match cli.command {
        Commands::Run => commands::run_foreground(ctx).await,
        Commands::Submit { description, lane, max_retries } => {
            commands::submit(&ctx, description, &lane, max_retries).await
        }
        Commands::ListTasks => commands::list_tasks(&ctx).await,
        Commands::ShowTask { task_id } => commands::show_task(&ctx, task_id).await,
        Commands::ListJobs => commands::list_jobs(&ctx).await,
        Commands::Status => commands::status(&ctx).await,
        Commands::Restart { reason } => commands::restart(&ctx, reason).await,
    }
}
