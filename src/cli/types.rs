//! CLI type definitions: clap command structures for the binary entry
//! point. The command surface itself is a thin caller of the Gateway and
//! the Supervisor; business logic stays in `services`.

use clap::{Parser, Subcommand};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "coreloop")]
#[command(about = "Autonomous execution core", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to a coreloop.toml file (defaults to ./coreloop.toml if present)
    #[arg(short, long, global = true)]
    pub config: Option<std::path::PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the supervisor and scheduler loops in the foreground
    Run,

    /// Submit a task to a lane
    Submit {
        /// Task description
        description: String,

        /// Target lane
        #[arg(short, long, default_value = "main")]
        lane: String,

        /// Maximum attempts before the task is marked failed
        #[arg(short, long)]
        max_retries: Option<u32>,
    },

    /// List known tasks
    ListTasks,

    /// Show one task by id
    ShowTask { task_id: Uuid },

    /// List scheduled jobs
    ListJobs,

    /// Print an aggregate health/status snapshot
    Status,

    /// Request a graceful restart (exit code 42 contract)
    Restart {
        /// Why the restart is being requested
        #[arg(short, long, default_value = "manual")]
        reason: String,
    },
}
