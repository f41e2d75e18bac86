//! Command handlers: each function is a thin caller over `AppContext`,
//! `Gateway`, and `Supervisor` — no business logic lives here.

use std::sync::Arc;

use serde_json::json;
use uuid::Uuid;

use crate::context::AppContext;
use crate::domain::models::Lane;
use crate::services::phase_executor::Phase;
use crate::services::supervisor::{PhasePlanner, Supervisor};

/// A single "respond" phase that feeds the task description straight to
/// the resolved backend and records the raw text as the task's output.
pub fn default_phase_planner() -> PhasePlanner {
    Arc::new(|task| {
        let description = task.description.clone();
        vec![Phase {
            name: "respond".to_string(),
            prompt_builder: Arc::new(move |_task, _state| description.clone()),
            extractor: Arc::new(|text, state| {
                state.insert("response".to_string(), json!(text));
                Ok(())
            }),
        }]
    })
}

fn duty_phase_planner() -> PhasePlanner {
    Arc::new(|_task| {
        vec![Phase {
            name: "duties".to_string(),
            prompt_builder: Arc::new(|task, _state| task.description.clone()),
            extractor: Arc::new(|text, state| {
                state.insert("response".to_string(), json!(text));
                Ok(())
            }),
        }]
    })
}

pub fn build_supervisor(ctx: &AppContext) -> Arc<Supervisor> {
    ctx.build_supervisor(default_phase_planner(), duty_phase_planner())
}

fn parse_lane(input: &str) -> anyhow::Result<Lane> {
    match input {
        "main" => Ok(Lane::Main),
        "autonomous" => Ok(Lane::Autonomous),
        "maintenance" => Ok(Lane::Maintenance),
        other => anyhow::bail!("unknown lane '{other}' (expected main, autonomous, or maintenance)"),
    }
}

pub async fn run_foreground(ctx: Arc<AppContext>) -> anyhow::Result<()> {
    let supervisor = build_supervisor(&ctx);
    supervisor.startup().await?;

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let supervisor_task = tokio::spawn(supervisor.clone().run(shutdown_rx.clone()));
    let scheduler_task = tokio::spawn(ctx.scheduler.clone().run(shutdown_rx.clone()));

    tokio::signal::ctrl_c().await?;
    tracing::info!("received shutdown signal, stopping supervisor and scheduler loops");
    let _ = shutdown_tx.send(true);

    let _ = tokio::join!(supervisor_task, scheduler_task);
    Ok(())
}

pub async fn submit(ctx: &AppContext, description: String, lane: &str, max_retries: Option<u32>) -> anyhow::Result<()> {
    let supervisor = build_supervisor(ctx);
    let lane = parse_lane(lane)?;
    let task = supervisor.assign_task(description, max_retries, lane).await?;
    println!("{}", serde_json::to_string_pretty(&task)?);
    Ok(())
}

pub async fn list_tasks(ctx: &AppContext) -> anyhow::Result<()> {
    let tasks = ctx.gateway.list_tasks().await?;
    println!("{}", serde_json::to_string_pretty(&tasks)?);
    Ok(())
}

pub async fn show_task(ctx: &AppContext, task_id: Uuid) -> anyhow::Result<()> {
    match ctx.gateway.get_task(task_id).await? {
        Some(task) => println!("{}", serde_json::to_string_pretty(&task)?),
        None => println!("no such task: {task_id}"),
    }
    Ok(())
}

pub async fn list_jobs(ctx: &AppContext) -> anyhow::Result<()> {
    let doc = ctx.gateway.list_jobs().await?;
    println!("{}", serde_json::to_string_pretty(&doc)?);
    Ok(())
}

pub async fn status(ctx: &AppContext) -> anyhow::Result<()> {
    let snapshot = ctx.gateway.query_status().await?;
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}

pub async fn restart(ctx: &AppContext, reason: String) -> anyhow::Result<()> {
    ctx.restart_coordinator
        .request_restart(crate::services::restart_coordinator::RestartRequest {
            reason,
            message: None,
            metadata: None,
        })
        .await?;
    Ok(())
}
