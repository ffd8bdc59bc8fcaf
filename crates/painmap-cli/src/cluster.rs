//! Clustering and severity command handlers.

use painmap_clustering::{ClusteringError, ClusteringRun, ClusteringService};
use painmap_core::{RunStatus, RunType};

/// Starts a run and executes it in this process.
///
/// # Errors
///
/// Returns an error if another run is active, or if the run ends `failed`.
pub(crate) async fn run_clustering(
    service: &ClusteringService,
    run_type: RunType,
) -> anyhow::Result<()> {
    let run = match service.start_run(run_type).await {
        Ok(run) => run,
        Err(ClusteringError::Conflict) => {
            anyhow::bail!("a clustering run is already in progress; try again later")
        }
        Err(e) => return Err(e.into()),
    };
    println!("started {run_type} run {} ({})", run.id, run.public_id);
    tracing::info!(run_id = run.id, %run_type, "running clustering in the foreground");

    service.run(run.id).await;

    let run = service.get_run(run.id).await?;
    print_run(&run);
    if run.status == RunStatus::Failed {
        anyhow::bail!(
            "clustering run {} failed: {}",
            run.id,
            run.error_message.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}

/// # Errors
///
/// Returns an error if the database query fails.
pub(crate) async fn show_status(service: &ClusteringService) -> anyhow::Result<()> {
    match service.latest_run().await? {
        Some(run) => print_run(&run),
        None => println!("no clustering runs yet; run `cluster run --type full` first"),
    }
    Ok(())
}

/// # Errors
///
/// Returns an error if the database update fails.
pub(crate) async fn cancel_runs(service: &ClusteringService) -> anyhow::Result<()> {
    let cancelled = service.cancel_stuck_runs().await?;
    println!("cancelled {cancelled} run(s)");
    Ok(())
}

/// # Errors
///
/// Returns an error if the theme does not exist or a query fails.
pub(crate) async fn recalculate_severity(
    service: &ClusteringService,
    theme_id: Option<i64>,
) -> anyhow::Result<()> {
    if let Some(theme_id) = theme_id {
        let severity = service.recalculate_severity(theme_id).await?;
        println!("theme {theme_id}: severity {severity}");
    } else {
        let changed = service.recalculate_all_severities().await?;
        println!("severity changed for {changed} theme(s)");
    }
    Ok(())
}

fn print_run(run: &ClusteringRun) {
    println!("{:<12}{}", "RUN", run.id);
    println!("{:<12}{}", "TYPE", run.run_type);
    println!("{:<12}{}", "STATUS", run.status);
    println!(
        "{:<12}{}",
        "STARTED",
        run.started_at.format("%Y-%m-%d %H:%M:%S")
    );
    if let Some(completed) = run.completed_at {
        println!("{:<12}{}", "COMPLETED", completed.format("%Y-%m-%d %H:%M:%S"));
    }
    println!("{:<12}{}", "POSTS", run.posts_processed);
    println!("{:<12}{}", "CREATED", run.themes_created);
    println!("{:<12}{}", "UPDATED", run.themes_updated);
    if let Some(message) = &run.error_message {
        println!("{:<12}{message}", "ERROR");
    }
}
