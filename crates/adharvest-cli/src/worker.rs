use std::sync::Arc;

use adharvest_collector::{sweep_expired_sessions, CollectorContext, QueueWorker, WorkerReport};

/// Sweeps abandoned OAuth sessions, then runs the queue worker once, or
/// repeatedly until a run claims nothing when `drain` is set. Prints the
/// combined report.
///
/// # Errors
///
/// Returns an error if the sweep or claiming chunks fails.
pub(crate) async fn run_worker(ctx: Arc<CollectorContext>, drain: bool) -> anyhow::Result<()> {
    let expired = sweep_expired_sessions(&ctx).await?;
    tracing::debug!(expired, "oauth session sweep complete");

    let worker = QueueWorker::new(ctx);
    let mut total = WorkerReport::default();
    let mut runs = 0_u32;

    loop {
        let report = worker.run_once().await?;
        runs += 1;
        accumulate(&mut total, report);
        tracing::info!(run = runs, claimed = report.claimed, "worker run complete");
        if !drain || report.claimed == 0 {
            break;
        }
    }

    println!("{}", serde_json::to_string_pretty(&total)?);
    Ok(())
}

fn accumulate(total: &mut WorkerReport, report: WorkerReport) {
    total.claimed += report.claimed;
    total.succeeded += report.succeeded;
    total.requeued += report.requeued;
    total.failed += report.failed;
    total.timed_out += report.timed_out;
}
