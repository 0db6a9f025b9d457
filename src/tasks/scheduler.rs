use std::sync::Mutex;

use anyhow::Result;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::tasks::grading::{self, GradingPipeline};

/// Periodic driver of the grading pipeline. Ticks run inline in one loop, so a slow tick
/// delays the next one instead of overlapping it.
pub(crate) struct GradingPoller {
    pipeline: GradingPipeline,
    period: Duration,
    running: Mutex<Option<RunningPoller>>,
}

struct RunningPoller {
    shutdown: watch::Sender<bool>,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl GradingPoller {
    pub(crate) fn new(pipeline: GradingPipeline, period: Duration) -> Self {
        Self { pipeline, period, running: Mutex::new(None) }
    }

    /// Spawns the poll loop unless one is already running. Returns whether it started one.
    pub(crate) fn start(&self) -> bool {
        let Ok(mut running) = self.running.lock() else {
            tracing::error!("Grading poller state is poisoned; not starting");
            return false;
        };
        if running.as_ref().is_some_and(|poller| !poller.handle.is_finished()) {
            tracing::info!("Grading poller already running");
            return false;
        }

        let (shutdown, shutdown_rx) = watch::channel(false);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(poll_loop(
            self.pipeline.clone(),
            self.period,
            shutdown_rx,
            cancel.clone(),
        ));
        *running = Some(RunningPoller { shutdown, cancel, handle });

        tracing::info!(period_seconds = self.period.as_secs(), "Grading poller started");
        true
    }

    #[cfg(test)]
    pub(crate) fn is_running(&self) -> bool {
        self.running
            .lock()
            .map(|running| running.as_ref().is_some_and(|poller| !poller.handle.is_finished()))
            .unwrap_or(false)
    }

    /// Signals the loop, aborts in-flight grading and waits for the loop to exit.
    pub(crate) async fn stop(&self) {
        let poller = match self.running.lock() {
            Ok(mut running) => running.take(),
            Err(_) => None,
        };
        let Some(poller) = poller else {
            return;
        };

        if poller.shutdown.send(true).is_err() {
            tracing::warn!("Grading poller exited before shutdown was signalled");
        }
        poller.cancel.cancel();
        if let Err(err) = poller.handle.await {
            tracing::error!(error = %err, "Grading poller join failed");
        }
        tracing::info!("Grading poller stopped");
    }
}

async fn poll_loop(
    pipeline: GradingPipeline,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
    cancel: CancellationToken,
) {
    let mut tick = interval(period);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tick.tick() => run_tick(&pipeline, &cancel).await,
        }
    }
}

async fn run_tick(pipeline: &GradingPipeline, cancel: &CancellationToken) {
    match grading::process_pending_submissions(pipeline, cancel).await {
        Ok(completed) if completed > 0 => {
            tracing::info!(completed, "Processed initialized submissions");
        }
        Ok(_) => {}
        Err(err) => tracing::error!(error = %err, "process_pending_submissions failed"),
    }

    if cancel.is_cancelled() {
        return;
    }
    if let Err(err) = grading::process_timeout_submissions(pipeline).await {
        tracing::error!(error = %err, "process_timeout_submissions failed");
    }
}

/// Runs the poller until a shutdown signal arrives.
pub(crate) async fn run(pipeline: GradingPipeline, period: Duration) -> Result<()> {
    let poller = GradingPoller::new(pipeline, period);
    poller.start();

    crate::core::shutdown::shutdown_signal().await;
    poller.stop().await;

    Ok(())
}
