//! Fixed-interval polling loops with staggered startup and graceful shutdown.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tracing::{error, info, warn};

/// One polling worker: a single tick enumerates its tracked entities and
/// processes them sequentially. Tick errors are logged by the loop and the
/// next cycle retries; the loop never dies on a failed tick.
#[async_trait]
pub trait Worker: Send + Sync + 'static {
    fn name(&self) -> &'static str;
    async fn tick(&self) -> Result<()>;
}

/// Recurring scheduler for one worker with explicit start/stop lifecycle.
pub struct PollLoop {
    worker: Arc<dyn Worker>,
    interval: Duration,
    /// Startup stagger so the loops do not hit external services at once.
    initial_delay: Duration,
}

impl PollLoop {
    pub fn new(worker: Arc<dyn Worker>, interval: Duration, initial_delay: Duration) -> Self {
        Self {
            worker,
            interval,
            initial_delay,
        }
    }

    /// Spawns the loop. It runs until the shutdown channel fires.
    pub fn start(self, mut shutdown: broadcast::Receiver<()>) -> JoinHandle<Result<()>> {
        tokio::spawn(async move {
            let name = self.worker.name();
            info!(
                loop_name = name,
                interval_secs = self.interval.as_secs(),
                initial_delay_secs = self.initial_delay.as_secs(),
                "⏱️  Poll loop starting"
            );

            tokio::select! {
                _ = sleep(self.initial_delay) => {}
                _ = shutdown.recv() => {
                    info!(loop_name = name, "Poll loop stopped before first tick");
                    return Ok(());
                }
            }

            // A slow tick must not overlap the next scheduled one: ticks run
            // in their own task guarded by an in-flight flag, and a tick due
            // while the previous one is still running is skipped.
            let in_flight = Arc::new(AtomicBool::new(false));
            let mut current_tick: Option<JoinHandle<()>> = None;
            let mut ticker = interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if in_flight.swap(true, Ordering::SeqCst) {
                            warn!(loop_name = name, "Previous tick still running, skipping this cycle");
                            continue;
                        }
                        let worker = Arc::clone(&self.worker);
                        let flag = Arc::clone(&in_flight);
                        current_tick = Some(tokio::spawn(async move {
                            if let Err(e) = worker.tick().await {
                                error!(loop_name = worker.name(), error = %e, "Tick failed");
                            }
                            flag.store(false, Ordering::SeqCst);
                        }));
                    }
                    _ = shutdown.recv() => {
                        info!(loop_name = name, "🛑 Poll loop shutting down");
                        // A tick mid-delivery finishes before the loop
                        // reports done; the guard allows at most one.
                        if let Some(handle) = current_tick.take() {
                            let _ = handle.await;
                        }
                        return Ok(());
                    }
                }
            }
        })
    }
}

/// Owns the poll loops and coordinates their shutdown.
pub struct Orchestrator {
    shutdown_tx: broadcast::Sender<()>,
    tasks: Vec<JoinHandle<Result<()>>>,
}

impl Orchestrator {
    pub fn new() -> Self {
        let (shutdown_tx, _) = broadcast::channel(16);
        Self {
            shutdown_tx,
            tasks: Vec::new(),
        }
    }

    pub fn spawn(&mut self, poll_loop: PollLoop) {
        let handle = poll_loop.start(self.shutdown_tx.subscribe());
        self.tasks.push(handle);
    }

    pub async fn shutdown(&mut self) {
        info!("🛑 Shutting down all poll loops");
        let _ = self.shutdown_tx.send(());

        for (i, task) in self.tasks.drain(..).enumerate() {
            match task.await {
                Ok(Ok(())) => info!("✅ Loop {} shut down cleanly", i + 1),
                Ok(Err(e)) => warn!("⚠️  Loop {} error during shutdown: {}", i + 1, e),
                Err(e) => error!("❌ Loop {} task failed: {}", i + 1, e),
            }
        }
    }
}
