//! Background refresh loop.
//!
//! Every tick refreshes all subscriptions and then runs a GC pass. The loop
//! ends when [`Worker::stop`] is called on the same instance.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::{interval, MissedTickBehavior};

use crate::app::AppContext;

pub struct Worker {
    ctx: Arc<AppContext>,
    interval: Duration,
    shutdown: Notify,
}

impl Worker {
    pub fn new(ctx: Arc<AppContext>) -> Self {
        let interval = ctx.config.refresh_interval();
        Self::with_interval(ctx, interval)
    }

    pub fn with_interval(ctx: Arc<AppContext>, interval: Duration) -> Self {
        Self {
            ctx,
            interval,
            shutdown: Notify::new(),
        }
    }

    /// Runs until stopped. The first pass starts immediately.
    pub async fn run(&self) {
        tracing::info!("Worker started (interval {:?})", self.interval);

        let mut timer = interval(self.interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = timer.tick() => self.run_once().await,
                _ = self.shutdown.notified() => break,
            }
        }

        tracing::info!("Worker stopped");
    }

    /// One refresh pass followed by one GC pass.
    pub async fn run_once(&self) {
        match self
            .ctx
            .parallel_fetcher
            .refresh(self.ctx.store_handle())
            .await
        {
            Ok(report) => tracing::debug!("Refresh finished: {:?}", report),
            Err(e) => tracing::error!("Refresh failed: {}", e),
        }

        match self.ctx.store.gc() {
            Ok(report) => tracing::debug!("GC finished: {:?}", report),
            Err(e) => tracing::error!("GC failed: {}", e),
        }
    }

    /// Makes a running (or the next) [`Worker::run`] return.
    pub fn stop(&self) {
        self.shutdown.notify_one();
    }
}
