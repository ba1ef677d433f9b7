use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Period between ticks while the timer keeps running
    pub interval: Duration,
    /// Delay before the first tick after the timer is (re)armed
    pub initial_delay: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(500),
            initial_delay: Duration::from_millis(100),
        }
    }
}

#[derive(Debug)]
enum TimerCommand {
    Rearm,
    Stop,
}

/// Cheap handle for restarting the flush countdown from any thread
#[derive(Debug, Clone)]
pub struct TimerHandle {
    tx: mpsc::UnboundedSender<TimerCommand>,
}

impl TimerHandle {
    /// Handle not attached to any timer, for hosts that drive ticks themselves.
    pub fn manual() -> Self {
        let (tx, _rx) = mpsc::unbounded_channel();
        Self { tx }
    }

    /// Restart the countdown at the initial delay. Ignored once the scheduler stopped.
    pub fn rearm(&self) {
        let _ = self.tx.send(TimerCommand::Rearm);
    }
}

/// Periodic flush timer running as a single tokio task.
///
/// Ticks never overlap: each tick runs to completion inside the task before the next
/// deadline is computed, and rearm requests that arrive meanwhile are applied afterwards.
pub struct FlushScheduler {
    handle: TimerHandle,
    task: Option<JoinHandle<()>>,
}

impl FlushScheduler {
    /// Start the timer armed with the initial delay. Must be called inside a tokio runtime.
    pub fn spawn<F>(config: SchedulerConfig, on_tick: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_timer(config, rx, on_tick));

        Self {
            handle: TimerHandle { tx },
            task: Some(task),
        }
    }

    pub fn handle(&self) -> TimerHandle {
        self.handle.clone()
    }

    /// Stop the timer and wait for the task; no tick fires after this returns.
    pub async fn stop(mut self) {
        let _ = self.handle.tx.send(TimerCommand::Stop);
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                log::warn!("Flush timer task ended abnormally: {}", e);
            }
        }
    }
}

impl Drop for FlushScheduler {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn run_timer<F>(config: SchedulerConfig, mut rx: mpsc::UnboundedReceiver<TimerCommand>, mut on_tick: F)
where
    F: FnMut() + Send + 'static,
{
    let mut deadline = Instant::now() + config.initial_delay;

    loop {
        tokio::select! {
            cmd = rx.recv() => match cmd {
                Some(TimerCommand::Rearm) => deadline = Instant::now() + config.initial_delay,
                Some(TimerCommand::Stop) | None => break,
            },
            _ = sleep_until(deadline) => {
                on_tick();
                deadline = Instant::now() + config.interval;
            }
        }
    }

    log::debug!("Flush timer stopped");
}
