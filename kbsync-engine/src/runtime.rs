//! Cooperative cancellation for one sync invocation.
//!
//! [`Interrupt`] is a cloneable handle over a `CancellationToken`; every
//! long-running step holds one and calls [`Interrupt::check`] between units
//! of work. [`Runtime`] owns the handle, the optional kill timer and the
//! hooks fired after an interrupted run is detected.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::context::PipeContext;
use crate::error::SyncError;

/// Shared cancellation flag.
#[derive(Debug, Clone, Default)]
pub struct Interrupt {
    token: CancellationToken,
}

impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the flag. Idempotent.
    pub fn interrupt(&self) {
        self.token.cancel();
    }

    pub fn is_interrupted(&self) -> bool {
        self.token.is_cancelled()
    }

    /// `Err(SyncError::Interrupted)` once the flag is set.
    pub fn check(&self) -> Result<(), SyncError> {
        if self.is_interrupted() {
            Err(SyncError::Interrupted)
        } else {
            Ok(())
        }
    }

    /// Resolves once the flag is set.
    pub async fn interrupted(&self) {
        self.token.cancelled().await;
    }

    /// Sleep that ends early with `Interrupted`; for polling loops.
    pub async fn sleep(&self, duration: Duration) -> Result<(), SyncError> {
        tokio::select! {
            _ = self.token.cancelled() => Err(SyncError::Interrupted),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }
}

/// Scheduled task that sets the interrupt flag after a fixed duration.
#[derive(Debug)]
pub struct KillTimer {
    handle: JoinHandle<()>,
}

impl KillTimer {
    /// Must be called from within a tokio runtime.
    pub fn start(interrupt: Interrupt, after: Duration) -> Self {
        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = interrupt.interrupted() => {}
                _ = tokio::time::sleep(after) => {
                    tracing::warn!(
                        after_secs = after.as_secs(),
                        "kill timer elapsed, interrupting run",
                    );
                    interrupt.interrupt();
                }
            }
        });
        Self { handle }
    }

    pub fn stop(self) {
        self.handle.abort();
    }
}

impl Drop for KillTimer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Callback fired after an interrupted run is detected, before the
/// checkpoint is persisted.
#[async_trait]
pub trait TimeoutHook: Send + Sync {
    fn name(&self) -> &str;
    async fn on_timeout(&self, ctx: &PipeContext) -> Result<(), SyncError>;
}

/// Interrupt handle, kill timer and timeout hooks for one invocation.
#[derive(Default)]
pub struct Runtime {
    interrupt: Interrupt,
    kill_timer: Option<KillTimer>,
    hooks: Vec<Arc<dyn TimeoutHook>>,
}

impl Runtime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle to pass to anything that must observe cancellation.
    pub fn interrupt(&self) -> &Interrupt {
        &self.interrupt
    }

    pub fn add_timeout_hook(&mut self, hook: Arc<dyn TimeoutHook>) {
        self.hooks.push(hook);
    }

    /// Arm the kill timer. `None` leaves the run unbounded.
    pub fn start_kill_timer(&mut self, after: Option<Duration>) {
        self.stop_kill_timer();
        if let Some(after) = after {
            tracing::debug!(after_secs = after.as_secs(), "kill timer armed");
            self.kill_timer = Some(KillTimer::start(self.interrupt.clone(), after));
        }
    }

    pub fn stop_kill_timer(&mut self) {
        if let Some(timer) = self.kill_timer.take() {
            timer.stop();
        }
    }

    /// Clear the flag for a logically independent invocation. Handles
    /// obtained before the reset keep observing the old flag.
    pub fn reset(&mut self) {
        self.stop_kill_timer();
        self.interrupt = Interrupt::new();
    }

    /// Run every timeout hook; a failing hook is logged and does not stop
    /// the others. Returns the number of failures.
    pub async fn run_timeout_hooks(&self, ctx: &PipeContext) -> usize {
        let mut failures = 0;
        for hook in &self.hooks {
            if let Err(err) = hook.on_timeout(ctx).await {
                failures += 1;
                tracing::warn!(hook = hook.name(), error = %err, "timeout hook failed");
            }
        }
        failures
    }
}
