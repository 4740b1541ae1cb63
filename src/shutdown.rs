//! The shutdown state machine: a warning phase, a short final-warning fuse,
//! then process exit. Driven by `!down`, by SIGQUIT/SIGTERM, and by the
//! in-band hand-off request from a newly started server.

use crate::state::registry::Registry;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

/// Seconds between the final warning and the actual exit.
const FINAL_FUSE_SECS: u64 = 5;

/// Default warning period for signal- and hand-off-driven shutdowns.
pub const DEFAULT_GRACE_SECS: u64 = 30;

#[derive(Debug, Clone, Copy)]
struct Pending {
    deadline: Instant,
    /// True once the final warning is out; the next tick exits.
    final_stage: bool,
}

#[derive(Debug, Default)]
pub struct ShutdownCtl {
    pending: Mutex<Option<Pending>>,
    notify: Notify,
}

impl ShutdownCtl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.pending.lock().is_some()
    }

    /// Arm the warning phase; the final warning fires after `seconds`.
    pub fn schedule(&self, seconds: u64) {
        *self.pending.lock() = Some(Pending {
            deadline: Instant::now() + Duration::from_secs(seconds),
            final_stage: false,
        });
        self.notify.notify_one();
    }

    /// Skip straight to the final stage; the server exits after the fuse.
    pub fn immediate(&self) {
        *self.pending.lock() = Some(Pending {
            deadline: Instant::now() + Duration::from_secs(FINAL_FUSE_SECS),
            final_stage: true,
        });
        self.notify.notify_one();
    }

    /// Disarm; returns whether a shutdown was actually pending.
    pub fn cancel(&self) -> bool {
        let was = self.pending.lock().take().is_some();
        self.notify.notify_one();
        was
    }
}

/// Drive the shutdown timers. Runs for the life of the process.
pub async fn run(registry: Arc<Registry>) {
    let ctl = &registry.shutdown;
    loop {
        let deadline = ctl.pending.lock().as_ref().map(|p| p.deadline);
        match deadline {
            None => ctl.notify.notified().await,
            Some(deadline) => {
                tokio::select! {
                    _ = tokio::time::sleep_until(deadline) => tick(&registry),
                    _ = ctl.notify.notified() => {}
                }
            }
        }
    }
}

fn tick(registry: &Arc<Registry>) {
    let mut pending = registry.shutdown.pending.lock();
    let Some(p) = pending.as_mut() else {
        return;
    };
    if Instant::now() < p.deadline {
        return;
    }
    if !p.final_stage {
        tracing::info!("Final shutdown warning.");
        p.deadline = Instant::now() + Duration::from_secs(FINAL_FUSE_SECS);
        p.final_stage = true;
        drop(pending);
        registry.announce("\u{7}\u{7}>>> Server shutting down NOW!  Goodbye. <<<\n\u{7}\u{7}");
    } else {
        tracing::info!("Server down.");
        std::process::exit(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schedule_cancel_cycle() {
        let ctl = ShutdownCtl::new();
        assert!(!ctl.is_active());
        assert!(!ctl.cancel());
        ctl.schedule(30);
        assert!(ctl.is_active());
        assert!(ctl.cancel());
        assert!(!ctl.is_active());
    }

    #[test]
    fn immediate_goes_final() {
        let ctl = ShutdownCtl::new();
        ctl.immediate();
        assert!(ctl.pending.lock().as_ref().unwrap().final_stage);
    }
}
