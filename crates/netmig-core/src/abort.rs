//! Operator interrupt shared between the runner, the batch loops and the
//! task waiter.

use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

/// Exit status used when the operator insists with a second Ctrl-C.
pub const FORCED_EXIT_CODE: i32 = 130;

/// Cheaply clonable abort flag. Batch loops check it before each entity and
/// the task waiter stops waiting as soon as it is raised.
#[derive(Debug, Clone, Default)]
pub struct AbortSignal(CancellationToken);

impl AbortSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abort(&self) {
        self.0.cancel();
    }

    pub fn is_aborted(&self) -> bool {
        self.0.is_cancelled()
    }

    /// Resolves once the flag is raised.
    pub async fn aborted(&self) {
        self.0.cancelled().await
    }

    /// Raise the flag on the first Ctrl-C and exit the process on the
    /// second. Abort the returned handle to stop listening.
    pub fn abort_on_ctrl_c(&self) -> tokio::task::JoinHandle<()> {
        let signal = self.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_err() {
                return;
            }
            warn!("Interrupt received, stopping after the current item (Ctrl-C again to exit now)");
            signal.abort();
            if tokio::signal::ctrl_c().await.is_ok() {
                error!("Second interrupt, exiting without a report");
                std::process::exit(FORCED_EXIT_CODE);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn clones_share_the_flag() {
        let signal = AbortSignal::new();
        let other = signal.clone();
        assert!(!other.is_aborted());
        signal.abort();
        assert!(other.is_aborted());
    }

    #[tokio::test]
    async fn aborted_wakes_waiters() {
        let signal = AbortSignal::new();
        let waiter = {
            let signal = signal.clone();
            tokio::spawn(async move { signal.aborted().await })
        };
        signal.abort();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }
}
