//! Tracking for webhook work that outlives its HTTP response.
//!
//! The webhook answers 200 before processing, so Telegram will not redeliver
//! an update whose task is dropped. Shutdown drains the set instead.

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

#[derive(Clone, Default)]
pub struct WebhookTasks {
    set: Arc<Mutex<JoinSet<()>>>,
}

impl WebhookTasks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `task` in the background and keep its handle until it finishes
    pub fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut set = self.set.lock().unwrap_or_else(PoisonError::into_inner);
        // Reap what already finished so the set stays small
        while let Some(result) = set.try_join_next() {
            log_join(result);
        }
        set.spawn(task);
    }

    /// Number of tasks not yet reaped
    pub fn len(&self) -> usize {
        self.set.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wait for every tracked task, up to `limit`. Returns false if some
    /// were still running when the limit passed.
    pub async fn drain(&self, limit: Duration) -> bool {
        let mut set = std::mem::take(&mut *self.set.lock().unwrap_or_else(PoisonError::into_inner));
        if set.is_empty() {
            return true;
        }
        info!("Waiting for {} webhook task(s)", set.len());

        let wait_all = async {
            while let Some(result) = set.join_next().await {
                log_join(result);
            }
        };
        let finished = tokio::time::timeout(limit, wait_all).await;
        match finished {
            Ok(()) => true,
            // Dropping the set aborts whatever is left
            Err(_) => {
                error!(
                    "{} webhook task(s) still running after {}s; their updates need reconciliation",
                    set.len(),
                    limit.as_secs()
                );
                false
            }
        }
    }
}

fn log_join(result: Result<(), tokio::task::JoinError>) {
    if let Err(e) = result {
        warn!("Webhook task ended abnormally: {}", e);
    }
}
