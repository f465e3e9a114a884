//! Recovery manager: a per-error-code registered strategy with a bounded
//! retry budget (§4.10).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::config::defaults::RECOVERY_MAX_ATTEMPTS;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryOutcome {
    Recovered,
    Failed,
    BudgetExhausted,
}

/// A recovery action for one error code. Implementors may reconnect,
/// reset a cooldown map, or no-op.
#[async_trait]
pub trait RecoveryStrategy: Send + Sync {
    async fn attempt(&self) -> bool;
}

#[async_trait]
impl<F> RecoveryStrategy for F
where
    F: Fn() -> bool + Send + Sync,
{
    async fn attempt(&self) -> bool {
        self()
    }
}

struct Registered {
    strategy: Arc<dyn RecoveryStrategy>,
    attempts: u32,
}

/// Tracks recovery strategies and attempt counters per error code.
pub struct RecoveryManager {
    max_attempts: u32,
    strategies: Mutex<HashMap<u32, Registered>>,
}

impl Default for RecoveryManager {
    fn default() -> Self {
        Self::new(RECOVERY_MAX_ATTEMPTS)
    }
}

impl RecoveryManager {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            strategies: Mutex::new(HashMap::new()),
        }
    }

    pub async fn register(&self, code: u32, strategy: Arc<dyn RecoveryStrategy>) {
        self.strategies.lock().await.insert(
            code,
            Registered {
                strategy,
                attempts: 0,
            },
        );
    }

    /// Run the registered strategy for `code`, if any. Resets the attempt
    /// counter on success; exhausts the budget after `max_attempts` failures.
    pub async fn recover(&self, code: u32) -> RecoveryOutcome {
        let mut guard = self.strategies.lock().await;
        let Some(entry) = guard.get_mut(&code) else {
            return RecoveryOutcome::Failed;
        };

        if entry.attempts >= self.max_attempts {
            warn!(code, attempts = entry.attempts, "recovery budget exhausted");
            return RecoveryOutcome::BudgetExhausted;
        }

        let strategy = entry.strategy.clone();
        entry.attempts += 1;
        let attempt_no = entry.attempts;
        drop(guard);

        let ok = strategy.attempt().await;

        let mut guard = self.strategies.lock().await;
        if let Some(entry) = guard.get_mut(&code) {
            if ok {
                info!(code, attempt_no, "recovery succeeded, resetting attempt counter");
                entry.attempts = 0;
                RecoveryOutcome::Recovered
            } else {
                warn!(code, attempt_no, "recovery attempt failed");
                RecoveryOutcome::Failed
            }
        } else {
            RecoveryOutcome::Failed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn exhausts_budget_after_max_attempts() {
        let manager = RecoveryManager::new(2);
        let calls = Arc::new(AtomicUsize::new(0));
        let calls2 = calls.clone();
        manager
            .register(
                1002,
                Arc::new(move || {
                    calls2.fetch_add(1, Ordering::SeqCst);
                    false
                }),
            )
            .await;

        assert_eq!(manager.recover(1002).await, RecoveryOutcome::Failed);
        assert_eq!(manager.recover(1002).await, RecoveryOutcome::Failed);
        assert_eq!(manager.recover(1002).await, RecoveryOutcome::BudgetExhausted);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn success_resets_counter() {
        let manager = RecoveryManager::new(3);
        manager.register(9999, Arc::new(|| true)).await;
        assert_eq!(manager.recover(9999).await, RecoveryOutcome::Recovered);
        assert_eq!(manager.recover(9999).await, RecoveryOutcome::Recovered);
    }
}
