//! # Campus Fest Runtime
//!
//! Runtime support for the Campus Fest registration engine.
//!
//! ## Core Components
//!
//! - **`EffectRunner`**: executes the [`Effect`] descriptions returned by
//!   workflows, either inline (awaited before the caller gets its result) or
//!   detached on the tokio runtime (fire-and-forget)
//! - **retry**: exponential backoff used by optimistic-concurrency loops
//!
//! ## Example
//!
//! ```
//! use campus_fest_core::effect::Effect;
//! use campus_fest_runtime::{DispatchMode, EffectRunner};
//!
//! # tokio_test::block_on(async {
//! let runner = EffectRunner::new(DispatchMode::Inline);
//! runner.dispatch(Effect::future(async {})).await;
//! assert_eq!(runner.pending(), 0);
//! # });
//! ```

use campus_fest_core::{BoxFuture, effect::Effect};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Retry logic with exponential backoff
pub mod retry;

/// How side effects are run relative to the request that produced them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchMode {
    /// Await every effect before returning to the caller.
    ///
    /// Failures are still swallowed; only the timing changes. Used by tests
    /// that assert on delivered notifications.
    Inline,
    /// Spawn effects on the tokio runtime and return immediately.
    #[default]
    Detached,
}

/// Executes effect descriptions.
///
/// Cloning is cheap; clones share the pending-effect counter so that a
/// shutdown path can wait for detached effects to drain.
#[derive(Debug, Clone)]
pub struct EffectRunner {
    mode: DispatchMode,
    pending: Arc<AtomicUsize>,
}

/// Decrements the shared pending counter when dropped
struct PendingGuard(Arc<AtomicUsize>);

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl EffectRunner {
    /// Create a runner with the given dispatch mode
    #[must_use]
    pub fn new(mode: DispatchMode) -> Self {
        Self {
            mode,
            pending: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// The configured dispatch mode
    #[must_use]
    pub const fn mode(&self) -> DispatchMode {
        self.mode
    }

    /// Number of detached effects still running
    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Run an effect according to the dispatch mode.
    ///
    /// Never fails: effect futures log their own errors.
    pub async fn dispatch(&self, effect: Effect) {
        if effect.is_none() {
            tracing::trace!("Skipping Effect::None");
            return;
        }

        match self.mode {
            DispatchMode::Inline => execute(effect).await,
            DispatchMode::Detached => {
                self.pending.fetch_add(1, Ordering::SeqCst);
                let guard = PendingGuard(Arc::clone(&self.pending));
                tokio::spawn(async move {
                    let _guard = guard;
                    execute(effect).await;
                });
            },
        }
    }

    /// Wait until all detached effects have finished, or the timeout elapses.
    ///
    /// Returns `true` if the runner drained in time.
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        while self.pending() > 0 {
            if tokio::time::Instant::now() >= deadline {
                tracing::warn!(pending = self.pending(), "Effects still running at shutdown");
                return false;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        true
    }
}

impl Default for EffectRunner {
    fn default() -> Self {
        Self::new(DispatchMode::default())
    }
}

/// Execute an effect tree to completion.
///
/// Parallel children are joined, sequential children are awaited in order.
pub fn execute(effect: Effect) -> BoxFuture<'static, ()> {
    Box::pin(async move {
        match effect {
            Effect::None => {},
            Effect::Future(fut) => {
                metrics::counter!("fest_effects_executed_total", "type" => "future").increment(1);
                fut.await;
            },
            Effect::Parallel(effects) => {
                tracing::trace!("Executing Effect::Parallel with {} effects", effects.len());
                futures::future::join_all(effects.into_iter().map(execute)).await;
            },
            Effect::Sequential(effects) => {
                tracing::trace!("Executing Effect::Sequential with {} effects", effects.len());
                for effect in effects {
                    execute(effect).await;
                }
            },
        }
    })
}
