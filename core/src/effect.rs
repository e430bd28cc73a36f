//! Side effect descriptions.
//!
//! Workflows never perform I/O for notifications themselves. They return
//! [`Effect`] values that the runtime executes once the transactional outcome
//! is final. An effect can therefore fail without ever undoing the write that
//! produced it.

use crate::BoxFuture;
use std::future::Future;

/// Effect type - describes a side effect to be executed
///
/// Effects are NOT executed immediately. They are descriptions of what should
/// happen, returned from workflows and executed by the runtime.
#[derive(Default)]
pub enum Effect {
    /// No-op effect
    #[default]
    None,

    /// Run effects in parallel
    Parallel(Vec<Effect>),

    /// Run effects sequentially
    Sequential(Vec<Effect>),

    /// Arbitrary async computation
    ///
    /// The future is responsible for logging its own failure; nothing is fed
    /// back into the workflow that produced it.
    Future(BoxFuture<'static, ()>),
}

// Manual Debug implementation since Future doesn't implement Debug
impl std::fmt::Debug for Effect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "Effect::None"),
            Self::Parallel(effects) => f.debug_tuple("Effect::Parallel").field(effects).finish(),
            Self::Sequential(effects) => {
                f.debug_tuple("Effect::Sequential").field(effects).finish()
            },
            Self::Future(_) => write!(f, "Effect::Future(<future>)"),
        }
    }
}

impl Effect {
    /// Wrap a future as an effect
    #[must_use]
    pub fn future<F>(future: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        Self::Future(Box::pin(future))
    }

    /// Combine effects to run in parallel
    #[must_use]
    pub const fn merge(effects: Vec<Self>) -> Self {
        Self::Parallel(effects)
    }

    /// Chain effects to run sequentially
    #[must_use]
    pub const fn chain(effects: Vec<Self>) -> Self {
        Self::Sequential(effects)
    }

    /// Whether this effect does nothing at all
    #[must_use]
    pub fn is_none(&self) -> bool {
        match self {
            Self::None => true,
            Self::Parallel(effects) | Self::Sequential(effects) => {
                effects.iter().all(Self::is_none)
            },
            Self::Future(_) => false,
        }
    }

    /// Number of leaf futures this effect will run
    #[must_use]
    pub fn leaf_count(&self) -> usize {
        match self {
            Self::None => 0,
            Self::Parallel(effects) | Self::Sequential(effects) => {
                effects.iter().map(Self::leaf_count).sum()
            },
            Self::Future(_) => 1,
        }
    }
}
