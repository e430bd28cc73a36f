//! # Campus Fest Core
//!
//! Core traits and types shared by every crate of the Campus Fest registration
//! engine.
//!
//! This crate provides the pieces that sit on the boundary between the
//! transactional core and the outside world:
//!
//! - **Effect**: a description of a side effect (email, announcement) that the
//!   runtime executes *after* a write has been committed
//! - **Environment**: injected dependencies such as the [`environment::Clock`]
//! - **Collaborators**: narrow contracts for ticket issuance, mail delivery and
//!   event announcements
//!
//! ## Architecture Principles
//!
//! - Functional Core, Imperative Shell
//! - Explicit Effects (no hidden I/O inside workflows)
//! - Dependency Injection via Environment
//!
//! ## Example
//!
//! ```
//! use campus_fest_core::effect::Effect;
//!
//! let effect = Effect::future(async {
//!     // deliver an email, post an announcement, ...
//! });
//! assert!(!effect.is_none());
//! ```

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use serde::{Deserialize, Serialize};
pub use smallvec::{SmallVec, smallvec};

pub mod collaborators;
pub mod effect;
pub mod environment;

/// Boxed, sendable future used by every dyn-compatible trait in the workspace.
///
/// Traits return `Pin<Box<dyn Future>>` instead of using `async fn` so that they
/// can be stored as `Arc<dyn Trait>` inside environments.
pub type BoxFuture<'a, T> =
    std::pin::Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;
