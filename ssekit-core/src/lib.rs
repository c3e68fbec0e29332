//! # ssekit-core
//!
//! Building blocks shared by the ssekit crates.
//!
//! The only component today is the [`LifecycleManager`], a reusable
//! start/stop state machine for long-running background work:
//!
//! ```text
//! Idle -> Starting -> Running -> Stopping -> Idle
//! ```
//!
//! Every transition is a compare-and-swap on a single atomic word, so when
//! several callers race for the same transition exactly one of them wins.
//!
//! ## Example
//!
//! ```rust
//! use ssekit_core::{LifecycleManager, Status};
//!
//! let lifecycle = LifecycleManager::new();
//! assert!(lifecycle.begin_initialization());
//! assert!(!lifecycle.begin_initialization());
//! assert!(lifecycle.initialization_complete());
//! assert!(lifecycle.is_running());
//!
//! assert!(lifecycle.begin_shutdown());
//! lifecycle.shutdown_complete();
//! assert_eq!(lifecycle.status(), Status::Idle);
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod lifecycle;

pub use lifecycle::{CompletionGuard, LifecycleManager, Status};

/// Prelude for common imports.
pub mod prelude {
    pub use crate::lifecycle::{CompletionGuard, LifecycleManager, Status};
}
