//! # change-kit
//!
//! A keyed, change-aware in-memory cache that turns a stream of object batches
//! into a stream of minimal, ordered change sets.
//!
//! ## Features
//!
//! - **Change Sets:** Every mutation is reported as Add / Update / Remove /
//!   Refresh, in application order, exactly once
//! - **Size Limits:** Oldest-inserted entries are evicted beyond a maximum size
//! - **Expiry:** Per-value time-to-live, one timer per distinct deadline
//! - **Pause/Resume:** Downstream can hold change sets and receive them as
//!   one combined set, with a bounded pause
//! - **Deterministic Time:** All timing goes through an injected
//!   [`TimeSource`], so tests run on tokio's paused clock
//!
//! ## Quick Start
//!
//! ```ignore
//! use change_kit::{source, ChangeSetBuilder};
//! use futures::StreamExt;
//! use std::time::Duration;
//!
//! // 1. Create a push source (or use source::from_future / any Stream)
//! let (sender, batches) = source::channel::<User>();
//!
//! // 2. Build the engine
//! let changes = ChangeSetBuilder::new()
//!     .key_selector(|u: &User| u.id.clone())
//!     .limit_size_to(10_000)
//!     .expire_after(|_| Some(Duration::from_secs(300)))
//!     .observe(batches)?;
//!
//! // 3. Optionally gate delivery on a pause signal
//! let (pause, paused) = tokio::sync::watch::channel(false);
//! let mut changes = changes.buffer_if(paused, Some(Duration::from_secs(60)))?;
//!
//! // 4. Consume
//! sender.send(vec![alice, bob])?;
//! while let Some(set) = changes.next().await {
//!     let set = set?;
//!     println!("+{} ~{} -{}", set.adds(), set.updates(), set.removes());
//! }
//! ```
//!
//! ## Lower-level building blocks
//!
//! The engine is assembled from pieces usable on their own:
//! [`ChangeAwareCache`] (diffing), [`ExpiryCache`] (eviction and expiry
//! bookkeeping) and [`PauseGate`] (buffering state machine).

#[macro_use]
extern crate log;

pub mod aggregator;
pub mod cache;
pub mod change;
pub mod config;
pub mod engine;
pub mod entity;
pub mod error;
pub mod expiry;
pub mod gate;
pub mod observability;
pub mod source;
pub mod strategy;
pub mod time;

// Re-exports for convenience
pub use aggregator::ChangeSetAggregator;
pub use cache::ChangeAwareCache;
pub use change::{Change, ChangeReason, ChangeSet, ChangeSummary};
pub use config::{ChangeSetConfig, ExpiryPolicy};
pub use engine::{ChangeSetBuilder, ChangeSetStream};
pub use entity::Keyed;
pub use error::{Error, Result};
pub use expiry::ExpiryCache;
pub use gate::{buffer_if, PauseGate};
pub use strategy::SourceStrategy;
pub use time::{TimeSource, TokioTimeSource};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
