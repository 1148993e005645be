//! How a batch source's batches relate to the cache.
//!
//! The engine must be told up front what an upstream batch means:
//!
//! | Strategy | Batch meaning | Keys missing from a batch |
//! |----------|---------------|---------------------------|
//! | **Merge** | Independent values to add or update | Kept |
//! | **Replace** | The complete current set | Removed |
//!
//! ```
//! use change_kit::strategy::SourceStrategy;
//!
//! // A push source emitting one value at a time
//! let _s = SourceStrategy::Merge;
//!
//! // A poller returning the whole table every time
//! let _s = SourceStrategy::Replace;
//! ```

use serde::{Deserialize, Serialize};

/// Strategy enum describing batch semantics of an upstream source.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceStrategy {
    /// **Merge**: every batch is additive.
    ///
    /// Values are added or updated; nothing is removed implicitly.
    #[default]
    Merge,

    /// **Replace**: every batch is the full current state.
    ///
    /// Flow:
    /// 1. Remove cached keys absent from the batch
    /// 2. Add or update every value of the batch
    ///
    /// A key present in both the old and new batch is reported as an update,
    /// never as remove + add.
    Replace,
}

impl std::fmt::Display for SourceStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceStrategy::Merge => write!(f, "Merge"),
            SourceStrategy::Replace => write!(f, "Replace"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_display() {
        assert_eq!(SourceStrategy::Merge.to_string(), "Merge");
        assert_eq!(SourceStrategy::Replace.to_string(), "Replace");
    }

    #[test]
    fn test_strategy_default() {
        assert_eq!(SourceStrategy::default(), SourceStrategy::Merge);
    }

    #[test]
    fn test_strategy_serde_names() {
        let parsed: SourceStrategy = serde_json::from_str("\"replace\"").expect("Failed to parse");
        assert_eq!(parsed, SourceStrategy::Replace);
    }
}
