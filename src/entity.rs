//! Trait for values that carry their own key.

use std::hash::Hash;

/// Trait for values whose identity can be read off the value itself.
///
/// Implementing it lets [`ChangeSetBuilder::keyed`](crate::engine::ChangeSetBuilder::keyed)
/// supply the key selector, instead of passing a closure.
///
/// # Example
///
/// ```
/// use change_kit::Keyed;
///
/// #[derive(Clone)]
/// pub struct Person {
///     pub name: String,
///     pub age: u32,
/// }
///
/// impl Keyed for Person {
///     type Key = String;
///
///     fn key(&self) -> Self::Key {
///         self.name.clone()
///     }
/// }
/// ```
pub trait Keyed {
    /// Type of the value's identity (typically String or an id).
    type Key: Clone + Eq + Hash + Send + Sync + 'static;

    /// Return the value's key.
    ///
    /// Must be stable: equal logical identities return equal keys across calls.
    fn key(&self) -> Self::Key;
}
