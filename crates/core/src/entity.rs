//! Entity trait: identity + continuity across state changes.

/// Entity marker + minimal interface.
///
/// Records are immutable values; an update yields a new record carrying the
/// same identity.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Copy + Eq + Ord + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> Self::Id;
}
