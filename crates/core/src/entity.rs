//! Entity trait: identity + continuity across state changes.

/// Entity marker + minimal interface.
///
/// Entities reference each other only by id; related collections are
/// computed by query in the store, never held as live back-references.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Copy + Eq + Ord + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> Self::Id;
}
