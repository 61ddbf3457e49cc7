//! Entity identity and lifecycle flags.
//!
//! An [`Identity`] is a lightweight handle into exactly one
//! [`StableContainer`](crate::container::StableContainer):
//! - A slot index into the container's slot table
//! - A generation counter for detecting stale handles after slot reuse
//!
//! Identities are container-scoped: a handle from one container never resolves
//! in another, even for the same entity type.

/// Opaque handle identifying one entity within one container.
///
/// Stays valid until the sweep that removes the entity it denotes. The slot
/// index may be reused afterwards; the generation counter is bumped on reuse
/// so stale handles fail to resolve instead of aliasing a new entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Identity {
    index: u32,
    generation: u32,
}

impl Identity {
    pub(crate) const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Slot index within the owning container.
    pub const fn index(self) -> u32 {
        self.index
    }

    /// Generation counter of the slot at the time this handle was issued.
    pub const fn generation(self) -> u32 {
        self.generation
    }
}

/// Something that can live in a [`StableContainer`](crate::container::StableContainer).
///
/// The only lifecycle requirement is the removal flag: update logic marks an
/// entity with [`request_removal`](Entity::request_removal) and the scheduler
/// physically destroys it during the sweep phase that follows the update
/// phase. Renderers read entities but never flag them.
pub trait Entity: 'static {
    /// Whether this entity asked to be removed at the next sweep.
    fn removal_requested(&self) -> bool;

    /// Flag this entity for removal at the next sweep.
    fn request_removal(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_accessors() {
        let id = Identity::new(42, 7);
        assert_eq!(id.index(), 42);
        assert_eq!(id.generation(), 7);
    }

    #[test]
    fn identity_equality_includes_generation() {
        assert_ne!(Identity::new(3, 0), Identity::new(3, 1));
        assert_eq!(Identity::new(3, 1), Identity::new(3, 1));
    }
}
