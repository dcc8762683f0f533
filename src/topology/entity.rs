//! `EntityId` and `MeshEntity`: handles for mesh objects that own rows.
//!
//! Every node, edge, face and element carries a process-independent global
//! id. `EntityId` wraps a non-zero `u64` so that 0 stays reserved as an
//! invalid sentinel, the same convention the wire formats rely on.
//!
//! `MeshEntity` pairs that global id with the entity's *local offset*: a
//! small dense integer chosen by the mesh, used as an arena index for O(1)
//! id lookup. Offsets are ephemeral. They are recomputed by the mesh on
//! topology change and never persisted.

use std::{fmt, num::NonZeroU64};

use crate::linsys_error::LinSysError;

/// Global, process-independent identifier of a mesh entity.
///
/// # Memory layout
/// This type is `repr(transparent)` over `NonZeroU64`, so `Option<EntityId>`
/// is the same size as a `u64`.
#[derive(
    Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
#[repr(transparent)]
pub struct EntityId(NonZeroU64);

impl EntityId {
    /// Creates a new `EntityId` from a raw `u64` value.
    ///
    /// # Errors
    /// Returns `Err(InvalidEntityId)` if `raw == 0`.
    #[inline]
    pub fn new(raw: u64) -> Result<Self, LinSysError> {
        NonZeroU64::new(raw)
            .map(EntityId)
            .ok_or(LinSysError::InvalidEntityId)
    }

    /// Returns the inner `u64` value.
    #[inline]
    pub const fn get(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("EntityId").field(&self.get()).finish()
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.get())
    }
}

/// Opaque handle to a local mesh entity: global id plus ephemeral local offset.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct MeshEntity {
    id: EntityId,
    offset: u32,
}

impl MeshEntity {
    /// Build a handle from a global id and the mesh-assigned local offset.
    #[inline]
    pub const fn new(id: EntityId, offset: u32) -> Self {
        Self { id, offset }
    }

    /// Global id.
    #[inline]
    pub const fn id(self) -> EntityId {
        self.id
    }

    /// Ephemeral local offset (arena index).
    #[inline]
    pub const fn offset(self) -> usize {
        self.offset as usize
    }
}

impl fmt::Display for MeshEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.id, self.offset)
    }
}

/// Rank of a mesh entity in the topological hierarchy.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum EntityRank {
    Node,
    Edge,
    Face,
    Element,
}

impl fmt::Display for EntityRank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EntityRank::Node => "node",
            EntityRank::Edge => "edge",
            EntityRank::Face => "face",
            EntityRank::Element => "element",
        };
        f.write_str(s)
    }
}

/// Solver-visible global ordinal of dof `dof` on the entity with id `id`.
///
/// Ordinals are contiguous per entity and ascending in `(id, dof)`.
#[inline]
pub fn global_dof_id(id: EntityId, num_dof: usize, dof: usize) -> u64 {
    (id.get() - 1) * num_dof as u64 + dof as u64
}

#[cfg(feature = "mpi-support")]
unsafe impl mpi::datatype::Equivalence for EntityId {
    type Out = <u64 as mpi::datatype::Equivalence>::Out;

    fn equivalent_datatype() -> Self::Out {
        u64::equivalent_datatype()
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_zero_errors() {
        assert!(matches!(EntityId::new(0), Err(LinSysError::InvalidEntityId)));
    }

    #[test]
    fn debug_and_display() {
        let id = EntityId::new(7).unwrap();
        assert_eq!(format!("{:?}", id), "EntityId(7)");
        assert_eq!(format!("{}", id), "7");
        let e = MeshEntity::new(id, 3);
        assert_eq!(format!("{}", e), "7@3");
    }

    #[test]
    fn global_dof_ids_are_block_contiguous() {
        let a = EntityId::new(1).unwrap();
        let b = EntityId::new(2).unwrap();
        assert_eq!(global_dof_id(a, 3, 0), 0);
        assert_eq!(global_dof_id(a, 3, 2), 2);
        assert_eq!(global_dof_id(b, 3, 0), 3);
    }

    #[test]
    fn json_roundtrip() {
        let id = EntityId::new(123).unwrap();
        let s = serde_json::to_string(&id).unwrap();
        let back: EntityId = serde_json::from_str(&s).unwrap();
        assert_eq!(back, id);
    }
}
