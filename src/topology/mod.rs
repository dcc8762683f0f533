//! Mesh-side vocabulary: entity handles, cell topologies, the mesh
//! collaborator trait, and row ownership.

pub mod cell_type;
pub mod entity;
pub mod mesh;
pub mod ownership;

pub use cell_type::CellTopology;
pub use entity::{EntityId, EntityRank, MeshEntity};
pub use mesh::{InMemoryMesh, MeshTopology};
pub use ownership::{DofStatus, EntityOwnership, OwnershipClass, ProcessTopology};
