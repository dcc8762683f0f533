#![cfg_attr(docsrs, feature(doc_cfg))]
//! # mesh-linsys
//!
//! mesh-linsys assembles distributed sparse linear systems for PDE codes on
//! partitioned unstructured meshes. It derives the matrix graph from mesh
//! connectivity, numbers rows and columns locally, accumulates element and
//! face contributions concurrently, exports contributions on shared rows to
//! their owning process, applies Dirichlet conditions, and hands the owned
//! system to an external solver.
//!
//! ## Features
//! - Graph construction in two neighbor rounds (row lengths, then column ids)
//! - Lock-free concurrent `sum_into` through atomic adds on a frozen structure
//! - Pluggable communication backends (serial, threads, MPI)
//! - Explicit assembly-cycle state with typed errors naming stage, entity and rank
//!
//! ## Usage
//!
//! ```toml
//! [dependencies]
//! mesh-linsys = "0.1"
//! # Optional features:
//! # features = ["mpi-support", "rayon"]
//! ```
//!
//! ## Determinism
//!
//! For a fixed partition the graph, numbering and message contents are
//! identical across runs. Summed values are reproducible only when writes
//! reach each entry in the same order, e.g. with a single assembling thread.

pub mod algs;
pub mod data;
pub mod debug_invariants;
pub mod linsys;
pub mod linsys_error;
pub mod topology;

pub use debug_invariants::DebugInvariants;
pub use linsys_error::{LinSysError, Stage};

/// A convenient prelude to import the most-used traits & types:
pub mod prelude {
    #[cfg(feature = "mpi-support")]
    pub use crate::algs::communicator::MpiComm;
    pub use crate::algs::communicator::{CommTag, Communicator, NoComm, RayonComm};
    pub use crate::data::field::Field;
    pub use crate::data::matrix::{DistributedMatrix, DistributedVector};
    pub use crate::debug_invariants::DebugInvariants;
    pub use crate::linsys::{
        AssemblyState, CoeffApplier, ConnectedNodes, EntityList, LinearSolver, LinearSystem,
        LinearSystemConfig, RowClass, SolveOutcome, SolveProblem,
    };
    pub use crate::linsys_error::{LinSysError, Stage};
    pub use crate::topology::{
        CellTopology, DofStatus, EntityId, EntityRank, InMemoryMesh, MeshEntity, MeshTopology,
    };
}
