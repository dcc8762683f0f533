//! LinSysError: unified error type for mesh-linsys public APIs.
//!
//! Every fallible operation returns `Result<_, LinSysError>`. None of these
//! conditions is recovered locally: callers abort the current assembly or
//! solve cycle and report the message, which names the stage and, where
//! applicable, the offending entity or rank.

use std::fmt;

use thiserror::Error;

use crate::topology::entity::EntityId;

/// Pipeline stage in which an error was raised.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Stage {
    Connectivity,
    GraphBuild,
    Assembly,
    Dirichlet,
    Export,
    Solve,
    Transfer,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Connectivity => "connectivity",
            Stage::GraphBuild => "graph build",
            Stage::Assembly => "assembly",
            Stage::Dirichlet => "dirichlet",
            Stage::Export => "export",
            Stage::Solve => "solve",
            Stage::Transfer => "transfer",
        };
        f.write_str(s)
    }
}

/// Unified error type for linear-system construction, assembly and solve.
#[derive(Debug, Error)]
pub enum LinSysError {
    /// Entity ids are non-zero; 0 is reserved as a sentinel.
    #[error("EntityId must be non-zero (0 is reserved as invalid/sentinel)")]
    InvalidEntityId,

    /// Unknown part, unknown or mismatched topology, or an invalid configuration.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Structural invariant broken while building the sparse graphs.
    #[error("graph invariant violation during {stage}: {detail}")]
    GraphInvariant { stage: Stage, detail: String },

    /// A neighbor exchange did not complete.
    #[error("communication with rank {neighbor} failed during {stage}: {source}")]
    CommError {
        neighbor: usize,
        stage: Stage,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A neighbor message had the wrong byte length.
    #[error("buffer size mismatch from rank {neighbor} during {stage}: expected {expected} bytes, got {got}")]
    BufferSizeMismatch {
        neighbor: usize,
        stage: Stage,
        expected: usize,
        got: usize,
    },

    /// The external solver reported non-convergence or a singular system.
    #[error("solve failed: {reason}")]
    SolveFailure { reason: String },

    /// An operation was called out of lifecycle order.
    #[error("invalid state for {stage}: expected {expected}, found {found}")]
    InvalidState {
        stage: Stage,
        expected: &'static str,
        found: &'static str,
    },

    /// An entity has no local id in the current epoch.
    #[error("entity {entity} has no local id during {stage}")]
    EntityNotMapped { entity: EntityId, stage: Stage },

    /// Dense block sizes do not match the entity count.
    #[error("block size mismatch during {stage}: expected {expected} values, got {got}")]
    BlockSizeMismatch {
        stage: Stage,
        expected: usize,
        got: usize,
    },

    /// A dof range exceeds `num_dof` or a field's component count.
    #[error("dof range {begin}..{end} out of bounds for {len} dofs")]
    DofOutOfRange { begin: usize, end: usize, len: usize },

    /// Failure writing diagnostics.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl LinSysError {
    /// Shorthand for a graph-build invariant violation.
    pub(crate) fn graph(detail: impl Into<String>) -> Self {
        LinSysError::GraphInvariant {
            stage: Stage::GraphBuild,
            detail: detail.into(),
        }
    }

    /// Shorthand for a communication failure with a plain-text cause.
    pub(crate) fn comm(neighbor: usize, stage: Stage, msg: impl Into<String>) -> Self {
        let msg: String = msg.into();
        LinSysError::CommError {
            neighbor,
            stage,
            source: msg.into(),
        }
    }
}
