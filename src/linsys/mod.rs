//! The linear-system object and the operations on it.
//!
//! [`LinearSystem`] owns the id maps, graphs and value containers of one
//! equation set. Its methods are spread over submodules by concern.

pub mod coeff_applier;
pub mod config;
pub mod diagnostics;
pub mod dirichlet;
pub mod solve;
pub mod system;

pub use coeff_applier::{CoeffApplier, ConnectedNodes, EntityList};
pub use config::LinearSystemConfig;
pub use diagnostics::RowClass;
pub use solve::{LinearSolver, SolveOutcome, SolveProblem, SolveSummary};
pub use system::{AssemblyState, LinearSystem};
