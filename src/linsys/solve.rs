//! Hand-off to an external linear solver and copy-back onto mesh fields.

use log::debug;

use crate::algs::communicator::Communicator;
use crate::algs::export::sync_shared_values;
use crate::data::field::Field;
use crate::data::local_id_map::RowMap;
use crate::data::matrix::{DistributedMatrix, DistributedVector};
use crate::linsys::system::{AssemblyState, LinearSystem};
use crate::linsys_error::{LinSysError, Stage};

/// What the solver sees: the owned rows of the finalized system.
#[derive(Copy, Clone, Debug)]
pub struct SolveProblem<'a> {
    pub name: &'a str,
    pub matrix: &'a DistributedMatrix,
    pub rhs: &'a DistributedVector,
    /// Global dof id of each owned local row.
    pub row_global_ids: &'a [u64],
    /// Global dof id of each local column.
    pub col_global_ids: &'a [u64],
}

/// Solver result for the owned rows.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SolveOutcome {
    pub solution: Vec<f64>,
    pub iterations: usize,
    pub residual_norm: f64,
}

#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct SolveSummary {
    pub iterations: usize,
    pub residual_norm: f64,
    /// Shared-not-owned values refreshed by the post-solve sync.
    pub synced_values: usize,
}

/// External solver collaborator.
pub trait LinearSolver {
    /// # Errors
    /// `SolveFailure` on non-convergence or a singular system.
    fn solve(&mut self, problem: &SolveProblem<'_>) -> Result<SolveOutcome, LinSysError>;
}

fn check_width(rows: &RowMap, field: &Field) -> Result<(), LinSysError> {
    if field.num_components() != rows.num_dof() {
        return Err(LinSysError::BlockSizeMismatch {
            stage: Stage::Transfer,
            expected: rows.num_dof(),
            got: field.num_components(),
        });
    }
    Ok(())
}

/// Copy field values into `vec` for every row it covers: dof `d` of entity
/// `e` lands at local row `row_lid(e) * num_dof + d`.
pub fn copy_field_to_vector(rows: &RowMap, field: &Field, vec: &mut DistributedVector) -> Result<(), LinSysError> {
    check_width(rows, field)?;
    let nd = rows.num_dof();
    let range = vec.rows();
    let mut buf = vec![0.0; range.len()];
    for (lid, &e) in rows.entities().iter().enumerate() {
        let vals = field.get(e)?;
        for (d, &v) in vals.iter().enumerate() {
            let row = lid * nd + d;
            if range.contains(&row) {
                buf[row - range.start] = v;
            }
        }
    }
    vec.copy_from_slice(&buf);
    Ok(())
}

/// Inverse of [`copy_field_to_vector`].
pub fn copy_vector_to_field(rows: &RowMap, vec: &DistributedVector, field: &mut Field) -> Result<(), LinSysError> {
    check_width(rows, field)?;
    let nd = rows.num_dof();
    let range = vec.rows();
    for (lid, &e) in rows.entities().iter().enumerate() {
        let first = lid * nd;
        if !range.contains(&first) {
            continue;
        }
        let slot = field.get_mut(e)?;
        for (d, out) in slot.iter_mut().enumerate() {
            if let Some(v) = vec.get(first + d) {
                *out = v;
            }
        }
    }
    Ok(())
}

impl LinearSystem {
    /// Solve the finalized system, copy the owned solution into `field`, and
    /// refresh shared copies from their owners.
    ///
    /// # Errors
    /// `InvalidState` unless finalized; whatever the solver reports, never
    /// retried; `BlockSizeMismatch` for a mis-sized solution or field.
    pub fn solve<S, C>(&mut self, solver: &mut S, field: &mut Field, comm: &C) -> Result<SolveSummary, LinSysError>
    where
        S: LinearSolver + ?Sized,
        C: Communicator,
    {
        if self.state != AssemblyState::Finalized {
            return Err(self.invalid_state(Stage::Solve, AssemblyState::Finalized.as_str()));
        }
        check_width(&self.rows, field)?;

        let problem = SolveProblem {
            name: &self.config.name,
            matrix: &self.owned_lhs,
            rhs: &self.owned_rhs,
            row_global_ids: &self.row_dof_gids,
            col_global_ids: &self.col_dof_gids,
        };
        let outcome = solver.solve(&problem)?;
        let expected = self.rows.max_owned_row_id();
        if outcome.solution.len() != expected {
            return Err(LinSysError::BlockSizeMismatch {
                stage: Stage::Solve,
                expected,
                got: outcome.solution.len(),
            });
        }

        let mut solution = DistributedVector::new(0..expected);
        solution.copy_from_slice(&outcome.solution);
        copy_vector_to_field(&self.rows, &solution, field)?;

        let synced_values = sync_shared_values(
            comm,
            &self.process,
            self.config.tags().sync,
            &self.rows,
            &self.ownership,
            &outcome.solution,
            field,
        )?;

        debug!(
            "{}: solved in {} iterations, residual {:e}",
            self.config.name, outcome.iterations, outcome.residual_norm
        );
        Ok(SolveSummary {
            iterations: outcome.iterations,
            residual_norm: outcome.residual_norm,
            synced_values,
        })
    }

    /// Owned-row vector holding the values of `field`.
    pub fn copy_field_to_vector(&self, field: &Field) -> Result<DistributedVector, LinSysError> {
        self.require_graph(Stage::Transfer)?;
        let mut vec = DistributedVector::new(0..self.rows.max_owned_row_id());
        copy_field_to_vector(&self.rows, field, &mut vec)?;
        Ok(vec)
    }

    /// Write the rows of `vec` back into `field`.
    pub fn copy_vector_to_field(&self, vec: &DistributedVector, field: &mut Field) -> Result<(), LinSysError> {
        self.require_graph(Stage::Transfer)?;
        copy_vector_to_field(&self.rows, vec, field)
    }
}
