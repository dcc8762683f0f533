//! Debug dumps of the assembled system.
//!
//! Coordinate listings keyed by global dof ids, so the output of different
//! processes can be concatenated and compared against a serial run.

use std::io::Write;

use log::{info, warn};

use crate::data::field::Field;
use crate::data::matrix::{DistributedMatrix, DistributedVector};
use crate::linsys::system::LinearSystem;
use crate::linsys_error::{LinSysError, Stage};
use crate::topology::entity::global_dof_id;

/// Which half of the system to dump.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RowClass {
    Owned,
    SharedNotOwned,
}

impl LinearSystem {
    fn pair(&self, which: RowClass) -> (&DistributedMatrix, &DistributedVector) {
        match which {
            RowClass::Owned => (&self.owned_lhs, &self.owned_rhs),
            RowClass::SharedNotOwned => (&self.sno_lhs, &self.sno_rhs),
        }
    }

    /// Global dof id of a local row, owned or shared.
    fn row_gdof(&self, row: usize) -> Option<u64> {
        let nd = self.num_dof();
        self.rows
            .entity((row / nd) as u32)
            .map(|e| global_dof_id(e.id(), nd, row % nd))
    }

    fn col_gdof(&self, col: u32) -> Option<u64> {
        let nd = self.num_dof();
        self.cols
            .gid(col / nd as u32)
            .map(|id| global_dof_id(id, nd, col as usize % nd))
    }

    /// `row col value` triplets, one per structural nonzero.
    pub fn write_matrix<W: Write>(&self, mut w: W, which: RowClass) -> Result<(), LinSysError> {
        let (a, _) = self.pair(which);
        let g = a.graph();
        writeln!(
            w,
            "% {} {:?} rows={} nnz={}",
            self.name(),
            which,
            g.n_rows(),
            g.nnz()
        )?;
        let view = a.view();
        for row in g.rows() {
            let Some(r) = self.row_gdof(row) else { continue };
            for (col, v) in view.row_entries(row) {
                if let Some(c) = self.col_gdof(col) {
                    writeln!(w, "{r} {c} {v:.16e}")?;
                }
            }
        }
        Ok(())
    }

    /// `row value` pairs.
    pub fn write_rhs<W: Write>(&self, mut w: W, which: RowClass) -> Result<(), LinSysError> {
        let (_, b) = self.pair(which);
        writeln!(w, "% {} {:?} rhs rows={}", self.name(), which, b.len())?;
        for row in b.rows() {
            if let (Some(r), Some(v)) = (self.row_gdof(row), b.get(row)) {
                writeln!(w, "{r} {v:.16e}")?;
            }
        }
        Ok(())
    }

    /// `row value` pairs of `field` over the owned rows, so every global dof
    /// appears once across all processes.
    ///
    /// # Errors
    /// `BlockSizeMismatch` if the field width is not `num_dof`.
    pub fn write_solution<W: Write>(&self, mut w: W, field: &Field) -> Result<(), LinSysError> {
        let nd = self.num_dof();
        if field.num_components() != nd {
            return Err(LinSysError::BlockSizeMismatch {
                stage: Stage::Transfer,
                expected: nd,
                got: field.num_components(),
            });
        }
        let owned = &self.rows.entities()[..self.rows.n_owned()];
        writeln!(
            w,
            "% {} solution {} rows={}",
            self.name(),
            field.name(),
            owned.len() * nd
        )?;
        for &e in owned {
            for (d, v) in field.get(e)?.iter().enumerate() {
                writeln!(w, "{} {v:.16e}", global_dof_id(e.id(), nd, d))?;
            }
        }
        Ok(())
    }

    /// Log graph sizes.
    pub fn print_info(&self) {
        info!(
            "{} (rank {}): num_dof={} owned rows={} shared rows={} columns={} owned nnz={} shared nnz={} state={}",
            self.name(),
            self.process.my_rank,
            self.num_dof(),
            self.max_owned_row_id(),
            self.max_shared_not_owned_row_id() - self.max_owned_row_id(),
            self.cols.len() * self.num_dof(),
            self.owned_lhs.graph().nnz(),
            self.sno_lhs.graph().nnz(),
            self.state(),
        );
    }

    /// Global dof ids of owned rows whose entries are all zero.
    pub fn check_for_zero_rows(&self) -> Vec<u64> {
        let view = self.owned_lhs.view();
        let mut zero = Vec::new();
        for row in self.owned_lhs.graph().rows() {
            if view.row_entries(row).all(|(_, v)| v == 0.0) {
                if let Some(g) = self.row_gdof(row) {
                    warn!("{}: row {g} is all zeros", self.name());
                    zero.push(g);
                }
            }
        }
        zero
    }
}
