//! Strong Dirichlet conditions and row resets.
//!
//! Owned rows are rewritten in place. Shared-not-owned rows are zeroed
//! entirely, rhs included, so the export adds nothing onto the owner's
//! constrained row; the owner applies the condition itself.

use crate::data::field::Field;
use crate::linsys::coeff_applier::EntityList;
use crate::linsys::system::LinearSystem;
use crate::linsys_error::{LinSysError, Stage};
use crate::topology::entity::{EntityRank, MeshEntity};
use crate::topology::mesh::MeshTopology;
use crate::topology::ownership::DofStatus;

impl LinearSystem {
    fn check_dof_range(&self, begin: usize, end: usize) -> Result<(), LinSysError> {
        if begin > end || end > self.num_dof() {
            return Err(LinSysError::DofOutOfRange {
                begin,
                end,
                len: self.num_dof(),
            });
        }
        Ok(())
    }

    /// Diagonal column of dof `d` on `e`, if `e` is a structural column.
    fn diagonal_col(&self, e: MeshEntity, d: usize) -> Option<u32> {
        self.cols
            .lid(e)
            .map(|c| c * self.num_dof() as u32 + d as u32)
    }

    /// Overwrite dofs `[begin, end)` of `e`'s row: owned rows get `diag` on
    /// the diagonal, zero elsewhere and `rhs(d)` in the rhs; shared rows are
    /// zeroed. Absent rows are skipped.
    fn rewrite_row(
        &self,
        e: MeshEntity,
        begin: usize,
        end: usize,
        stage: Stage,
        diag: f64,
        mut rhs: impl FnMut(usize) -> f64,
    ) -> Result<(), LinSysError> {
        let nd = self.num_dof();
        let Some(lid) = self.rows.lid(e) else { return Ok(()) };
        match self.rows.status(e) {
            DofStatus::Owned => {
                let a = self.owned_lhs.view();
                let b = self.owned_rhs.view();
                for d in begin..end {
                    let row = lid as usize * nd + d;
                    let diag_col = self.diagonal_col(e, d).ok_or(LinSysError::EntityNotMapped {
                        entity: e.id(),
                        stage,
                    })?;
                    let mut hit = false;
                    a.map_row(row, |c, _| {
                        if c == diag_col {
                            hit = true;
                            diag
                        } else {
                            0.0
                        }
                    });
                    if !hit {
                        return Err(LinSysError::GraphInvariant {
                            stage,
                            detail: format!("row {e} dof {d} has no diagonal entry"),
                        });
                    }
                    b.replace(row, rhs(d));
                }
            }
            DofStatus::SharedNotOwned => {
                let a = self.sno_lhs.view();
                let b = self.sno_rhs.view();
                for d in begin..end {
                    let row = lid as usize * nd + d;
                    a.map_row(row, |_, _| 0.0);
                    b.replace(row, 0.0);
                }
            }
            DofStatus::Absent => {}
        }
        Ok(())
    }

    /// Impose `field = bc_field` on dofs `[begin, end)` of every node in
    /// `parts`, in residual form: the rhs becomes `bc - field`.
    ///
    /// Applying it twice gives the same system.
    pub fn apply_dirichlet_bcs<M>(
        &mut self,
        mesh: &M,
        field: &Field,
        bc_field: &Field,
        parts: &[&str],
        begin: usize,
        end: usize,
    ) -> Result<(), LinSysError>
    where
        M: MeshTopology + ?Sized,
    {
        self.check_dof_range(begin, end)?;
        for f in [field, bc_field] {
            if f.num_components() < end {
                return Err(LinSysError::DofOutOfRange {
                    begin,
                    end,
                    len: f.num_components(),
                });
            }
        }
        self.mark_assembling(Stage::Dirichlet)?;
        for e in mesh.select(parts, EntityRank::Node)? {
            if self.rows.status(e) == DofStatus::Absent {
                continue;
            }
            let current = field.get(e)?;
            let bc = bc_field.get(e)?;
            self.rewrite_row(e, begin, end, Stage::Dirichlet, 1.0, |d| bc[d] - current[d])?;
        }
        Ok(())
    }

    /// Replace dofs `[begin, end)` of each entity's row with
    /// `diag_value · x = rhs_residual`.
    pub fn reset_rows<E>(
        &mut self,
        entities: &E,
        begin: usize,
        end: usize,
        diag_value: f64,
        rhs_residual: f64,
    ) -> Result<(), LinSysError>
    where
        E: EntityList + ?Sized,
    {
        self.check_dof_range(begin, end)?;
        self.mark_assembling(Stage::Dirichlet)?;
        for i in 0..entities.len() {
            self.rewrite_row(entities.entity(i), begin, end, Stage::Dirichlet, diag_value, |_| {
                rhs_residual
            })?;
        }
        Ok(())
    }

    /// Zero dofs `[begin, end)` of each entity's row and rhs, leaving room
    /// for constraint equations summed in afterwards.
    pub fn prepare_constraints<E>(&mut self, entities: &E, begin: usize, end: usize) -> Result<(), LinSysError>
    where
        E: EntityList + ?Sized,
    {
        self.check_dof_range(begin, end)?;
        self.mark_assembling(Stage::Dirichlet)?;
        let nd = self.num_dof();
        for i in 0..entities.len() {
            let e = entities.entity(i);
            let Some(lid) = self.rows.lid(e) else { continue };
            let (a, b) = match self.rows.status(e) {
                DofStatus::Owned => (self.owned_lhs.view(), self.owned_rhs.view()),
                DofStatus::SharedNotOwned => (self.sno_lhs.view(), self.sno_rhs.view()),
                DofStatus::Absent => continue,
            };
            for d in begin..end {
                let row = lid as usize * nd + d;
                a.map_row(row, |_, _| 0.0);
                b.replace(row, 0.0);
            }
        }
        Ok(())
    }
}
