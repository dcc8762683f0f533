//! Scatter of dense element/face blocks into the distributed system.
//!
//! A [`CoeffApplier`] is a `Copy` bundle of borrowed views and id maps. Any
//! number of copies may call [`CoeffApplier::sum_into`] concurrently: every
//! write is an atomic add, and the structure it indexes is frozen for as long
//! as the applier borrows the system.

use log::{Level, log_enabled, trace};

use crate::data::local_id_map::{ColumnMap, RowMap};
use crate::data::matrix::{LocalMatrixView, LocalVectorView};
use crate::linsys_error::{LinSysError, Stage};
use crate::topology::entity::MeshEntity;

/// Indexable list of the entities a dense block refers to.
pub trait EntityList {
    fn len(&self) -> usize;
    fn entity(&self, i: usize) -> MeshEntity;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EntityList for [MeshEntity] {
    #[inline]
    fn len(&self) -> usize {
        <[MeshEntity]>::len(self)
    }
    #[inline]
    fn entity(&self, i: usize) -> MeshEntity {
        self[i]
    }
}

impl EntityList for Vec<MeshEntity> {
    #[inline]
    fn len(&self) -> usize {
        Vec::len(self)
    }
    #[inline]
    fn entity(&self, i: usize) -> MeshEntity {
        self[i]
    }
}

/// Fixed-capacity node list, the shape accelerator kernels carry per team.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct ConnectedNodes {
    len: usize,
    nodes: [Option<MeshEntity>; ConnectedNodes::CAPACITY],
}

impl ConnectedNodes {
    pub const CAPACITY: usize = 27;

    pub fn new() -> Self {
        Self::default()
    }

    /// # Errors
    /// `BlockSizeMismatch` if more than [`Self::CAPACITY`] nodes are given.
    pub fn from_slice(nodes: &[MeshEntity]) -> Result<Self, LinSysError> {
        let mut out = Self::new();
        for &n in nodes {
            out.push(n)?;
        }
        Ok(out)
    }

    pub fn push(&mut self, node: MeshEntity) -> Result<(), LinSysError> {
        if self.len == Self::CAPACITY {
            return Err(LinSysError::BlockSizeMismatch {
                stage: Stage::Assembly,
                expected: Self::CAPACITY,
                got: self.len + 1,
            });
        }
        self.nodes[self.len] = Some(node);
        self.len += 1;
        Ok(())
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn iter(&self) -> impl Iterator<Item = MeshEntity> + '_ {
        self.nodes[..self.len].iter().flatten().copied()
    }
}

impl EntityList for ConnectedNodes {
    #[inline]
    fn len(&self) -> usize {
        self.len
    }
    #[inline]
    fn entity(&self, i: usize) -> MeshEntity {
        match self.nodes[..self.len][i] {
            Some(e) => e,
            None => unreachable!("slots below len are filled"),
        }
    }
}

/// Borrowed assembly handle. See the module docs.
#[derive(Copy, Clone, Debug)]
pub struct CoeffApplier<'a> {
    rows: &'a RowMap,
    cols: &'a ColumnMap,
    num_dof: usize,
    owned_lhs: LocalMatrixView<'a>,
    owned_rhs: LocalVectorView<'a>,
    sno_lhs: LocalMatrixView<'a>,
    sno_rhs: LocalVectorView<'a>,
}

impl<'a> CoeffApplier<'a> {
    pub(crate) fn new(
        rows: &'a RowMap,
        cols: &'a ColumnMap,
        owned: (LocalMatrixView<'a>, LocalVectorView<'a>),
        sno: (LocalMatrixView<'a>, LocalVectorView<'a>),
    ) -> Self {
        Self {
            rows,
            cols,
            num_dof: rows.num_dof(),
            owned_lhs: owned.0,
            owned_rhs: owned.1,
            sno_lhs: sno.0,
            sno_rhs: sno.1,
        }
    }

    /// Copy suitable for handing to device-side (or worker) execution.
    pub fn device_handle(&self) -> CoeffApplier<'a> {
        *self
    }

    pub fn num_dof(&self) -> usize {
        self.num_dof
    }

    /// Accumulate a dense block.
    ///
    /// `rhs` has `n * num_dof` entries and `lhs` is the row-major square of
    /// that size, where `n = entities.len()`. `local_ids` and
    /// `sort_permutation` are caller scratch of at least `n * num_dof` each.
    /// Rows of entities with no local row are skipped.
    ///
    /// Every row is checked against the graph before the first add, so an
    /// error leaves the system untouched.
    ///
    /// # Errors
    /// `BlockSizeMismatch` for mis-sized blocks or scratch,
    /// `EntityNotMapped` for an entity missing from the column map, and
    /// `GraphInvariant` if a coupling was never registered in the graph.
    pub fn sum_into<E>(
        &self,
        entities: &E,
        rhs: &[f64],
        lhs: &[f64],
        local_ids: &mut [u32],
        sort_permutation: &mut [usize],
        trace_tag: &str,
    ) -> Result<(), LinSysError>
    where
        E: EntityList + ?Sized,
    {
        let nd = self.num_dof;
        let n = entities.len();
        let m = n * nd;
        let mismatch = |expected, got| LinSysError::BlockSizeMismatch {
            stage: Stage::Assembly,
            expected,
            got,
        };
        if rhs.len() != m {
            return Err(mismatch(m, rhs.len()));
        }
        if lhs.len() != m * m {
            return Err(mismatch(m * m, lhs.len()));
        }
        if local_ids.len() < m {
            return Err(mismatch(m, local_ids.len()));
        }
        if sort_permutation.len() < m {
            return Err(mismatch(m, sort_permutation.len()));
        }
        let local_ids = &mut local_ids[..m];
        let perm = &mut sort_permutation[..m];

        for i in 0..n {
            let e = entities.entity(i);
            let c = self.cols.lid(e).ok_or(LinSysError::EntityNotMapped {
                entity: e.id(),
                stage: Stage::Assembly,
            })?;
            for d in 0..nd {
                local_ids[i * nd + d] = c * nd as u32 + d as u32;
            }
        }
        for (k, p) in perm.iter_mut().enumerate() {
            *p = k;
        }
        perm.sort_unstable_by_key(|&k| local_ids[k]);

        if log_enabled!(Level::Trace) {
            trace!("sum_into[{trace_tag}]: {n} entities, {m} dofs");
        }

        let n_owned = self.rows.n_owned();
        let target = |lid: u32| {
            if (lid as usize) < n_owned {
                (self.owned_lhs, self.owned_rhs)
            } else {
                (self.sno_lhs, self.sno_rhs)
            }
        };

        for i in 0..n {
            let e = entities.entity(i);
            let Some(lid) = self.rows.lid(e) else { continue };
            let (a, _) = target(lid);
            for d in 0..nd {
                let row = lid as usize * nd + d;
                let missed = a.count_missing_permuted(row, perm, local_ids);
                if missed > 0 {
                    return Err(LinSysError::GraphInvariant {
                        stage: Stage::Assembly,
                        detail: format!(
                            "[{trace_tag}] {missed} couplings of row {e} dof {d} are not in the graph"
                        ),
                    });
                }
            }
        }

        for i in 0..n {
            let e = entities.entity(i);
            let Some(lid) = self.rows.lid(e) else { continue };
            let (a, b) = target(lid);
            for d in 0..nd {
                let r = i * nd + d;
                let row = lid as usize * nd + d;
                a.sum_into_permuted(row, perm, local_ids, &lhs[r * m..(r + 1) * m]);
                b.sum_into(row, rhs[r]);
            }
        }
        Ok(())
    }
}
