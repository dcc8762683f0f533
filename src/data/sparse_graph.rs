//! Dof-level CSR sparsity pattern for one row class.
//!
//! Built once per topology from block rows (one per row entity) and frozen
//! afterwards. Every block column expands to `num_dof` dof columns, so each
//! dof row of a block row shares the same column list. Column ids are
//! column-map lids; because the column map is ordered by global id, a sorted
//! row is also sorted by `(column gid, dof)` and can be binary searched.
//!
//! Rows are addressed by their *local row id* `row_lid * num_dof + d`. The
//! shared-not-owned graph starts at `n_owned * num_dof`, so callers never
//! have to rebase ids between the two classes.

use std::ops::Range;
use std::sync::Arc;

use crate::debug_invariants::DebugInvariants;
use crate::linsys_error::LinSysError;

#[derive(Clone, Debug)]
pub struct SparseGraph {
    first_row: usize,
    num_dof: usize,
    row_ptr: Arc<[usize]>,
    col_lids: Arc<[u32]>,
}

impl Default for SparseGraph {
    fn default() -> Self {
        Self {
            first_row: 0,
            num_dof: 1,
            row_ptr: Arc::from([0usize]),
            col_lids: Arc::from([]),
        }
    }
}

impl SparseGraph {
    /// Expand block rows into dof rows.
    ///
    /// `block_rows[i]` holds the sorted, deduplicated block column lids of
    /// block row `first_block_row + i`.
    pub fn from_block_rows(first_block_row: usize, num_dof: usize, block_rows: &[Vec<u32>]) -> Self {
        let n_rows = block_rows.len() * num_dof;
        let nnz: usize = block_rows.iter().map(|r| r.len() * num_dof * num_dof).sum();
        let mut row_ptr = Vec::with_capacity(n_rows + 1);
        let mut col_lids = Vec::with_capacity(nnz);
        row_ptr.push(0);
        for cols in block_rows {
            for _ in 0..num_dof {
                for &c in cols {
                    let base = c as usize * num_dof;
                    col_lids.extend((base..base + num_dof).map(|x| x as u32));
                }
                row_ptr.push(col_lids.len());
            }
        }
        Self {
            first_row: first_block_row * num_dof,
            num_dof,
            row_ptr: row_ptr.into(),
            col_lids: col_lids.into(),
        }
    }

    /// Local row ids covered by this graph.
    pub fn rows(&self) -> Range<usize> {
        self.first_row..self.first_row + self.n_rows()
    }

    pub fn n_rows(&self) -> usize {
        self.row_ptr.len() - 1
    }

    pub fn nnz(&self) -> usize {
        self.col_lids.len()
    }

    pub fn num_dof(&self) -> usize {
        self.num_dof
    }

    pub fn contains_row(&self, row: usize) -> bool {
        self.rows().contains(&row)
    }

    /// Positions of `row`'s entries in the value array.
    #[inline]
    pub fn row_range(&self, row: usize) -> Range<usize> {
        let r = row - self.first_row;
        self.row_ptr[r]..self.row_ptr[r + 1]
    }

    /// Dof column ids of `row`, ascending.
    #[inline]
    pub fn row_cols(&self, row: usize) -> &[u32] {
        &self.col_lids[self.row_range(row)]
    }

    /// Value-array position of `(row, col)`, if it is a structural nonzero.
    #[inline]
    pub fn find(&self, row: usize, col: u32) -> Option<usize> {
        if !self.contains_row(row) {
            return None;
        }
        let range = self.row_range(row);
        self.col_lids[range.clone()]
            .binary_search(&col)
            .ok()
            .map(|k| range.start + k)
    }

    pub fn col_lids(&self) -> &[u32] {
        &self.col_lids
    }
}

impl DebugInvariants for SparseGraph {
    fn validate_invariants(&self) -> Result<(), LinSysError> {
        if self.row_ptr.first() != Some(&0) || self.row_ptr.last() != Some(&self.col_lids.len()) {
            return Err(LinSysError::graph("row_ptr does not span the column array"));
        }
        for row in self.rows() {
            let range = self.row_range(row);
            if range.is_empty() {
                return Err(LinSysError::graph(format!("local row {row} has no entries")));
            }
            if self.col_lids[range].windows(2).any(|w| w[0] >= w[1]) {
                return Err(LinSysError::graph(format!(
                    "local row {row} is not sorted and deduplicated"
                )));
            }
        }
        Ok(())
    }
}
