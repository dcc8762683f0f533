//! Matrix and vector storage keyed by a frozen [`SparseGraph`].
//!
//! Values are [`AtomicF64`] cells so that any number of coefficient appliers
//! can accumulate through shared `Local*View`s while the structure stays
//! immutable. Views are `Copy` and allocation-free. Exclusive operations
//! (`zero`, snapshots for the solver) take `&mut self` or `&self` on the
//! container and need no atomics beyond relaxed loads.

use std::ops::Range;
use std::sync::atomic::Ordering;

#[cfg(feature = "rayon")]
use rayon::prelude::*;

use crate::data::atomic_float::AtomicF64;
use crate::data::sparse_graph::SparseGraph;
use crate::debug_invariants::DebugInvariants;

fn zeroed(n: usize) -> Vec<AtomicF64> {
    (0..n).map(|_| AtomicF64::zero()).collect()
}

fn zero_all(values: &mut [AtomicF64]) {
    #[cfg(feature = "rayon")]
    values.par_iter_mut().for_each(|v| v.set_mut(0.0));
    #[cfg(not(feature = "rayon"))]
    values.iter_mut().for_each(|v| v.set_mut(0.0));
}

/// Sparse matrix for one row class.
#[derive(Clone, Debug, Default)]
pub struct DistributedMatrix {
    graph: SparseGraph,
    values: Vec<AtomicF64>,
}

impl DistributedMatrix {
    pub fn new(graph: SparseGraph) -> Self {
        graph.debug_assert_invariants();
        let values = zeroed(graph.nnz());
        Self { graph, values }
    }

    pub fn graph(&self) -> &SparseGraph {
        &self.graph
    }

    /// Reset every value; the structure is untouched.
    pub fn zero(&mut self) {
        zero_all(&mut self.values);
    }

    pub fn view(&self) -> LocalMatrixView<'_> {
        LocalMatrixView {
            graph: &self.graph,
            values: &self.values,
        }
    }

    pub fn get(&self, row: usize, col: u32) -> Option<f64> {
        self.view().get(row, col)
    }

    /// Plain copy of the value array, in graph order.
    pub fn values_snapshot(&self) -> Vec<f64> {
        self.values.iter().map(|v| v.load(Ordering::Relaxed)).collect()
    }
}

/// Dense vector over the rows of one row class.
#[derive(Clone, Debug, Default)]
pub struct DistributedVector {
    first_row: usize,
    values: Vec<AtomicF64>,
}

impl DistributedVector {
    pub fn new(rows: Range<usize>) -> Self {
        Self {
            first_row: rows.start,
            values: zeroed(rows.len()),
        }
    }

    pub fn rows(&self) -> Range<usize> {
        self.first_row..self.first_row + self.values.len()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn zero(&mut self) {
        zero_all(&mut self.values);
    }

    pub fn view(&self) -> LocalVectorView<'_> {
        LocalVectorView {
            first_row: self.first_row,
            values: &self.values,
        }
    }

    pub fn get(&self, row: usize) -> Option<f64> {
        self.view().get(row)
    }

    pub fn values_snapshot(&self) -> Vec<f64> {
        self.values.iter().map(|v| v.load(Ordering::Relaxed)).collect()
    }

    /// Overwrite from a slice in row order.
    pub fn copy_from_slice(&mut self, src: &[f64]) {
        for (dst, &v) in self.values.iter_mut().zip(src) {
            dst.set_mut(v);
        }
    }
}

/// Shared, non-owning handle for accumulating into a matrix.
#[derive(Copy, Clone, Debug)]
pub struct LocalMatrixView<'a> {
    graph: &'a SparseGraph,
    values: &'a [AtomicF64],
}

impl<'a> LocalMatrixView<'a> {
    pub fn graph(&self) -> &'a SparseGraph {
        self.graph
    }

    /// Atomically add `v` at `(row, col)`. Returns `false` if the entry is
    /// not a structural nonzero.
    #[inline]
    pub fn sum_into(&self, row: usize, col: u32, v: f64) -> bool {
        match self.graph.find(row, col) {
            Some(k) => {
                self.values[k].fetch_add(v, Ordering::Relaxed);
                true
            }
            None => false,
        }
    }

    /// Merge-walk `row` against `cols` in `perm` order, calling `hit(p, k)`
    /// for every `cols[p]` found at value slot `k`. Returns the misses.
    #[inline]
    fn walk_permuted(&self, row: usize, perm: &[usize], cols: &[u32], mut hit: impl FnMut(usize, usize)) -> usize {
        if !self.graph.contains_row(row) {
            return perm.len();
        }
        let range = self.graph.row_range(row);
        let row_cols = &self.graph.col_lids()[range.clone()];
        let mut missed = 0;
        let mut k = 0;
        for &p in perm {
            let c = cols[p];
            while k < row_cols.len() && row_cols[k] < c {
                k += 1;
            }
            if k < row_cols.len() && row_cols[k] == c {
                hit(p, range.start + k);
            } else {
                missed += 1;
            }
        }
        missed
    }

    /// Add `vals[p]` at `(row, cols[p])` for each `p` in `perm`, where `perm`
    /// orders `cols` ascending, walking the row once. Returns the number of
    /// entries that were not structural; the structural ones are still added.
    #[inline]
    pub fn sum_into_permuted(&self, row: usize, perm: &[usize], cols: &[u32], vals: &[f64]) -> usize {
        self.walk_permuted(row, perm, cols, |p, k| {
            self.values[k].fetch_add(vals[p], Ordering::Relaxed);
        })
    }

    /// Number of `(row, cols[p])` that are not structural. Writes nothing.
    #[inline]
    pub fn count_missing_permuted(&self, row: usize, perm: &[usize], cols: &[u32]) -> usize {
        self.walk_permuted(row, perm, cols, |_, _| {})
    }

    /// Overwrite `(row, col)`. Returns `false` if it is not structural.
    pub fn replace(&self, row: usize, col: u32, v: f64) -> bool {
        match self.graph.find(row, col) {
            Some(k) => {
                self.values[k].store(v, Ordering::Relaxed);
                true
            }
            None => false,
        }
    }

    pub fn get(&self, row: usize, col: u32) -> Option<f64> {
        self.graph
            .find(row, col)
            .map(|k| self.values[k].load(Ordering::Relaxed))
    }

    /// Set every entry of `row` to `f(col, old)`.
    pub fn map_row(&self, row: usize, mut f: impl FnMut(u32, f64) -> f64) {
        if !self.graph.contains_row(row) {
            return;
        }
        let range = self.graph.row_range(row);
        for k in range {
            let col = self.graph.col_lids()[k];
            let cell = &self.values[k];
            cell.store(f(col, cell.load(Ordering::Relaxed)), Ordering::Relaxed);
        }
    }

    /// `(col, value)` pairs of `row`.
    pub fn row_entries(self, row: usize) -> impl Iterator<Item = (u32, f64)> + 'a {
        let (graph, values) = (self.graph, self.values);
        let range = if graph.contains_row(row) {
            graph.row_range(row)
        } else {
            0..0
        };
        let cols = &graph.col_lids()[range.clone()];
        let vals = &values[range];
        cols.iter()
            .zip(vals)
            .map(|(&c, v)| (c, v.load(Ordering::Relaxed)))
    }
}

/// Shared, non-owning handle for accumulating into a vector.
#[derive(Copy, Clone, Debug)]
pub struct LocalVectorView<'a> {
    first_row: usize,
    values: &'a [AtomicF64],
}

impl<'a> LocalVectorView<'a> {
    #[inline]
    fn cell(&self, row: usize) -> Option<&'a AtomicF64> {
        row.checked_sub(self.first_row)
            .and_then(|i| self.values.get(i))
    }

    #[inline]
    pub fn sum_into(&self, row: usize, v: f64) -> bool {
        match self.cell(row) {
            Some(c) => {
                c.fetch_add(v, Ordering::Relaxed);
                true
            }
            None => false,
        }
    }

    pub fn replace(&self, row: usize, v: f64) -> bool {
        match self.cell(row) {
            Some(c) => {
                c.store(v, Ordering::Relaxed);
                true
            }
            None => false,
        }
    }

    pub fn get(&self, row: usize) -> Option<f64> {
        self.cell(row).map(|c| c.load(Ordering::Relaxed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph() -> SparseGraph {
        SparseGraph::from_block_rows(0, 1, &[vec![0, 1], vec![0, 1, 2]])
    }

    #[test]
    fn sum_into_accumulates_and_rejects_non_structural() {
        let m = DistributedMatrix::new(graph());
        let v = m.view();
        assert!(v.sum_into(1, 2, 1.5));
        assert!(v.sum_into(1, 2, 0.5));
        assert!(!v.sum_into(0, 2, 1.0));
        assert_eq!(m.get(1, 2), Some(2.0));
    }

    #[test]
    fn sorted_merge_walk_counts_misses() {
        let m = DistributedMatrix::new(graph());
        // columns arrive unsorted; the permutation orders them
        let cols = [2, 1, 0, 1];
        let vals = [3.0, 2.0, 1.0, 0.5];
        let missed = m.view().sum_into_permuted(0, &[2, 1, 3, 0], &cols, &vals);
        assert_eq!(missed, 1);
        assert_eq!(m.get(0, 0), Some(1.0));
        assert_eq!(m.get(0, 1), Some(2.5));
    }

    #[test]
    fn counting_misses_writes_nothing() {
        let m = DistributedMatrix::new(graph());
        let cols = [2, 0];
        assert_eq!(m.view().count_missing_permuted(0, &[1, 0], &cols), 1);
        assert_eq!(m.view().count_missing_permuted(1, &[1, 0], &cols), 0);
        assert_eq!(m.view().count_missing_permuted(7, &[1, 0], &cols), 2);
        assert!(m.values_snapshot().iter().all(|&x| x == 0.0));
    }

    #[test]
    fn zero_keeps_structure() {
        let mut m = DistributedMatrix::new(graph());
        m.view().sum_into(0, 0, 3.0);
        m.zero();
        assert_eq!(m.graph().nnz(), 5);
        assert!(m.values_snapshot().iter().all(|&x| x == 0.0));
    }

    #[test]
    fn vector_view_offsets_rows() {
        let mut b = DistributedVector::new(4..6);
        let v = b.view();
        assert!(!v.sum_into(3, 1.0));
        assert!(v.sum_into(5, 2.0));
        assert_eq!(b.get(5), Some(2.0));
        b.zero();
        assert_eq!(b.get(5), Some(0.0));
    }

    #[test]
    fn map_row_rewrites_in_place() {
        let m = DistributedMatrix::new(graph());
        let v = m.view();
        v.sum_into(1, 0, 4.0);
        v.sum_into(1, 1, 5.0);
        v.map_row(1, |c, old| if c == 1 { 1.0 } else { old * 0.0 });
        let row: Vec<_> = v.row_entries(1).collect();
        assert_eq!(row, vec![(0, 0.0), (1, 1.0), (2, 0.0)]);
    }
}
