//! Parallel sparse-graph construction.
//!
//! Turns the local [`ConnectionList`] into the owned and shared-not-owned
//! [`SparseGraph`]s plus the row/column numbering, in exactly two rounds with
//! the neighbor set of a [`ProcessTopology`]:
//!
//! 1. **lengths**: every shared-not-owned row reports `(row gid, #cols)` to
//!    its owner. Owners merge the counts, adopt rows they only learn about
//!    from reports, and number all rows.
//! 2. **connections**: the column gids themselves follow, in the same order.
//!    Owners insert them and every row is sorted and deduplicated.
//!
//! Every structure here is ordered (`BTreeMap`/`BTreeSet`) so that messages
//! and graphs are identical across runs for a fixed partition.

use std::collections::{BTreeMap, BTreeSet};

use itertools::Itertools;
use log::debug;

use crate::algs::communicator::{CommTag, Communicator, LinSysCommTags};
use crate::algs::connectivity::ConnectionList;
use crate::algs::neighbor_exchange::exchange_records;
use crate::algs::wire::{WireGid, WireRowLength, kind};
use crate::data::local_id_map::{ColumnMap, RowMap};
use crate::data::sparse_graph::SparseGraph;
use crate::debug_invariants::DebugInvariants;
use crate::linsys_error::{LinSysError, Stage};
use crate::topology::entity::{EntityId, EntityRank, MeshEntity};
use crate::topology::mesh::MeshTopology;
use crate::topology::ownership::{EntityOwnership, ProcessTopology, classify};

/// Result of a graph rebuild.
#[derive(Clone, Debug, Default)]
pub struct AssembledGraphs {
    pub ownership: EntityOwnership,
    pub owned: SparseGraph,
    pub shared_not_owned: SparseGraph,
}

#[derive(Clone, Debug)]
struct RowBuilder {
    entity: MeshEntity,
    owner: usize,
    cols: BTreeSet<u64>,
    reported_len: usize,
    sharers: BTreeSet<usize>,
}

/// Stateful driver of the two-round protocol. The stages must run in order;
/// [`assemble_graph`] runs them all.
pub struct GraphAssembler<'m, M: ?Sized> {
    mesh: &'m M,
    process: &'m ProcessTopology,
    rows: BTreeMap<u64, RowBuilder>,
    outgoing: BTreeMap<usize, Vec<WireRowLength>>,
    incoming: BTreeMap<usize, Vec<WireRowLength>>,
}

impl<'m, M> GraphAssembler<'m, M>
where
    M: MeshTopology + ?Sized,
{
    pub fn new(mesh: &'m M, process: &'m ProcessTopology) -> Self {
        Self {
            mesh,
            process,
            rows: BTreeMap::new(),
            outgoing: BTreeMap::new(),
            incoming: BTreeMap::new(),
        }
    }

    fn row_entry(&mut self, e: MeshEntity) -> &mut RowBuilder {
        let owner = self.mesh.owner_rank(e);
        self.rows.entry(e.id().get()).or_insert_with(|| RowBuilder {
            entity: e,
            owner,
            cols: BTreeSet::new(),
            reported_len: 0,
            sharers: BTreeSet::new(),
        })
    }

    /// Fold the local connections into per-row column sets.
    pub fn collect_connections(&mut self, connections: &ConnectionList) {
        for c in connections {
            if !self.mesh.is_owned_or_shared(c.row) {
                continue;
            }
            self.row_entry(c.row).cols.insert(c.col.id().get());
        }
    }

    /// Per owning neighbor, the `(row gid, #cols)` records of the
    /// shared-not-owned rows it will receive, ascending by row gid.
    ///
    /// # Errors
    /// `GraphInvariant` if a row's owner is not in the neighbor set.
    pub fn compute_send_lengths(&mut self) -> Result<&BTreeMap<usize, Vec<WireRowLength>>, LinSysError> {
        let me = self.process.my_rank;
        self.outgoing.clear();
        for (&gid, row) in &self.rows {
            if row.owner == me {
                continue;
            }
            if !self.process.neighbors.contains(&row.owner) {
                return Err(LinSysError::graph(format!(
                    "row {gid} is owned by rank {} which is not a neighbor of rank {me}",
                    row.owner
                )));
            }
            self.outgoing
                .entry(row.owner)
                .or_default()
                .push(WireRowLength::new(gid, row.cols.len()));
        }
        Ok(&self.outgoing)
    }

    /// Round 1. Exchange row lengths, merge them into the owned rows, then
    /// number all rows in `rows` (which must be in a fresh epoch).
    ///
    /// # Errors
    /// `GraphInvariant` for reports naming unresolvable or foreign-owned
    /// rows, and for rows whose merged length is zero; `CommError` if a
    /// neighbor does not answer.
    pub fn compute_graph_row_lengths<C: Communicator>(
        &mut self,
        comm: &C,
        tag: CommTag,
        rows: &mut RowMap,
    ) -> Result<(), LinSysError> {
        let me = self.process.my_rank;
        self.incoming = exchange_records(
            comm,
            &self.process.neighbors,
            tag,
            kind::ROW_LENGTHS,
            Stage::GraphBuild,
            &self.outgoing,
        )?;

        let incoming = std::mem::take(&mut self.incoming);
        for (&nbr, reports) in &incoming {
            for rec in reports {
                let gid = rec.row_gid();
                let e = EntityId::new(gid)
                    .ok()
                    .and_then(|id| self.mesh.entity(EntityRank::Node, id))
                    .ok_or_else(|| {
                        LinSysError::graph(format!(
                            "rank {nbr} reported row {gid}, unknown on rank {me}"
                        ))
                    })?;
                if self.mesh.owner_rank(e) != me {
                    return Err(LinSysError::graph(format!(
                        "rank {nbr} reported row {gid} to rank {me}, which does not own it"
                    )));
                }
                let row = self.row_entry(e);
                row.reported_len += rec.len();
                row.sharers.insert(nbr);
            }
        }
        self.incoming = incoming;

        if let Some((gid, _)) = self
            .rows
            .iter()
            .find(|(_, r)| r.cols.len() + r.reported_len == 0)
        {
            return Err(LinSysError::graph(format!("row {gid} has zero length")));
        }

        rows.assign_local_ids(
            self.rows
                .values()
                .map(|r| (r.entity, classify(r.owner, me))),
        )
    }

    /// Round 2. Ship the column gids of shared-not-owned rows and insert the
    /// ones received into the owned rows.
    ///
    /// # Errors
    /// `GraphInvariant` if a neighbor's payload disagrees with its announced
    /// lengths; `CommError` if a neighbor does not answer.
    pub fn insert_graph_connections<C: Communicator>(
        &mut self,
        comm: &C,
        tag: CommTag,
    ) -> Result<(), LinSysError> {
        let mut payload: BTreeMap<usize, Vec<WireGid>> = BTreeMap::new();
        for (&owner, records) in &self.outgoing {
            let buf = payload.entry(owner).or_default();
            for rec in records {
                if let Some(row) = self.rows.get(&rec.row_gid()) {
                    buf.extend(row.cols.iter().map(|&g| WireGid::of(g)));
                }
            }
        }

        let received = exchange_records(
            comm,
            &self.process.neighbors,
            tag,
            kind::CONNECTIONS,
            Stage::GraphBuild,
            &payload,
        )?;

        for (nbr, gids) in received {
            let reports = self.incoming.get(&nbr).map_or(&[][..], Vec::as_slice);
            let announced: usize = reports.iter().map(WireRowLength::len).sum();
            if announced != gids.len() {
                return Err(LinSysError::graph(format!(
                    "rank {nbr} announced {announced} columns but sent {}",
                    gids.len()
                )));
            }
            let mut at = 0;
            for rec in reports {
                let chunk = &gids[at..at + rec.len()];
                at += rec.len();
                if let Some(row) = self.rows.get_mut(&rec.row_gid()) {
                    row.cols.extend(chunk.iter().map(WireGid::get));
                }
            }
        }
        Ok(())
    }

    /// Number the columns and freeze both graphs.
    pub fn finish(self, rows: &RowMap, cols: &mut ColumnMap) -> Result<AssembledGraphs, LinSysError> {
        let me = self.process.my_rank;
        let num_dof = rows.num_dof();

        let all_cols: BTreeSet<u64> = self
            .rows
            .values()
            .flat_map(|r| r.cols.iter().copied())
            .collect();
        let mut resolved = Vec::with_capacity(all_cols.len());
        for gid in all_cols {
            let id = EntityId::new(gid)?;
            resolved.push((id, self.mesh.entity(EntityRank::Node, id)));
        }
        cols.assign_local_ids(resolved);

        let mut ownership = EntityOwnership::with_capacity(rows.len());
        let mut block_rows: Vec<Vec<u32>> = Vec::with_capacity(rows.len());
        for &e in rows.entities() {
            let row = &self.rows[&e.id().get()];
            let lid = ownership.push(row.owner, me);
            for &sharer in &row.sharers {
                ownership.add_sharer(lid, sharer)?;
            }
            let lids: Vec<u32> = row
                .cols
                .iter()
                .map(|&g| {
                    cols.lid_of_gid(g)
                        .ok_or_else(|| LinSysError::graph(format!("column {g} missing from column map")))
                })
                .try_collect()?;
            if lids.is_empty() {
                return Err(LinSysError::graph(format!("row {e} has zero length")));
            }
            block_rows.push(lids);
        }

        let n_owned = rows.n_owned();
        let owned = SparseGraph::from_block_rows(0, num_dof, &block_rows[..n_owned]);
        let shared_not_owned = SparseGraph::from_block_rows(n_owned, num_dof, &block_rows[n_owned..]);

        debug!(
            "graph built on rank {me}: {} owned rows ({} nnz), {} shared rows ({} nnz), {} columns",
            owned.n_rows(),
            owned.nnz(),
            shared_not_owned.n_rows(),
            shared_not_owned.nnz(),
            cols.len() * num_dof,
        );
        debug_assert_eq!(ownership.owned_count(), n_owned);

        Ok(AssembledGraphs {
            ownership,
            owned,
            shared_not_owned,
        })
    }
}

/// Run the full two-round protocol. `rows` and `cols` must have begun a
/// fresh epoch.
#[allow(clippy::too_many_arguments)]
pub fn assemble_graph<C, M>(
    comm: &C,
    mesh: &M,
    process: &ProcessTopology,
    connections: &ConnectionList,
    tags: LinSysCommTags,
    rows: &mut RowMap,
    cols: &mut ColumnMap,
    check_invariants: bool,
) -> Result<AssembledGraphs, LinSysError>
where
    C: Communicator,
    M: MeshTopology + ?Sized,
{
    let mut asm = GraphAssembler::new(mesh, process);
    asm.collect_connections(connections);
    asm.compute_send_lengths()?;
    asm.compute_graph_row_lengths(comm, tags.row_lengths, rows)?;
    asm.insert_graph_connections(comm, tags.connections)?;
    let graphs = asm.finish(rows, cols)?;
    if check_invariants {
        rows.validate_invariants()?;
        cols.validate_invariants()?;
        graphs.owned.validate_invariants()?;
        graphs.shared_not_owned.validate_invariants()?;
    }
    Ok(graphs)
}
