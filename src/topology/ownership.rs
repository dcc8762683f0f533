//! Ownership metadata for row entities.
//!
//! A row entity is *Owned* when the local process is its home, and
//! *Shared-Not-Owned* when it is visible here but homed elsewhere. Entities
//! that are neither (aura ghosts) have no row and report [`DofStatus::Absent`].
//!
//! [`EntityOwnership`] records, per block row id, the owning rank and class,
//! plus the routing tables export and post-solve synchronisation walk:
//! which owner each shared-not-owned row goes to, and which sharers each
//! owned row comes back from.

use std::collections::{BTreeMap, BTreeSet};

use crate::linsys_error::LinSysError;
use crate::topology::mesh::MeshTopology;

/// Ownership class of a row entity.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, serde::Serialize, serde::Deserialize)]
pub enum OwnershipClass {
    Owned,
    SharedNotOwned,
}

/// Row status of an arbitrary entity, used to skip ghost-only rows.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum DofStatus {
    Owned,
    SharedNotOwned,
    Absent,
}

impl From<OwnershipClass> for DofStatus {
    fn from(c: OwnershipClass) -> Self {
        match c {
            OwnershipClass::Owned => DofStatus::Owned,
            OwnershipClass::SharedNotOwned => DofStatus::SharedNotOwned,
        }
    }
}

/// Owned if `owner == my_rank`, otherwise shared-not-owned.
#[inline]
pub fn classify(owner: usize, my_rank: usize) -> OwnershipClass {
    if owner == my_rank {
        OwnershipClass::Owned
    } else {
        OwnershipClass::SharedNotOwned
    }
}

/// Explicit process context handed to the graph assembler: the local rank
/// and the ranks it exchanges with. Never a global all-to-all.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProcessTopology {
    pub my_rank: usize,
    pub neighbors: BTreeSet<usize>,
}

impl ProcessTopology {
    pub fn new(my_rank: usize, neighbors: impl IntoIterator<Item = usize>) -> Self {
        let mut neighbors: BTreeSet<usize> = neighbors.into_iter().collect();
        neighbors.remove(&my_rank);
        Self { my_rank, neighbors }
    }

    /// Derive the neighbor set from the mesh's sharing information.
    pub fn from_mesh<M: MeshTopology + ?Sized>(mesh: &M) -> Self {
        Self::new(mesh.parallel_rank(), mesh.neighbor_ranks())
    }

    pub fn is_serial(&self) -> bool {
        self.neighbors.is_empty()
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct OwnershipEntry {
    pub owner: usize,
    pub class: OwnershipClass,
}

/// Per-row ownership plus neighbor routing tables, indexed by block row id.
#[derive(Clone, Debug, Default)]
pub struct EntityOwnership {
    entries: Vec<OwnershipEntry>,
    /// neighbor → shared-not-owned block rows it owns, ascending.
    sno_by_owner: BTreeMap<usize, Vec<u32>>,
    /// neighbor → owned block rows it shares, ascending.
    owned_by_sharer: BTreeMap<usize, Vec<u32>>,
}

impl EntityOwnership {
    pub fn with_capacity(n_rows: usize) -> Self {
        Self {
            entries: Vec::with_capacity(n_rows),
            ..Self::default()
        }
    }

    /// Number of rows tracked.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append the entry for the next block row id. Rows must be pushed in lid order.
    pub fn push(&mut self, owner: usize, my_rank: usize) -> u32 {
        let lid = self.entries.len() as u32;
        let class = classify(owner, my_rank);
        self.entries.push(OwnershipEntry { owner, class });
        if class == OwnershipClass::SharedNotOwned {
            self.sno_by_owner.entry(owner).or_default().push(lid);
        }
        lid
    }

    /// Record that `sharer` holds owned row `lid` as shared-not-owned.
    pub fn add_sharer(&mut self, lid: u32, sharer: usize) -> Result<(), LinSysError> {
        match self.entries.get(lid as usize) {
            Some(e) if e.class == OwnershipClass::Owned => {
                let rows = self.owned_by_sharer.entry(sharer).or_default();
                if let Err(pos) = rows.binary_search(&lid) {
                    rows.insert(pos, lid);
                }
                Ok(())
            }
            Some(_) => Err(LinSysError::graph(format!(
                "rank {sharer} reported row {lid} which is not owned here"
            ))),
            None => Err(LinSysError::graph(format!("row {lid} out of range"))),
        }
    }

    pub fn entry(&self, lid: u32) -> Option<OwnershipEntry> {
        self.entries.get(lid as usize).copied()
    }

    pub fn owner(&self, lid: u32) -> Option<usize> {
        self.entry(lid).map(|e| e.owner)
    }

    pub fn class(&self, lid: u32) -> Option<OwnershipClass> {
        self.entry(lid).map(|e| e.class)
    }

    /// Shared-not-owned rows grouped by owning neighbor.
    pub fn sno_rows_by_owner(&self) -> &BTreeMap<usize, Vec<u32>> {
        &self.sno_by_owner
    }

    /// Owned rows grouped by sharing neighbor.
    pub fn owned_rows_by_sharer(&self) -> &BTreeMap<usize, Vec<u32>> {
        &self.owned_by_sharer
    }

    pub fn owned_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.class == OwnershipClass::Owned)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_compares_ranks() {
        assert_eq!(classify(2, 2), OwnershipClass::Owned);
        assert_eq!(classify(1, 2), OwnershipClass::SharedNotOwned);
    }

    #[test]
    fn routing_tables_follow_pushes() {
        let mut own = EntityOwnership::with_capacity(4);
        own.push(0, 0);
        own.push(0, 0);
        own.push(1, 0);
        own.push(2, 0);
        own.add_sharer(1, 2).unwrap();
        own.add_sharer(0, 2).unwrap();
        own.add_sharer(0, 2).unwrap();
        assert_eq!(own.sno_rows_by_owner()[&1], vec![2]);
        assert_eq!(own.sno_rows_by_owner()[&2], vec![3]);
        assert_eq!(own.owned_rows_by_sharer()[&2], vec![0, 1]);
        assert_eq!(own.owned_count(), 2);
    }

    #[test]
    fn sharer_of_non_owned_row_is_rejected() {
        let mut own = EntityOwnership::default();
        own.push(3, 0);
        assert!(matches!(
            own.add_sharer(0, 3),
            Err(LinSysError::GraphInvariant { .. })
        ));
    }

    #[test]
    fn process_topology_drops_self() {
        let topo = ProcessTopology::new(1, [0, 1, 2]);
        assert_eq!(topo.neighbors.into_iter().collect::<Vec<_>>(), vec![0, 2]);
    }
}
