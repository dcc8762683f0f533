//! Epoch-checked dense maps from mesh entities to local ids.
//!
//! [`LocalIdMap`] is an arena indexed by the entity's local offset. Each slot
//! remembers the epoch it was written in; bumping the epoch invalidates every
//! slot at once without touching memory, so a lookup through an offset from
//! a previous topology reads as absent instead of aliasing a new row. The
//! arena grows on demand and never shrinks.
//!
//! [`RowMap`] and [`ColumnMap`] layer the linear-system numbering on top:
//! rows are numbered owned-first, columns by ascending global id.

use crate::debug_invariants::DebugInvariants;
use crate::linsys_error::LinSysError;
use crate::topology::entity::{EntityId, MeshEntity};
use crate::topology::ownership::{DofStatus, OwnershipClass};

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
struct Slot {
    epoch: u32,
    lid: u32,
}

/// Dense `offset → lid` arena with epoch invalidation.
#[derive(Clone, Debug)]
pub struct LocalIdMap {
    slots: Vec<Slot>,
    epoch: u32,
    len: usize,
}

impl Default for LocalIdMap {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalIdMap {
    /// Empty map. Epoch 0 is never current, so zeroed slots are absent.
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            epoch: 1,
            len: 0,
        }
    }

    pub fn epoch(&self) -> u32 {
        self.epoch
    }

    /// Number of entries written in the current epoch.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Arena size in slots.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Invalidate all entries and make room for offsets below `capacity`.
    pub fn begin_epoch(&mut self, capacity: usize) {
        if self.epoch == u32::MAX {
            self.slots.fill(Slot::default());
            self.epoch = 1;
        } else {
            self.epoch += 1;
        }
        self.len = 0;
        self.reserve_offsets(capacity);
    }

    /// Grow the arena; existing entries keep their ids.
    pub fn reserve_offsets(&mut self, capacity: usize) {
        if capacity > self.slots.len() {
            self.slots.resize(capacity, Slot::default());
        }
    }

    /// Map `e` to `lid` in the current epoch.
    pub fn insert(&mut self, e: MeshEntity, lid: u32) {
        self.reserve_offsets(e.offset() + 1);
        let slot = &mut self.slots[e.offset()];
        if slot.epoch != self.epoch {
            self.len += 1;
        }
        *slot = Slot {
            epoch: self.epoch,
            lid,
        };
    }

    /// Local id of `e`, or `None` if it was not mapped in the current epoch.
    #[inline]
    pub fn get(&self, e: MeshEntity) -> Option<u32> {
        self.slots
            .get(e.offset())
            .filter(|s| s.epoch == self.epoch)
            .map(|s| s.lid)
    }
}

/// Row numbering: owned block rows `[0, n_owned)`, then shared-not-owned
/// rows `[n_owned, n_owned + n_sno)`, each block in ascending global id.
#[derive(Clone, Debug, Default)]
pub struct RowMap {
    ids: LocalIdMap,
    rows: Vec<MeshEntity>,
    n_owned: usize,
    num_dof: usize,
}

impl RowMap {
    pub fn new(num_dof: usize) -> Self {
        Self {
            num_dof,
            ..Self::default()
        }
    }

    /// Drop the current numbering; stale offsets read as absent from now on.
    pub fn begin_epoch(&mut self, capacity: usize) {
        self.ids.begin_epoch(capacity);
        self.rows.clear();
        self.n_owned = 0;
    }

    /// Number the distinct row entities: owned first, then shared-not-owned,
    /// each ascending by global id.
    ///
    /// # Errors
    /// `GraphInvariant` if an entity appears twice.
    pub fn assign_local_ids<I>(&mut self, rows: I) -> Result<(), LinSysError>
    where
        I: IntoIterator<Item = (MeshEntity, OwnershipClass)>,
    {
        let (mut owned, mut sno): (Vec<_>, Vec<_>) = rows
            .into_iter()
            .partition(|&(_, class)| class == OwnershipClass::Owned);
        owned.sort_unstable_by_key(|(e, _)| e.id());
        sno.sort_unstable_by_key(|(e, _)| e.id());
        self.rows.clear();
        self.rows.reserve(owned.len() + sno.len());
        self.n_owned = owned.len();
        for (e, _) in owned.into_iter().chain(sno) {
            if self.ids.get(e).is_some() {
                return Err(LinSysError::graph(format!("row entity {e} numbered twice")));
            }
            let lid = self.rows.len() as u32;
            self.ids.insert(e, lid);
            self.rows.push(e);
        }
        crate::debug_invariants!(self.validate_invariants(), "row numbering");
        Ok(())
    }

    pub fn num_dof(&self) -> usize {
        self.num_dof
    }

    pub fn epoch(&self) -> u32 {
        self.ids.epoch()
    }

    /// Block row id of `e`.
    #[inline]
    pub fn lid(&self, e: MeshEntity) -> Option<u32> {
        self.ids.get(e)
    }

    pub fn status(&self, e: MeshEntity) -> DofStatus {
        match self.lid(e) {
            Some(lid) if (lid as usize) < self.n_owned => DofStatus::Owned,
            Some(_) => DofStatus::SharedNotOwned,
            None => DofStatus::Absent,
        }
    }

    pub fn entity(&self, lid: u32) -> Option<MeshEntity> {
        self.rows.get(lid as usize).copied()
    }

    /// Row entities in lid order.
    pub fn entities(&self) -> &[MeshEntity] {
        &self.rows
    }

    /// Owned block row with global id `gid`.
    pub fn owned_lid_of_gid(&self, gid: u64) -> Option<u32> {
        self.rows[..self.n_owned]
            .binary_search_by_key(&gid, |e| e.id().get())
            .ok()
            .map(|i| i as u32)
    }

    /// Shared-not-owned block row with global id `gid`.
    pub fn sno_lid_of_gid(&self, gid: u64) -> Option<u32> {
        self.rows[self.n_owned..]
            .binary_search_by_key(&gid, |e| e.id().get())
            .ok()
            .map(|i| (self.n_owned + i) as u32)
    }

    pub fn n_owned(&self) -> usize {
        self.n_owned
    }

    pub fn n_shared_not_owned(&self) -> usize {
        self.rows.len() - self.n_owned
    }

    /// Total block rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// One past the last owned dof row.
    pub fn max_owned_row_id(&self) -> usize {
        self.n_owned * self.num_dof
    }

    /// One past the last shared-not-owned dof row.
    pub fn max_shared_not_owned_row_id(&self) -> usize {
        self.rows.len() * self.num_dof
    }
}

fn strictly_ascending(es: &[MeshEntity]) -> bool {
    es.windows(2).all(|w| w[0].id() < w[1].id())
}

impl DebugInvariants for RowMap {
    fn validate_invariants(&self) -> Result<(), LinSysError> {
        let (owned, sno) = self.rows.split_at(self.n_owned);
        if !strictly_ascending(owned) || !strictly_ascending(sno) {
            return Err(LinSysError::graph("row blocks not in ascending global id order"));
        }
        for (lid, &e) in self.rows.iter().enumerate() {
            if self.ids.get(e) != Some(lid as u32) {
                return Err(LinSysError::graph(format!(
                    "row {e} maps to {:?}, expected {lid}",
                    self.ids.get(e)
                )));
            }
        }
        if self.max_owned_row_id() > self.max_shared_not_owned_row_id() {
            return Err(LinSysError::graph("owned rows exceed total rows"));
        }
        Ok(())
    }
}

/// Column numbering by ascending global id. May contain global ids with no
/// local entity (columns only reachable through a neighbor's report).
#[derive(Clone, Debug, Default)]
pub struct ColumnMap {
    ids: LocalIdMap,
    gids: Vec<EntityId>,
}

impl ColumnMap {
    pub fn begin_epoch(&mut self, capacity: usize) {
        self.ids.begin_epoch(capacity);
        self.gids.clear();
    }

    /// Number the columns; `local` is `None` for off-process-only ids.
    pub fn assign_local_ids<I>(&mut self, cols: I)
    where
        I: IntoIterator<Item = (EntityId, Option<MeshEntity>)>,
    {
        let mut cols: Vec<_> = cols.into_iter().collect();
        cols.sort_unstable_by_key(|&(gid, _)| gid);
        cols.dedup_by_key(|&mut (gid, _)| gid);
        self.gids.clear();
        self.gids.reserve(cols.len());
        for (lid, (gid, local)) in cols.into_iter().enumerate() {
            if let Some(e) = local {
                self.ids.insert(e, lid as u32);
            }
            self.gids.push(gid);
        }
    }

    pub fn epoch(&self) -> u32 {
        self.ids.epoch()
    }

    #[inline]
    pub fn lid(&self, e: MeshEntity) -> Option<u32> {
        self.ids.get(e)
    }

    pub fn lid_of_gid(&self, gid: u64) -> Option<u32> {
        self.gids
            .binary_search_by_key(&gid, |g| g.get())
            .ok()
            .map(|i| i as u32)
    }

    pub fn gid(&self, lid: u32) -> Option<EntityId> {
        self.gids.get(lid as usize).copied()
    }

    pub fn len(&self) -> usize {
        self.gids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.gids.is_empty()
    }
}

impl DebugInvariants for ColumnMap {
    fn validate_invariants(&self) -> Result<(), LinSysError> {
        if self.gids.windows(2).any(|w| w[0] >= w[1]) {
            return Err(LinSysError::graph("column ids not strictly ascending"));
        }
        Ok(())
    }
}
