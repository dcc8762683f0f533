//! Mesh collaborator interface.
//!
//! The linear system never owns the mesh. It reads entity sets per part,
//! node connectivity, owners and sharing ranks through [`MeshTopology`], and
//! only writes to mesh-resident [`Field`](crate::data::field::Field)s during
//! copy-back.
//!
//! [`InMemoryMesh`] is a small owned implementation used for single-process
//! runs and for the per-rank views built in tests.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::linsys_error::LinSysError;
use crate::topology::cell_type::CellTopology;
use crate::topology::entity::{EntityId, EntityRank, MeshEntity};

/// Read-only view of a partitioned mesh, as seen from one process.
pub trait MeshTopology {
    /// Rank of the local process.
    fn parallel_rank(&self) -> usize;

    /// One past the largest local offset handed out; sizes id-map arenas.
    fn offset_capacity(&self) -> usize;

    /// Entities of `rank` in the union of `parts`, sorted by global id.
    ///
    /// # Errors
    /// `Configuration` if a part name is unknown.
    fn select(&self, parts: &[&str], rank: EntityRank) -> Result<Vec<MeshEntity>, LinSysError>;

    /// Look up a local entity by global id.
    fn entity(&self, rank: EntityRank, id: EntityId) -> Option<MeshEntity>;

    /// Rank of the process that owns `e`.
    fn owner_rank(&self, e: MeshEntity) -> usize;

    /// Other processes that hold `e` as a shared (not aura-ghosted) entity.
    fn sharing_ranks(&self, e: MeshEntity) -> &[usize];

    /// Ranks sharing at least one entity with this process.
    fn neighbor_ranks(&self) -> BTreeSet<usize>;

    /// Connected nodes of `e`, in topology order. A node is connected to itself.
    fn nodes(&self, e: MeshEntity) -> &[MeshEntity];

    /// Topology of `e`.
    fn topology(&self, e: MeshEntity) -> CellTopology;

    /// Elements attached to a face.
    fn face_elements(&self, face: MeshEntity) -> &[MeshEntity];

    /// Nonconformal couplings `(current element, opposing element)` on `parts`.
    fn nonconformal_couplings(
        &self,
        parts: &[&str],
    ) -> Result<Vec<(MeshEntity, MeshEntity)>, LinSysError> {
        let _ = parts;
        Ok(Vec::new())
    }

    /// Overset constraints `(fringe node, donor element)`.
    fn overset_constraints(&self) -> Vec<(MeshEntity, MeshEntity)> {
        Vec::new()
    }

    /// Whether `e` is held locally as an owned or shared entity.
    fn is_owned_or_shared(&self, e: MeshEntity) -> bool {
        self.owner_rank(e) == self.parallel_rank() || !self.sharing_ranks(e).is_empty()
    }
}

#[derive(Clone, Debug)]
struct EntityRecord {
    entity: MeshEntity,
    rank: EntityRank,
    owner: usize,
    sharing: Vec<usize>,
    nodes: Vec<MeshEntity>,
    topology: CellTopology,
    elements: Vec<MeshEntity>,
}

/// Owned, per-process mesh view.
///
/// Offsets are handed out sequentially across all entity ranks.
#[derive(Clone, Debug, Default)]
pub struct InMemoryMesh {
    my_rank: usize,
    records: Vec<EntityRecord>,
    by_id: HashMap<(EntityRank, EntityId), u32>,
    parts: BTreeMap<String, BTreeSet<u32>>,
    nonconformal: Vec<(String, MeshEntity, MeshEntity)>,
    overset: Vec<(MeshEntity, MeshEntity)>,
}

impl InMemoryMesh {
    /// Empty mesh view for process `my_rank`.
    pub fn new(my_rank: usize) -> Self {
        Self {
            my_rank,
            ..Self::default()
        }
    }

    fn push(&mut self, mut rec: EntityRecord) -> Result<MeshEntity, LinSysError> {
        let key = (rec.rank, rec.entity.id());
        if self.by_id.contains_key(&key) {
            return Err(LinSysError::Configuration(format!(
                "duplicate {} {}",
                rec.rank,
                rec.entity.id()
            )));
        }
        let offset = u32::try_from(self.records.len())
            .map_err(|_| LinSysError::Configuration("offset space exhausted".into()))?;
        rec.entity = MeshEntity::new(rec.entity.id(), offset);
        if rec.rank == EntityRank::Node {
            rec.nodes = vec![rec.entity];
        }
        rec.sharing.retain(|&r| r != self.my_rank);
        rec.sharing.sort_unstable();
        rec.sharing.dedup();
        self.by_id.insert(key, offset);
        let e = rec.entity;
        self.records.push(rec);
        Ok(e)
    }

    fn resolve_nodes(&self, node_ids: &[u64]) -> Result<Vec<MeshEntity>, LinSysError> {
        node_ids
            .iter()
            .map(|&raw| {
                let id = EntityId::new(raw)?;
                self.entity(EntityRank::Node, id).ok_or_else(|| {
                    LinSysError::Configuration(format!("node {id} not declared"))
                })
            })
            .collect()
    }

    fn check_count(topology: CellTopology, nodes: &[MeshEntity]) -> Result<(), LinSysError> {
        if topology.num_nodes() != nodes.len() {
            return Err(LinSysError::Configuration(format!(
                "{topology:?} expects {} nodes, got {}",
                topology.num_nodes(),
                nodes.len()
            )));
        }
        Ok(())
    }

    /// Declare a node owned by `owner`. `sharing` lists every process holding
    /// it as shared, the owner included; the local rank is filtered out.
    pub fn add_node(
        &mut self,
        id: u64,
        owner: usize,
        sharing: &[usize],
    ) -> Result<MeshEntity, LinSysError> {
        let id = EntityId::new(id)?;
        self.push(EntityRecord {
            entity: MeshEntity::new(id, 0),
            rank: EntityRank::Node,
            owner,
            sharing: sharing.to_vec(),
            nodes: Vec::new(),
            topology: CellTopology::Particle,
            elements: Vec::new(),
        })
    }

    /// Declare an element over previously declared nodes.
    pub fn add_element(
        &mut self,
        id: u64,
        topology: CellTopology,
        node_ids: &[u64],
        owner: usize,
    ) -> Result<MeshEntity, LinSysError> {
        let nodes = self.resolve_nodes(node_ids)?;
        Self::check_count(topology, &nodes)?;
        self.push(EntityRecord {
            entity: MeshEntity::new(EntityId::new(id)?, 0),
            rank: EntityRank::Element,
            owner,
            sharing: Vec::new(),
            nodes,
            topology,
            elements: Vec::new(),
        })
    }

    /// Declare a face over nodes, attached to previously declared elements.
    pub fn add_face(
        &mut self,
        id: u64,
        topology: CellTopology,
        node_ids: &[u64],
        element_ids: &[u64],
        owner: usize,
    ) -> Result<MeshEntity, LinSysError> {
        let nodes = self.resolve_nodes(node_ids)?;
        Self::check_count(topology, &nodes)?;
        let elements = element_ids
            .iter()
            .map(|&raw| {
                let id = EntityId::new(raw)?;
                self.entity(EntityRank::Element, id).ok_or_else(|| {
                    LinSysError::Configuration(format!("element {id} not declared"))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        self.push(EntityRecord {
            entity: MeshEntity::new(EntityId::new(id)?, 0),
            rank: EntityRank::Face,
            owner,
            sharing: Vec::new(),
            nodes,
            topology,
            elements,
        })
    }

    /// Declare an edge between two nodes.
    pub fn add_edge(
        &mut self,
        id: u64,
        node_ids: [u64; 2],
        owner: usize,
    ) -> Result<MeshEntity, LinSysError> {
        let nodes = self.resolve_nodes(&node_ids)?;
        self.push(EntityRecord {
            entity: MeshEntity::new(EntityId::new(id)?, 0),
            rank: EntityRank::Edge,
            owner,
            sharing: Vec::new(),
            nodes,
            topology: CellTopology::Line2,
            elements: Vec::new(),
        })
    }

    /// Create an empty part.
    pub fn declare_part(&mut self, part: &str) {
        self.parts.entry(part.to_string()).or_default();
    }

    /// Put `e` into `part`, creating the part if needed.
    pub fn add_to_part(&mut self, part: &str, e: MeshEntity) {
        self.parts
            .entry(part.to_string())
            .or_default()
            .insert(e.offset() as u32);
    }

    /// Register a nonconformal coupling on `part`.
    pub fn add_nonconformal_coupling(
        &mut self,
        part: &str,
        current_elem: MeshEntity,
        opposing_elem: MeshEntity,
    ) {
        self.declare_part(part);
        self.nonconformal
            .push((part.to_string(), current_elem, opposing_elem));
    }

    /// Register an overset fringe node with its donor element.
    pub fn add_overset_constraint(&mut self, fringe: MeshEntity, donor_elem: MeshEntity) {
        self.overset.push((fringe, donor_elem));
    }

    fn record(&self, e: MeshEntity) -> &EntityRecord {
        &self.records[e.offset()]
    }
}

impl MeshTopology for InMemoryMesh {
    fn parallel_rank(&self) -> usize {
        self.my_rank
    }

    fn offset_capacity(&self) -> usize {
        self.records.len()
    }

    fn select(&self, parts: &[&str], rank: EntityRank) -> Result<Vec<MeshEntity>, LinSysError> {
        let mut out = Vec::new();
        for &part in parts {
            let members = self
                .parts
                .get(part)
                .ok_or_else(|| LinSysError::Configuration(format!("unknown part `{part}`")))?;
            out.extend(
                members
                    .iter()
                    .map(|&off| &self.records[off as usize])
                    .filter(|rec| rec.rank == rank)
                    .map(|rec| rec.entity),
            );
        }
        out.sort_unstable_by_key(|e| e.id());
        out.dedup();
        Ok(out)
    }

    fn entity(&self, rank: EntityRank, id: EntityId) -> Option<MeshEntity> {
        self.by_id
            .get(&(rank, id))
            .map(|&off| self.records[off as usize].entity)
    }

    fn owner_rank(&self, e: MeshEntity) -> usize {
        self.record(e).owner
    }

    fn sharing_ranks(&self, e: MeshEntity) -> &[usize] {
        &self.record(e).sharing
    }

    fn neighbor_ranks(&self) -> BTreeSet<usize> {
        self.records
            .iter()
            .filter(|rec| rec.rank == EntityRank::Node)
            .flat_map(|rec| rec.sharing.iter().copied())
            .collect()
    }

    fn nodes(&self, e: MeshEntity) -> &[MeshEntity] {
        &self.record(e).nodes
    }

    fn topology(&self, e: MeshEntity) -> CellTopology {
        self.record(e).topology
    }

    fn face_elements(&self, face: MeshEntity) -> &[MeshEntity] {
        &self.record(face).elements
    }

    fn nonconformal_couplings(
        &self,
        parts: &[&str],
    ) -> Result<Vec<(MeshEntity, MeshEntity)>, LinSysError> {
        for &part in parts {
            if !self.parts.contains_key(part) {
                return Err(LinSysError::Configuration(format!("unknown part `{part}`")));
            }
        }
        Ok(self
            .nonconformal
            .iter()
            .filter(|(part, ..)| parts.contains(&part.as_str()))
            .map(|&(_, a, b)| (a, b))
            .collect())
    }

    fn overset_constraints(&self) -> Vec<(MeshEntity, MeshEntity)> {
        self.overset.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets_are_sequential_and_lookup_works() {
        let mut mesh = InMemoryMesh::new(0);
        let a = mesh.add_node(10, 0, &[]).unwrap();
        let b = mesh.add_node(20, 1, &[0, 1]).unwrap();
        assert_eq!(a.offset(), 0);
        assert_eq!(b.offset(), 1);
        assert_eq!(
            mesh.entity(EntityRank::Node, EntityId::new(20).unwrap()),
            Some(b)
        );
        assert_eq!(mesh.sharing_ranks(b), &[1]);
        assert!(mesh.is_owned_or_shared(b));
        assert_eq!(mesh.neighbor_ranks().into_iter().collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn element_node_count_must_match_topology() {
        let mut mesh = InMemoryMesh::new(0);
        mesh.add_node(1, 0, &[]).unwrap();
        mesh.add_node(2, 0, &[]).unwrap();
        let err = mesh
            .add_element(1, CellTopology::Tri3, &[1, 2], 0)
            .unwrap_err();
        assert!(matches!(err, LinSysError::Configuration(_)));
    }

    #[test]
    fn unknown_part_is_configuration_error() {
        let mesh = InMemoryMesh::new(0);
        let err = mesh.select(&["nope"], EntityRank::Node).unwrap_err();
        assert!(matches!(err, LinSysError::Configuration(_)));
    }

    #[test]
    fn aura_node_is_not_owned_or_shared() {
        let mut mesh = InMemoryMesh::new(0);
        let ghost = mesh.add_node(5, 3, &[]).unwrap();
        assert!(!mesh.is_owned_or_shared(ghost));
    }
}
