//! Stencil enumeration: which row entity couples to which column entity.
//!
//! Each `build_*` walks one kind of mesh entity in the selected parts and
//! appends `(row node, column node)` [`Connection`]s to a shared
//! [`ConnectionList`]. Duplicates are expected (neighboring elements share
//! nodes); graph assembly deduplicates. Rows on aura-only nodes are dropped
//! here, since the local process holds no row for them.
//!
//! Element-based stencils visit locally owned elements only, so a coupling
//! inside an element is contributed exactly once across all processes.

use log::debug;

use crate::linsys_error::LinSysError;
use crate::topology::entity::{EntityRank, MeshEntity};
use crate::topology::mesh::MeshTopology;

/// One structural nonzero block.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Connection {
    pub row: MeshEntity,
    pub col: MeshEntity,
}

/// Connections gathered since the last `clear`.
#[derive(Clone, Debug, Default)]
pub struct ConnectionList {
    connections: Vec<Connection>,
}

impl ConnectionList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.connections.clear();
    }

    pub fn push(&mut self, row: MeshEntity, col: MeshEntity) {
        self.connections.push(Connection { row, col });
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Connection> {
        self.connections.iter()
    }

    pub fn as_slice(&self) -> &[Connection] {
        &self.connections
    }
}

impl<'a> IntoIterator for &'a ConnectionList {
    type Item = &'a Connection;
    type IntoIter = std::slice::Iter<'a, Connection>;
    fn into_iter(self) -> Self::IntoIter {
        self.connections.iter()
    }
}

/// All ordered pairs over `nodes`, rows restricted to owned or shared nodes.
fn push_all_pairs<M>(mesh: &M, nodes: &[MeshEntity], list: &mut ConnectionList)
where
    M: MeshTopology + ?Sized,
{
    for &row in nodes {
        if !mesh.is_owned_or_shared(row) {
            continue;
        }
        for &col in nodes {
            list.push(row, col);
        }
    }
}

fn checked_nodes<'m, M>(mesh: &'m M, e: MeshEntity) -> Result<&'m [MeshEntity], LinSysError>
where
    M: MeshTopology + ?Sized,
{
    let nodes = mesh.nodes(e);
    let topo = mesh.topology(e);
    if nodes.len() != topo.num_nodes() {
        return Err(LinSysError::Configuration(format!(
            "entity {e}: {topo:?} expects {} nodes, mesh reports {}",
            topo.num_nodes(),
            nodes.len()
        )));
    }
    Ok(nodes)
}

fn locally_owned<M>(mesh: &M, parts: &[&str], rank: EntityRank) -> Result<Vec<MeshEntity>, LinSysError>
where
    M: MeshTopology + ?Sized,
{
    let me = mesh.parallel_rank();
    let mut es = mesh.select(parts, rank)?;
    es.retain(|&e| mesh.owner_rank(e) == me);
    Ok(es)
}

/// Every owned or shared node couples to itself.
pub fn build_node_graph<M>(mesh: &M, parts: &[&str], list: &mut ConnectionList) -> Result<(), LinSysError>
where
    M: MeshTopology + ?Sized,
{
    let before = list.len();
    for n in mesh.select(parts, EntityRank::Node)? {
        if mesh.is_owned_or_shared(n) {
            list.push(n, n);
        }
    }
    debug!("node graph: {} connections", list.len() - before);
    Ok(())
}

fn build_connected_node_graph<M>(
    mesh: &M,
    parts: &[&str],
    rank: EntityRank,
    list: &mut ConnectionList,
) -> Result<(), LinSysError>
where
    M: MeshTopology + ?Sized,
{
    let before = list.len();
    for e in locally_owned(mesh, parts, rank)? {
        let nodes = checked_nodes(mesh, e)?;
        push_all_pairs(mesh, nodes, list);
    }
    debug!("{rank}-to-node graph: {} connections", list.len() - before);
    Ok(())
}

/// Every edge couples all of its nodes.
pub fn build_edge_to_node_graph<M>(mesh: &M, parts: &[&str], list: &mut ConnectionList) -> Result<(), LinSysError>
where
    M: MeshTopology + ?Sized,
{
    build_connected_node_graph(mesh, parts, EntityRank::Edge, list)
}

/// Every face couples all of its nodes.
pub fn build_face_to_node_graph<M>(mesh: &M, parts: &[&str], list: &mut ConnectionList) -> Result<(), LinSysError>
where
    M: MeshTopology + ?Sized,
{
    build_connected_node_graph(mesh, parts, EntityRank::Face, list)
}

/// Every element couples all of its nodes.
pub fn build_elem_to_node_graph<M>(mesh: &M, parts: &[&str], list: &mut ConnectionList) -> Result<(), LinSysError>
where
    M: MeshTopology + ?Sized,
{
    build_connected_node_graph(mesh, parts, EntityRank::Element, list)
}

/// Nearest nodes only: each element node couples to itself and to the nodes
/// it shares a cell edge with.
///
/// # Errors
/// `Configuration` for topologies without an edge table.
pub fn build_reduced_elem_to_node_graph<M>(
    mesh: &M,
    parts: &[&str],
    list: &mut ConnectionList,
) -> Result<(), LinSysError>
where
    M: MeshTopology + ?Sized,
{
    let before = list.len();
    for e in locally_owned(mesh, parts, EntityRank::Element)? {
        let nodes = checked_nodes(mesh, e)?;
        let topo = mesh.topology(e);
        let edges = topo.edge_pairs().ok_or_else(|| {
            LinSysError::Configuration(format!(
                "element {e}: {topo:?} has no edge table for the reduced stencil"
            ))
        })?;
        for &n in nodes {
            if mesh.is_owned_or_shared(n) {
                list.push(n, n);
            }
        }
        for &(a, b) in edges {
            let (na, nb) = (nodes[a as usize], nodes[b as usize]);
            if mesh.is_owned_or_shared(na) {
                list.push(na, nb);
            }
            if mesh.is_owned_or_shared(nb) {
                list.push(nb, na);
            }
        }
    }
    debug!("reduced element graph: {} connections", list.len() - before);
    Ok(())
}

/// Every face couples the nodes of each element attached to it.
pub fn build_face_elem_to_node_graph<M>(
    mesh: &M,
    parts: &[&str],
    list: &mut ConnectionList,
) -> Result<(), LinSysError>
where
    M: MeshTopology + ?Sized,
{
    let before = list.len();
    for face in locally_owned(mesh, parts, EntityRank::Face)? {
        for &elem in mesh.face_elements(face) {
            let nodes = checked_nodes(mesh, elem)?;
            push_all_pairs(mesh, nodes, list);
        }
    }
    debug!("face-element graph: {} connections", list.len() - before);
    Ok(())
}

fn union_nodes<M>(mesh: &M, groups: &[MeshEntity]) -> Result<Vec<MeshEntity>, LinSysError>
where
    M: MeshTopology + ?Sized,
{
    let mut nodes = Vec::new();
    for &g in groups {
        nodes.extend_from_slice(checked_nodes(mesh, g)?);
    }
    nodes.sort_unstable();
    nodes.dedup();
    Ok(nodes)
}

/// Each nonconformal coupling joins all nodes of both elements.
pub fn build_nonconformal_node_graph<M>(
    mesh: &M,
    parts: &[&str],
    list: &mut ConnectionList,
) -> Result<(), LinSysError>
where
    M: MeshTopology + ?Sized,
{
    let before = list.len();
    for (current, opposing) in mesh.nonconformal_couplings(parts)? {
        let nodes = union_nodes(mesh, &[current, opposing])?;
        push_all_pairs(mesh, &nodes, list);
    }
    debug!("nonconformal graph: {} connections", list.len() - before);
    Ok(())
}

/// Each overset fringe node in `parts` couples with its donor element's nodes.
pub fn build_overset_node_graph<M>(
    mesh: &M,
    parts: &[&str],
    list: &mut ConnectionList,
) -> Result<(), LinSysError>
where
    M: MeshTopology + ?Sized,
{
    let before = list.len();
    let in_parts = mesh.select(parts, EntityRank::Node)?;
    for (fringe, donor) in mesh.overset_constraints() {
        if in_parts.binary_search_by_key(&fringe.id(), |n| n.id()).is_err() {
            continue;
        }
        let mut nodes = checked_nodes(mesh, donor)?.to_vec();
        nodes.push(fringe);
        nodes.sort_unstable();
        nodes.dedup();
        push_all_pairs(mesh, &nodes, list);
    }
    debug!("overset graph: {} connections", list.len() - before);
    Ok(())
}
