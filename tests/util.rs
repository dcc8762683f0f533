#![allow(dead_code)]
use std::collections::BTreeMap;

use mesh_linsys::{
    algs::communicator::{Communicator, RayonComm},
    linsys::{LinearSystem, LinearSystemConfig},
    topology::{CellTopology, EntityId, EntityRank, InMemoryMesh, MeshEntity, MeshTopology},
};

pub fn node(mesh: &InMemoryMesh, id: u64) -> MeshEntity {
    mesh.entity(EntityRank::Node, EntityId::new(id).unwrap())
        .unwrap()
}

/// Run `f` once per rank on its own thread, results in rank order.
pub fn run_ranks<R, F>(size: usize, f: F) -> Vec<R>
where
    R: Send,
    F: Fn(RayonComm) -> R + Sync,
{
    std::thread::scope(|s| {
        let handles: Vec<_> = (0..size)
            .map(|r| {
                let f = &f;
                s.spawn(move || f(RayonComm::new(r, size)))
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    })
}

/// Owned matrix entries keyed by `(row gdof, col gdof)`.
pub fn owned_triples(sys: &LinearSystem) -> BTreeMap<(u64, u64), f64> {
    let a = sys.owned_matrix();
    let view = a.view();
    let mut out = BTreeMap::new();
    for row in a.graph().rows() {
        let r = sys.row_global_dof_ids()[row];
        for (col, v) in view.row_entries(row) {
            out.insert((r, sys.col_global_dof_ids()[col as usize]), v);
        }
    }
    out
}

/// Owned rhs keyed by row gdof.
pub fn owned_rhs(sys: &LinearSystem) -> BTreeMap<u64, f64> {
    let b = sys.owned_rhs();
    b.rows()
        .map(|row| (sys.row_global_dof_ids()[row], b.get(row).unwrap()))
        .collect()
}

/// `k · [[2, -1], [-1, 2]]` and rhs `[k, 10k]` for element `k`.
pub fn line_block(k: u64) -> (Vec<f64>, Vec<f64>) {
    let k = k as f64;
    (vec![2.0 * k, -k, -k, 2.0 * k], vec![k, 10.0 * k])
}

/// Five-node chain `1-2-3-4-5` of four Line2 elements, element `k`
/// joining nodes `k` and `k+1`. Split over two ranks:
///
/// | rank | nodes owned | elements owned |
/// |------|-------------|----------------|
/// | 0    | 1, 2, 3     | 1, 3           |
/// | 1    | 4, 5        | 2, 4           |
///
/// Nodes 2, 3 and 4 are shared by both ranks.
pub fn chain_rank_mesh(rank: usize) -> InMemoryMesh {
    let mut mesh = InMemoryMesh::new(rank);
    let (node_ids, elems): (&[u64], &[u64]) = match rank {
        0 => (&[1, 2, 3, 4], &[1, 3]),
        _ => (&[2, 3, 4, 5], &[2, 4]),
    };
    for &id in node_ids {
        let owner = if id <= 3 { 0 } else { 1 };
        let sharing: &[usize] = if (2..=4).contains(&id) { &[0, 1] } else { &[] };
        mesh.add_node(id, owner, sharing).unwrap();
    }
    mesh.declare_part("block");
    for &k in elems {
        let e = mesh
            .add_element(k, CellTopology::Line2, &[k, k + 1], rank)
            .unwrap();
        mesh.add_to_part("block", e);
    }
    mesh
}

/// The same chain held entirely by rank 0.
pub fn chain_serial_mesh() -> InMemoryMesh {
    let mut mesh = InMemoryMesh::new(0);
    for id in 1..=5 {
        mesh.add_node(id, 0, &[]).unwrap();
    }
    for k in 1..=4 {
        let e = mesh
            .add_element(k, CellTopology::Line2, &[k, k + 1], 0)
            .unwrap();
        mesh.add_to_part("block", e);
    }
    mesh
}

/// Build the element graph and sum `line_block(k)` for every locally owned
/// element, without finalizing.
pub fn assemble_chain<C: Communicator>(
    mesh: &InMemoryMesh,
    comm: &C,
    config: LinearSystemConfig,
) -> LinearSystem {
    let mut sys = LinearSystem::new(config).unwrap();
    sys.begin_construction();
    sys.build_elem_to_node_graph(mesh, &["block"]).unwrap();
    sys.complete_construction(mesh, comm).unwrap();
    sys.zero_system().unwrap();
    for e in mesh.select(&["block"], EntityRank::Element).unwrap() {
        if mesh.owner_rank(e) != mesh.parallel_rank() {
            continue;
        }
        let (lhs, rhs) = line_block(e.id().get());
        sys.sum_into_vec(mesh.nodes(e), &rhs, &lhs, "chain").unwrap();
    }
    sys
}
