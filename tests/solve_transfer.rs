use mesh_linsys::algs::communicator::NoComm;
use mesh_linsys::data::field::Field;
use mesh_linsys::linsys::{
    AssemblyState, LinearSolver, LinearSystem, LinearSystemConfig, RowClass, SolveOutcome,
    SolveProblem,
};
use mesh_linsys::topology::{
    CellTopology, DofStatus, EntityId, EntityRank, InMemoryMesh, MeshEntity, MeshTopology,
};
use mesh_linsys::{LinSysError, Stage};

fn quad_mesh(extra_node: bool) -> InMemoryMesh {
    let mut mesh = InMemoryMesh::new(0);
    for id in 1..=4 {
        mesh.add_node(id, 0, &[]).unwrap();
    }
    if extra_node {
        mesh.add_node(5, 0, &[]).unwrap();
    }
    let q = mesh
        .add_element(1, CellTopology::Quad4, &[1, 2, 3, 4], 0)
        .unwrap();
    mesh.add_to_part("block", q);
    mesh
}

fn node(mesh: &InMemoryMesh, id: u64) -> MeshEntity {
    mesh.entity(EntityRank::Node, EntityId::new(id).unwrap()).unwrap()
}

fn built(mesh: &InMemoryMesh, num_dof: usize) -> LinearSystem {
    let mut sys = LinearSystem::new(LinearSystemConfig::new("transfer", num_dof)).unwrap();
    sys.begin_construction();
    sys.build_elem_to_node_graph(mesh, &["block"]).unwrap();
    sys.complete_construction(mesh, &NoComm).unwrap();
    sys
}

fn fill_diagonal(sys: &mut LinearSystem, mesh: &InMemoryMesh) {
    let nd = sys.num_dof();
    let m = 4 * nd;
    let mut lhs = vec![0.0; m * m];
    for i in 0..m {
        lhs[i * m + i] = 2.0;
    }
    let rhs = vec![1.0; m];
    let q = mesh.select(&["block"], EntityRank::Element).unwrap()[0];
    sys.sum_into_vec(mesh.nodes(q), &rhs, &lhs, "quad").unwrap();
}

struct Jacobi;

impl LinearSolver for Jacobi {
    fn solve(&mut self, problem: &SolveProblem<'_>) -> Result<SolveOutcome, LinSysError> {
        let solution = problem
            .rhs
            .rows()
            .map(|r| {
                let d = problem
                    .matrix
                    .view()
                    .row_entries(r)
                    .find(|&(c, _)| problem.col_global_ids[c as usize] == problem.row_global_ids[r])
                    .map(|(_, v)| v)
                    .unwrap_or(1.0);
                problem.rhs.get(r).unwrap() / d
            })
            .collect();
        Ok(SolveOutcome {
            solution,
            iterations: 1,
            residual_norm: 0.0,
        })
    }
}

struct Diverging;

impl LinearSolver for Diverging {
    fn solve(&mut self, _problem: &SolveProblem<'_>) -> Result<SolveOutcome, LinSysError> {
        Err(LinSysError::SolveFailure {
            reason: "no convergence after 0 iterations".into(),
        })
    }
}

struct ShortAnswer;

impl LinearSolver for ShortAnswer {
    fn solve(&mut self, _problem: &SolveProblem<'_>) -> Result<SolveOutcome, LinSysError> {
        Ok(SolveOutcome::default())
    }
}

#[test]
fn field_vector_round_trip_is_exact() {
    let mesh = quad_mesh(false);
    let sys = built(&mesh, 3);
    let mut src = Field::new("v", mesh.offset_capacity(), 3);
    for id in 1..=4u64 {
        let x = id as f64;
        src.set(node(&mesh, id), &[x / 3.0, -x * 1e-17, x.sqrt()]).unwrap();
    }
    let vec = sys.copy_field_to_vector(&src).unwrap();
    assert_eq!(vec.len(), 12);
    let mut dst = Field::new("v", mesh.offset_capacity(), 3);
    sys.copy_vector_to_field(&vec, &mut dst).unwrap();
    for id in 1..=4u64 {
        let n = node(&mesh, id);
        assert_eq!(dst.get(n).unwrap(), src.get(n).unwrap());
    }
}

#[test]
fn field_width_must_match_num_dof() {
    let mesh = quad_mesh(false);
    let sys = built(&mesh, 2);
    let scalar = Field::new("p", mesh.offset_capacity(), 1);
    assert!(matches!(
        sys.copy_field_to_vector(&scalar),
        Err(LinSysError::BlockSizeMismatch { stage: Stage::Transfer, expected: 2, got: 1 })
    ));
}

#[test]
fn full_cycle_solves_and_copies_back() {
    let mesh = quad_mesh(false);
    let mut sys = built(&mesh, 1);
    assert_eq!(sys.state(), AssemblyState::GraphBuilt);
    sys.zero_system().unwrap();
    fill_diagonal(&mut sys, &mesh);
    assert_eq!(sys.state(), AssemblyState::Assembling);
    let summary = sys.finalize_linear_system(&NoComm).unwrap();
    assert_eq!(summary.sent, 0);
    assert_eq!(sys.state(), AssemblyState::Finalized);

    let mut u = Field::new("u", mesh.offset_capacity(), 1);
    let out = sys.solve(&mut Jacobi, &mut u, &NoComm).unwrap();
    assert_eq!(out.iterations, 1);
    assert_eq!(out.synced_values, 0);
    for id in 1..=4 {
        assert_eq!(u.get(node(&mesh, id)).unwrap(), &[0.5]);
    }
}

#[test]
fn solve_requires_finalize() {
    let mesh = quad_mesh(false);
    let mut sys = built(&mesh, 1);
    fill_diagonal(&mut sys, &mesh);
    let mut u = Field::new("u", mesh.offset_capacity(), 1);
    assert!(matches!(
        sys.solve(&mut Jacobi, &mut u, &NoComm),
        Err(LinSysError::InvalidState { stage: Stage::Solve, expected: "finalized", found: "assembling" })
    ));
}

#[test]
fn second_finalize_without_writes_is_rejected() {
    let mesh = quad_mesh(false);
    let mut sys = built(&mesh, 1);
    fill_diagonal(&mut sys, &mesh);
    sys.finalize_linear_system(&NoComm).unwrap();
    assert!(matches!(
        sys.load_complete(&NoComm),
        Err(LinSysError::InvalidState { stage: Stage::Export, .. })
    ));
    // a new write re-opens the cycle
    sys.zero_system().unwrap();
    sys.finalize_linear_system(&NoComm).unwrap();
}

#[test]
fn solver_failure_is_surfaced_once() {
    let mesh = quad_mesh(false);
    let mut sys = built(&mesh, 1);
    fill_diagonal(&mut sys, &mesh);
    sys.finalize_linear_system(&NoComm).unwrap();
    let mut u = Field::new("u", mesh.offset_capacity(), 1);
    u.fill(7.0);
    let err = sys.solve(&mut Diverging, &mut u, &NoComm).unwrap_err();
    assert!(matches!(err, LinSysError::SolveFailure { .. }));
    assert!(err.to_string().contains("no convergence"));
    // nothing was copied back
    assert!(u.as_slice().iter().all(|&v| v == 7.0));
    assert!(matches!(
        sys.solve(&mut ShortAnswer, &mut u, &NoComm),
        Err(LinSysError::BlockSizeMismatch { stage: Stage::Solve, expected: 4, got: 0 })
    ));
}

#[test]
fn zero_system_keeps_structure() {
    let mesh = quad_mesh(false);
    let mut sys = built(&mesh, 2);
    fill_diagonal(&mut sys, &mesh);
    let graph_before = sys.owned_matrix().graph().col_lids().to_vec();
    sys.zero_system().unwrap();
    assert!(sys.owned_matrix().values_snapshot().iter().all(|&v| v == 0.0));
    assert!(sys.owned_rhs().values_snapshot().iter().all(|&v| v == 0.0));
    assert!(sys.shared_not_owned_matrix().values_snapshot().iter().all(|&v| v == 0.0));
    assert_eq!(sys.owned_matrix().graph().col_lids(), &graph_before[..]);
    assert_eq!(sys.owned_matrix().graph().nnz(), 4 * 4 * 2 * 2);
}

#[test]
fn rebuild_invalidates_stale_ids() {
    let mesh = quad_mesh(true);
    let mut sys = built(&mesh, 1);
    let n1 = node(&mesh, 1);
    let n5 = node(&mesh, 5);
    assert_eq!(sys.row_lid(n1), Some(0));
    assert_eq!(sys.get_dof_status(n5), DofStatus::Absent);

    sys.begin_construction();
    assert_eq!(sys.state(), AssemblyState::Unbuilt);
    assert_eq!(sys.row_lid(n1), None);
    assert_eq!(sys.col_lid(n1), None);
    assert_eq!(sys.get_dof_status(n1), DofStatus::Absent);
    assert!(matches!(sys.zero_system(), Err(LinSysError::InvalidState { .. })));

    sys.build_elem_to_node_graph(&mesh, &["block"]).unwrap();
    sys.complete_construction(&mesh, &NoComm).unwrap();
    assert_eq!(sys.row_lid(n1), Some(0));
}

#[test]
fn graph_builders_require_begin_construction() {
    let mesh = quad_mesh(false);
    let mut sys = LinearSystem::new(LinearSystemConfig::new("early", 1)).unwrap();
    assert!(matches!(
        sys.build_node_graph(&mesh, &["block"]),
        Err(LinSysError::InvalidState { stage: Stage::Connectivity, .. })
    ));
    assert!(matches!(
        sys.complete_construction(&mesh, &NoComm),
        Err(LinSysError::InvalidState { .. })
    ));
}

#[test]
fn diagnostics_list_every_entry() {
    let mesh = quad_mesh(false);
    let mut sys = built(&mesh, 1);
    sys.zero_system().unwrap();
    assert_eq!(sys.check_for_zero_rows(), vec![0, 1, 2, 3]);
    fill_diagonal(&mut sys, &mesh);
    assert!(sys.check_for_zero_rows().is_empty());

    let mut out = Vec::new();
    sys.write_matrix(&mut out, RowClass::Owned).unwrap();
    let text = String::from_utf8(out).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert!(lines[0].starts_with("% transfer Owned rows=4 nnz=16"));
    assert_eq!(lines.len(), 17);
    assert!(lines.contains(&"2 2 2.0000000000000000e0"));

    let mut out = Vec::new();
    sys.write_rhs(&mut out, RowClass::SharedNotOwned).unwrap();
    assert_eq!(String::from_utf8(out).unwrap().lines().count(), 1);
    sys.print_info();
}

#[test]
fn solution_listing_is_keyed_by_global_dof() {
    let mesh = quad_mesh(true);
    let sys = built(&mesh, 2);
    let mut u = Field::new("u", mesh.offset_capacity(), 2);
    for id in 1..=5u64 {
        u.set(node(&mesh, id), &[id as f64, -(id as f64)]).unwrap();
    }
    let mut out = Vec::new();
    sys.write_solution(&mut out, &u).unwrap();
    let text = String::from_utf8(out).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines[0], "% transfer solution u rows=8");
    // node 5 has no row and is not listed
    assert_eq!(lines.len(), 9);
    assert_eq!(lines[1], "0 1.0000000000000000e0");
    assert_eq!(lines[8], "7 -4.0000000000000000e0");

    let scalar = Field::new("p", mesh.offset_capacity(), 1);
    assert!(matches!(
        sys.write_solution(Vec::new(), &scalar),
        Err(LinSysError::BlockSizeMismatch { stage: Stage::Transfer, expected: 2, got: 1 })
    ));
}
