//! The orchestrating linear-system object.
//!
//! Lifecycle per topology change:
//! `begin_construction` → `build_*_graph`… → `complete_construction`.
//! Per assembly cycle:
//! `zero_system` → `coeff_applier`/`sum_into_vec` → Dirichlet/reset →
//! `finalize_linear_system` → `solve`.
//!
//! [`AssemblyState`] tracks where in that cycle the system is; operations
//! called out of order fail with `InvalidState` instead of producing a
//! silently inconsistent system.

use std::fmt;

use log::debug;

use crate::algs::communicator::Communicator;
use crate::algs::connectivity::{self, ConnectionList};
use crate::algs::export::{ExportSummary, ExportTargets, export_shared_not_owned};
use crate::algs::graph_assembly::assemble_graph;
use crate::data::local_id_map::{ColumnMap, RowMap};
use crate::data::matrix::{DistributedMatrix, DistributedVector};
use crate::linsys::coeff_applier::{CoeffApplier, EntityList};
use crate::linsys::config::LinearSystemConfig;
use crate::linsys_error::{LinSysError, Stage};
use crate::topology::entity::{MeshEntity, global_dof_id};
use crate::topology::mesh::MeshTopology;
use crate::topology::ownership::{DofStatus, EntityOwnership, ProcessTopology};

/// Position in the assembly cycle.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum AssemblyState {
    /// No graph yet, or a rebuild is in progress.
    Unbuilt,
    /// Graph and containers allocated, nothing assembled.
    GraphBuilt,
    /// Values are being written.
    Assembling,
    /// Exported; the owned pair is ready to solve.
    Finalized,
}

impl AssemblyState {
    pub const fn as_str(self) -> &'static str {
        match self {
            AssemblyState::Unbuilt => "unbuilt",
            AssemblyState::GraphBuilt => "graph built",
            AssemblyState::Assembling => "assembling",
            AssemblyState::Finalized => "finalized",
        }
    }
}

impl fmt::Display for AssemblyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Distributed sparse linear system for one equation set.
#[derive(Debug)]
pub struct LinearSystem {
    pub(super) config: LinearSystemConfig,
    pub(super) state: AssemblyState,
    constructing: bool,
    connections: ConnectionList,
    pub(super) process: ProcessTopology,
    pub(super) rows: RowMap,
    pub(super) cols: ColumnMap,
    pub(super) ownership: EntityOwnership,
    pub(super) owned_lhs: DistributedMatrix,
    pub(super) owned_rhs: DistributedVector,
    pub(super) sno_lhs: DistributedMatrix,
    pub(super) sno_rhs: DistributedVector,
    pub(super) row_dof_gids: Vec<u64>,
    pub(super) col_dof_gids: Vec<u64>,
    scratch_ids: Vec<u32>,
    scratch_perm: Vec<usize>,
}

impl LinearSystem {
    /// # Errors
    /// `Configuration` if the config does not validate.
    pub fn new(config: LinearSystemConfig) -> Result<Self, LinSysError> {
        config.validate()?;
        let num_dof = config.num_dof;
        Ok(Self {
            config,
            state: AssemblyState::Unbuilt,
            constructing: false,
            connections: ConnectionList::new(),
            process: ProcessTopology::new(0, []),
            rows: RowMap::new(num_dof),
            cols: ColumnMap::default(),
            ownership: EntityOwnership::default(),
            owned_lhs: DistributedMatrix::default(),
            owned_rhs: DistributedVector::default(),
            sno_lhs: DistributedMatrix::default(),
            sno_rhs: DistributedVector::default(),
            row_dof_gids: Vec::new(),
            col_dof_gids: Vec::new(),
            scratch_ids: Vec::new(),
            scratch_perm: Vec::new(),
        })
    }

    pub fn config(&self) -> &LinearSystemConfig {
        &self.config
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn num_dof(&self) -> usize {
        self.config.num_dof
    }

    pub fn state(&self) -> AssemblyState {
        self.state
    }

    pub(super) fn invalid_state(&self, stage: Stage, expected: &'static str) -> LinSysError {
        LinSysError::InvalidState {
            stage,
            expected,
            found: self.state.as_str(),
        }
    }

    /// Fails unless a graph has been built.
    pub(super) fn require_graph(&self, stage: Stage) -> Result<(), LinSysError> {
        if self.state == AssemblyState::Unbuilt {
            return Err(self.invalid_state(stage, "a built graph"));
        }
        Ok(())
    }

    /// Any value mutation re-opens the assembly cycle.
    pub(super) fn mark_assembling(&mut self, stage: Stage) -> Result<(), LinSysError> {
        self.require_graph(stage)?;
        self.state = AssemblyState::Assembling;
        Ok(())
    }

    // ----- construction -----------------------------------------------------

    /// Start a rebuild: drop gathered connections and invalidate every local id.
    pub fn begin_construction(&mut self) {
        self.connections.clear();
        self.rows.begin_epoch(0);
        self.cols.begin_epoch(0);
        self.state = AssemblyState::Unbuilt;
        self.constructing = true;
    }

    fn require_constructing(&self) -> Result<(), LinSysError> {
        if !self.constructing {
            return Err(LinSysError::InvalidState {
                stage: Stage::Connectivity,
                expected: "begin_construction",
                found: self.state.as_str(),
            });
        }
        Ok(())
    }

    /// Connections gathered so far in the current construction.
    pub fn connections(&self) -> &ConnectionList {
        &self.connections
    }

    pub fn build_node_graph<M>(&mut self, mesh: &M, parts: &[&str]) -> Result<(), LinSysError>
    where
        M: MeshTopology + ?Sized,
    {
        self.require_constructing()?;
        connectivity::build_node_graph(mesh, parts, &mut self.connections)
    }

    pub fn build_edge_to_node_graph<M>(&mut self, mesh: &M, parts: &[&str]) -> Result<(), LinSysError>
    where
        M: MeshTopology + ?Sized,
    {
        self.require_constructing()?;
        connectivity::build_edge_to_node_graph(mesh, parts, &mut self.connections)
    }

    pub fn build_face_to_node_graph<M>(&mut self, mesh: &M, parts: &[&str]) -> Result<(), LinSysError>
    where
        M: MeshTopology + ?Sized,
    {
        self.require_constructing()?;
        connectivity::build_face_to_node_graph(mesh, parts, &mut self.connections)
    }

    pub fn build_elem_to_node_graph<M>(&mut self, mesh: &M, parts: &[&str]) -> Result<(), LinSysError>
    where
        M: MeshTopology + ?Sized,
    {
        self.require_constructing()?;
        connectivity::build_elem_to_node_graph(mesh, parts, &mut self.connections)
    }

    pub fn build_reduced_elem_to_node_graph<M>(
        &mut self,
        mesh: &M,
        parts: &[&str],
    ) -> Result<(), LinSysError>
    where
        M: MeshTopology + ?Sized,
    {
        self.require_constructing()?;
        connectivity::build_reduced_elem_to_node_graph(mesh, parts, &mut self.connections)
    }

    pub fn build_face_elem_to_node_graph<M>(
        &mut self,
        mesh: &M,
        parts: &[&str],
    ) -> Result<(), LinSysError>
    where
        M: MeshTopology + ?Sized,
    {
        self.require_constructing()?;
        connectivity::build_face_elem_to_node_graph(mesh, parts, &mut self.connections)
    }

    pub fn build_nonconformal_node_graph<M>(
        &mut self,
        mesh: &M,
        parts: &[&str],
    ) -> Result<(), LinSysError>
    where
        M: MeshTopology + ?Sized,
    {
        self.require_constructing()?;
        connectivity::build_nonconformal_node_graph(mesh, parts, &mut self.connections)
    }

    pub fn build_overset_node_graph<M>(&mut self, mesh: &M, parts: &[&str]) -> Result<(), LinSysError>
    where
        M: MeshTopology + ?Sized,
    {
        self.require_constructing()?;
        connectivity::build_overset_node_graph(mesh, parts, &mut self.connections)
    }

    /// Number rows and columns, run the two graph rounds with the mesh's
    /// neighbors, and reallocate all containers.
    ///
    /// # Errors
    /// `InvalidState` without a preceding `begin_construction`,
    /// `Configuration` if the communicator and mesh disagree on the rank,
    /// plus anything graph assembly reports.
    pub fn complete_construction<M, C>(&mut self, mesh: &M, comm: &C) -> Result<(), LinSysError>
    where
        M: MeshTopology + ?Sized,
        C: Communicator,
    {
        self.require_constructing()?;
        self.constructing = false;
        if comm.rank() != mesh.parallel_rank() {
            return Err(LinSysError::Configuration(format!(
                "communicator rank {} differs from mesh rank {}",
                comm.rank(),
                mesh.parallel_rank()
            )));
        }

        self.process = ProcessTopology::from_mesh(mesh);
        self.rows.begin_epoch(mesh.offset_capacity());
        self.cols.begin_epoch(mesh.offset_capacity());
        let graphs = assemble_graph(
            comm,
            mesh,
            &self.process,
            &self.connections,
            self.config.tags(),
            &mut self.rows,
            &mut self.cols,
            self.config.check_invariants,
        )?;

        let nd = self.num_dof();
        let max_owned = self.rows.max_owned_row_id();
        let max_sno = self.rows.max_shared_not_owned_row_id();
        self.ownership = graphs.ownership;
        self.owned_lhs = DistributedMatrix::new(graphs.owned);
        self.owned_rhs = DistributedVector::new(0..max_owned);
        self.sno_lhs = DistributedMatrix::new(graphs.shared_not_owned);
        self.sno_rhs = DistributedVector::new(max_owned..max_sno);

        self.row_dof_gids = self.rows.entities()[..self.rows.n_owned()]
            .iter()
            .flat_map(|e| (0..nd).map(move |d| global_dof_id(e.id(), nd, d)))
            .collect();
        self.col_dof_gids = (0..self.cols.len() as u32)
            .filter_map(|c| self.cols.gid(c))
            .flat_map(|id| (0..nd).map(move |d| global_dof_id(id, nd, d)))
            .collect();

        self.state = AssemblyState::GraphBuilt;
        debug!(
            "{}: construction complete, {} owned / {} shared rows, {} neighbors",
            self.name(),
            self.rows.n_owned(),
            self.rows.n_shared_not_owned(),
            self.process.neighbors.len()
        );
        Ok(())
    }

    // ----- queries ----------------------------------------------------------

    pub fn get_dof_status(&self, e: MeshEntity) -> DofStatus {
        self.rows.status(e)
    }

    /// Block row id of `e`.
    pub fn row_lid(&self, e: MeshEntity) -> Option<u32> {
        self.rows.lid(e)
    }

    /// Block column id of `e`.
    pub fn col_lid(&self, e: MeshEntity) -> Option<u32> {
        self.cols.lid(e)
    }

    pub fn max_owned_row_id(&self) -> usize {
        self.rows.max_owned_row_id()
    }

    pub fn max_shared_not_owned_row_id(&self) -> usize {
        self.rows.max_shared_not_owned_row_id()
    }

    pub fn row_map(&self) -> &RowMap {
        &self.rows
    }

    pub fn column_map(&self) -> &ColumnMap {
        &self.cols
    }

    pub fn ownership(&self) -> &EntityOwnership {
        &self.ownership
    }

    pub fn process(&self) -> &ProcessTopology {
        &self.process
    }

    pub fn owned_matrix(&self) -> &DistributedMatrix {
        &self.owned_lhs
    }

    pub fn owned_rhs(&self) -> &DistributedVector {
        &self.owned_rhs
    }

    pub fn shared_not_owned_matrix(&self) -> &DistributedMatrix {
        &self.sno_lhs
    }

    pub fn shared_not_owned_rhs(&self) -> &DistributedVector {
        &self.sno_rhs
    }

    /// Global dof ids of the owned rows, in local row order.
    pub fn row_global_dof_ids(&self) -> &[u64] {
        &self.row_dof_gids
    }

    /// Global dof ids of all local columns, in local column order.
    pub fn col_global_dof_ids(&self) -> &[u64] {
        &self.col_dof_gids
    }

    // ----- assembly ---------------------------------------------------------

    /// Reset every numeric entry; structure is kept.
    pub fn zero_system(&mut self) -> Result<(), LinSysError> {
        self.mark_assembling(Stage::Assembly)?;
        self.owned_lhs.zero();
        self.owned_rhs.zero();
        self.sno_lhs.zero();
        self.sno_rhs.zero();
        Ok(())
    }

    /// Shared assembly handle. The system cannot be rebuilt or finalized
    /// while it is alive.
    pub fn coeff_applier(&mut self) -> Result<CoeffApplier<'_>, LinSysError> {
        self.mark_assembling(Stage::Assembly)?;
        Ok(CoeffApplier::new(
            &self.rows,
            &self.cols,
            (self.owned_lhs.view(), self.owned_rhs.view()),
            (self.sno_lhs.view(), self.sno_rhs.view()),
        ))
    }

    /// `sum_into` with scratch owned by the system, grown as needed.
    pub fn sum_into_vec<E>(
        &mut self,
        entities: &E,
        rhs: &[f64],
        lhs: &[f64],
        trace_tag: &str,
    ) -> Result<(), LinSysError>
    where
        E: EntityList + ?Sized,
    {
        self.mark_assembling(Stage::Assembly)?;
        let m = entities.len() * self.num_dof();
        if self.scratch_ids.len() < m {
            self.scratch_ids.resize(m, 0);
            self.scratch_perm.resize(m, 0);
        }
        let applier = CoeffApplier::new(
            &self.rows,
            &self.cols,
            (self.owned_lhs.view(), self.owned_rhs.view()),
            (self.sno_lhs.view(), self.sno_rhs.view()),
        );
        applier.sum_into(
            entities,
            rhs,
            lhs,
            &mut self.scratch_ids,
            &mut self.scratch_perm,
            trace_tag,
        )
    }

    // ----- finalize ---------------------------------------------------------

    /// Export shared-not-owned contributions to their owners. Must run once
    /// per cycle, after all writes and before `solve`.
    ///
    /// # Errors
    /// `InvalidState` if the graph is missing or the system is already
    /// finalized with no write since.
    pub fn finalize_linear_system<C: Communicator>(&mut self, comm: &C) -> Result<ExportSummary, LinSysError> {
        match self.state {
            AssemblyState::GraphBuilt | AssemblyState::Assembling => {}
            _ => return Err(self.invalid_state(Stage::Export, "graph built or assembling")),
        }
        let summary = export_shared_not_owned(
            comm,
            &self.process,
            self.config.tags().export,
            &self.rows,
            &self.cols,
            &self.ownership,
            ExportTargets {
                owned_matrix: &self.owned_lhs,
                owned_rhs: &self.owned_rhs,
                sno_matrix: &mut self.sno_lhs,
                sno_rhs: &mut self.sno_rhs,
            },
        )?;
        self.state = AssemblyState::Finalized;
        Ok(summary)
    }

    /// Alias of [`Self::finalize_linear_system`].
    pub fn load_complete<C: Communicator>(&mut self, comm: &C) -> Result<ExportSummary, LinSysError> {
        self.finalize_linear_system(comm)
    }
}
