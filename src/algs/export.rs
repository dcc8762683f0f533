//! Export of shared-not-owned contributions to their owners, and the
//! reverse push of solved values after the solve.
//!
//! Both are a single neighbor round. Export records carry global ids so the
//! receiver never needs the sender's numbering; the owner *adds* every
//! record into its owned storage.

use std::collections::BTreeMap;

use log::debug;

use crate::algs::communicator::{CommTag, Communicator};
use crate::algs::neighbor_exchange::exchange_records;
use crate::algs::wire::{WireEntry, WireValue, kind};
use crate::data::field::Field;
use crate::data::local_id_map::{ColumnMap, RowMap};
use crate::data::matrix::{DistributedMatrix, DistributedVector};
use crate::linsys_error::{LinSysError, Stage};
use crate::topology::ownership::{EntityOwnership, ProcessTopology};

/// Record counts of one export round.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct ExportSummary {
    pub sent: usize,
    pub received: usize,
}

fn invariant(stage: Stage, detail: String) -> LinSysError {
    LinSysError::GraphInvariant { stage, detail }
}

/// The owned pair receives contributions; the shared-not-owned pair is
/// drained into it.
pub struct ExportTargets<'a> {
    pub owned_matrix: &'a DistributedMatrix,
    pub owned_rhs: &'a DistributedVector,
    pub sno_matrix: &'a mut DistributedMatrix,
    pub sno_rhs: &'a mut DistributedVector,
}

/// Ship every shared-not-owned matrix and rhs entry to its owner and sum
/// what arrives into the owned pair. Shared-not-owned storage is zeroed
/// afterwards.
///
/// # Errors
/// `GraphInvariant` (stage export) if a record names a row not owned here or
/// an entry outside the owned graph; `CommError` if a neighbor is silent.
pub fn export_shared_not_owned<C: Communicator>(
    comm: &C,
    process: &ProcessTopology,
    tag: CommTag,
    rows: &RowMap,
    cols: &ColumnMap,
    ownership: &EntityOwnership,
    targets: ExportTargets<'_>,
) -> Result<ExportSummary, LinSysError> {
    let num_dof = rows.num_dof();
    let sno_a = targets.sno_matrix.view();
    let sno_b = targets.sno_rhs.view();

    let mut outgoing: BTreeMap<usize, Vec<WireEntry>> = BTreeMap::new();
    let mut sent = 0;
    for (&owner, lids) in ownership.sno_rows_by_owner() {
        let buf = outgoing.entry(owner).or_default();
        for &lid in lids {
            let row_gid = rows
                .entity(lid)
                .map(|e| e.id().get())
                .ok_or_else(|| invariant(Stage::Export, format!("row {lid} has no entity")))?;
            for d in 0..num_dof {
                let row = lid as usize * num_dof + d;
                for (col, v) in sno_a.row_entries(row) {
                    let block = col / num_dof as u32;
                    let col_gid = cols
                        .gid(block)
                        .ok_or_else(|| invariant(Stage::Export, format!("column {block} unmapped")))?;
                    buf.push(WireEntry::new(
                        row_gid,
                        col_gid.get(),
                        d,
                        col as usize % num_dof,
                        v,
                    ));
                }
                buf.push(WireEntry::rhs(row_gid, d, sno_b.get(row).unwrap_or(0.0)));
            }
        }
        sent += buf.len();
    }

    let received = exchange_records(comm, &process.neighbors, tag, kind::EXPORT, Stage::Export, &outgoing)?;

    let a = targets.owned_matrix.view();
    let b = targets.owned_rhs.view();
    let mut n_received = 0;
    for (nbr, entries) in received {
        n_received += entries.len();
        for rec in entries {
            let lid = rows.owned_lid_of_gid(rec.row_gid()).ok_or_else(|| {
                invariant(
                    Stage::Export,
                    format!("rank {nbr} exported row {} which is not owned here", rec.row_gid()),
                )
            })?;
            if rec.row_dof() >= num_dof || rec.col_dof() >= num_dof {
                return Err(LinSysError::DofOutOfRange {
                    begin: rec.row_dof().max(rec.col_dof()),
                    end: rec.row_dof().max(rec.col_dof()) + 1,
                    len: num_dof,
                });
            }
            let row = lid as usize * num_dof + rec.row_dof();
            if rec.is_rhs() {
                b.sum_into(row, rec.value());
                continue;
            }
            let col = cols
                .lid_of_gid(rec.col_gid())
                .map(|c| c * num_dof as u32 + rec.col_dof() as u32)
                .ok_or_else(|| {
                    invariant(
                        Stage::Export,
                        format!("rank {nbr} exported column {} unknown here", rec.col_gid()),
                    )
                })?;
            if !a.sum_into(row, col, rec.value()) {
                return Err(invariant(
                    Stage::Export,
                    format!(
                        "rank {nbr} exported ({}, {}) outside the owned graph",
                        rec.row_gid(),
                        rec.col_gid()
                    ),
                ));
            }
        }
    }

    targets.sno_matrix.zero();
    targets.sno_rhs.zero();

    debug!("export on rank {}: sent {sent} records, received {n_received}", process.my_rank);
    Ok(ExportSummary {
        sent,
        received: n_received,
    })
}

/// Push owned solution values to every sharer and write the values received
/// for local shared-not-owned rows into `field`.
///
/// `owned_solution[i]` is the value of owned local row `i`.
pub fn sync_shared_values<C: Communicator>(
    comm: &C,
    process: &ProcessTopology,
    tag: CommTag,
    rows: &RowMap,
    ownership: &EntityOwnership,
    owned_solution: &[f64],
    field: &mut Field,
) -> Result<usize, LinSysError> {
    let num_dof = rows.num_dof();
    let mut outgoing: BTreeMap<usize, Vec<WireValue>> = BTreeMap::new();
    for (&sharer, lids) in ownership.owned_rows_by_sharer() {
        let buf = outgoing.entry(sharer).or_default();
        for &lid in lids {
            let Some(e) = rows.entity(lid) else { continue };
            for d in 0..num_dof {
                let v = owned_solution
                    .get(lid as usize * num_dof + d)
                    .copied()
                    .unwrap_or(0.0);
                buf.push(WireValue::new(e.id().get(), d, v));
            }
        }
    }

    let received = exchange_records(comm, &process.neighbors, tag, kind::SYNC, Stage::Solve, &outgoing)?;

    let mut n = 0;
    for (nbr, values) in received {
        for rec in values {
            let e = rows
                .sno_lid_of_gid(rec.gid())
                .and_then(|lid| rows.entity(lid))
                .ok_or_else(|| {
                    invariant(
                        Stage::Solve,
                        format!("rank {nbr} pushed row {} not shared here", rec.gid()),
                    )
                })?;
            let slot = field.get_mut(e)?;
            let len = slot.len();
            *slot.get_mut(rec.dof()).ok_or(LinSysError::DofOutOfRange {
                begin: rec.dof(),
                end: rec.dof() + 1,
                len,
            })? = rec.value();
            n += 1;
        }
    }
    debug!("post-solve sync on rank {}: {n} values received", process.my_rank);
    Ok(n)
}
