//! One symmetric neighbor round with variable-length record messages.
//!
//! Every rank in the neighbor set receives exactly one message, empty if
//! there is nothing for it, so each side knows how many messages to wait
//! for without a size pre-round. All receive and send handles are drained
//! before returning, even if an error occurs; the first error wins and names
//! the offending neighbor.

use std::collections::{BTreeMap, BTreeSet};

use bytemuck::Pod;

use crate::algs::communicator::{CommTag, Communicator, Wait};
use crate::algs::wire;
use crate::linsys_error::{LinSysError, Stage};

/// Send `outgoing[nbr]` (or nothing) to every neighbor and collect what each
/// neighbor sent back. Keys of the result are exactly `neighbors`. Errors
/// carry `stage`.
///
/// # Errors
/// `CommError` if a neighbor never answers or sends a foreign record kind,
/// `BufferSizeMismatch` if a message length disagrees with its header.
pub fn exchange_records<C, T>(
    comm: &C,
    neighbors: &BTreeSet<usize>,
    tag: CommTag,
    kind: u16,
    stage: Stage,
    outgoing: &BTreeMap<usize, Vec<T>>,
) -> Result<BTreeMap<usize, Vec<T>>, LinSysError>
where
    C: Communicator,
    T: Pod,
{
    if let Some(&stray) = outgoing.keys().find(|r| !neighbors.contains(r)) {
        return Err(LinSysError::GraphInvariant {
            stage,
            detail: format!("records addressed to rank {stray}, which is not a neighbor"),
        });
    }

    // 1) post all receives
    let recvs: Vec<(usize, C::RecvHandle)> = neighbors
        .iter()
        .map(|&nbr| (nbr, comm.irecv(nbr, tag.as_u16())))
        .collect();

    // 2) post all sends, empty messages included
    let mut pending_sends = Vec::with_capacity(neighbors.len());
    for &nbr in neighbors {
        let records = outgoing.get(&nbr).map_or(&[][..], Vec::as_slice);
        let msg = wire::encode(kind, records);
        pending_sends.push(comm.isend(nbr, tag.as_u16(), &msg));
    }

    // 3) wait for all recvs (but do not early-return)
    let mut incoming = BTreeMap::new();
    let mut maybe_err = None;
    for (nbr, h) in recvs {
        match h.wait() {
            Some(data) if maybe_err.is_none() => match wire::decode::<T>(nbr, kind, stage, &data) {
                Ok(records) => {
                    incoming.insert(nbr, records);
                }
                Err(e) => maybe_err = Some(e),
            },
            None if maybe_err.is_none() => {
                maybe_err = Some(LinSysError::comm(
                    nbr,
                    stage,
                    format!("no message from rank {nbr} on tag {}", tag.as_u16()),
                ));
            }
            _ => {}
        }
    }

    // 4) always drain all send handles before returning
    for send in pending_sends {
        let _ = send.wait();
    }

    match maybe_err {
        Some(err) => Err(err),
        None => Ok(incoming),
    }
}
