//! Fixed, versioned, little-endian wire types for the neighbor rounds.
//!
//! Every message is a [`WireHdr`] followed by `count` records of one kind.
//! Receive buffers carry no alignment guarantee, so records are decoded with
//! unaligned reads.

use bytemuck::{Pod, Zeroable};
use static_assertions::{assert_eq_align, assert_eq_size};
use std::mem::size_of;

use crate::linsys_error::{LinSysError, Stage};

/// Bump when the layout or semantics change in incompatible ways.
pub const WIRE_VERSION: u16 = 1;

/// Record kinds, one per neighbor round.
pub mod kind {
    pub const ROW_LENGTHS: u16 = 1;
    pub const CONNECTIONS: u16 = 2;
    pub const EXPORT: u16 = 3;
    pub const SYNC: u16 = 4;
}

// All multi-byte integers in these structs are little-endian on the wire.
// They are stored pre-LE with `.to_le()` and decoded with `.from_le()`.

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct WireHdr {
    pub version_le: u16,
    pub kind_le: u16,
    pub count_le: u32,
}

impl WireHdr {
    pub fn new(kind: u16, count: usize) -> Self {
        Self {
            version_le: WIRE_VERSION.to_le(),
            kind_le: kind.to_le(),
            count_le: (count as u32).to_le(),
        }
    }
    pub fn version(&self) -> u16 {
        u16::from_le(self.version_le)
    }
    pub fn kind(&self) -> u16 {
        u16::from_le(self.kind_le)
    }
    pub fn count(&self) -> usize {
        u32::from_le(self.count_le) as usize
    }
}

/// Round 1: number of column entries a shared-not-owned row contributes.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct WireRowLength {
    pub row_gid_le: u64,
    pub len_le: u32,
    pub _pad: u32,
}

impl WireRowLength {
    pub fn new(row_gid: u64, len: usize) -> Self {
        Self {
            row_gid_le: row_gid.to_le(),
            len_le: (len as u32).to_le(),
            _pad: 0,
        }
    }
    pub fn row_gid(&self) -> u64 {
        u64::from_le(self.row_gid_le)
    }
    pub fn len(&self) -> usize {
        u32::from_le(self.len_le) as usize
    }
}

/// Round 2: one column global id.
#[repr(transparent)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct WireGid {
    pub gid_le: u64,
}

impl WireGid {
    pub fn of(gid: u64) -> Self {
        Self { gid_le: gid.to_le() }
    }
    pub fn get(&self) -> u64 {
        u64::from_le(self.gid_le)
    }
}

/// Export: one shared-not-owned contribution. `col_gid == 0` marks an rhs entry.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct WireEntry {
    pub row_gid_le: u64,
    pub col_gid_le: u64,
    pub row_dof_le: u32,
    pub col_dof_le: u32,
    pub value_le: u64,
}

impl WireEntry {
    pub const RHS: u64 = 0;

    pub fn new(row_gid: u64, col_gid: u64, row_dof: usize, col_dof: usize, value: f64) -> Self {
        Self {
            row_gid_le: row_gid.to_le(),
            col_gid_le: col_gid.to_le(),
            row_dof_le: (row_dof as u32).to_le(),
            col_dof_le: (col_dof as u32).to_le(),
            value_le: value.to_bits().to_le(),
        }
    }
    pub fn rhs(row_gid: u64, row_dof: usize, value: f64) -> Self {
        Self::new(row_gid, Self::RHS, row_dof, 0, value)
    }
    pub fn row_gid(&self) -> u64 {
        u64::from_le(self.row_gid_le)
    }
    pub fn col_gid(&self) -> u64 {
        u64::from_le(self.col_gid_le)
    }
    pub fn row_dof(&self) -> usize {
        u32::from_le(self.row_dof_le) as usize
    }
    pub fn col_dof(&self) -> usize {
        u32::from_le(self.col_dof_le) as usize
    }
    pub fn value(&self) -> f64 {
        f64::from_bits(u64::from_le(self.value_le))
    }
    pub fn is_rhs(&self) -> bool {
        self.col_gid() == Self::RHS
    }
}

/// Post-solve sync: one solved value of an owned row.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct WireValue {
    pub gid_le: u64,
    pub dof_le: u32,
    pub _pad: u32,
    pub value_le: u64,
}

impl WireValue {
    pub fn new(gid: u64, dof: usize, value: f64) -> Self {
        Self {
            gid_le: gid.to_le(),
            dof_le: (dof as u32).to_le(),
            _pad: 0,
            value_le: value.to_bits().to_le(),
        }
    }
    pub fn gid(&self) -> u64 {
        u64::from_le(self.gid_le)
    }
    pub fn dof(&self) -> usize {
        u32::from_le(self.dof_le) as usize
    }
    pub fn value(&self) -> f64 {
        f64::from_bits(u64::from_le(self.value_le))
    }
}

assert_eq_size!(WireHdr, [u8; 8]);
assert_eq_size!(WireRowLength, [u8; 16]);
assert_eq_size!(WireGid, u64);
assert_eq_size!(WireEntry, [u64; 4]);
assert_eq_size!(WireValue, [u64; 3]);
assert_eq_align!(WireEntry, u64);

/// Header plus records, as one contiguous message.
pub fn encode<T: Pod>(kind: u16, records: &[T]) -> Vec<u8> {
    let hdr = WireHdr::new(kind, records.len());
    let body: &[u8] = bytemuck::cast_slice(records);
    let mut out = Vec::with_capacity(size_of::<WireHdr>() + body.len());
    out.extend_from_slice(bytemuck::bytes_of(&hdr));
    out.extend_from_slice(body);
    out
}

/// Check the header of a message from `neighbor` and decode its records.
/// Errors are tagged with `stage`.
pub fn decode<T: Pod>(
    neighbor: usize,
    kind: u16,
    stage: Stage,
    bytes: &[u8],
) -> Result<Vec<T>, LinSysError> {
    let hdr_len = size_of::<WireHdr>();
    if bytes.len() < hdr_len {
        return Err(LinSysError::BufferSizeMismatch {
            neighbor,
            stage,
            expected: hdr_len,
            got: bytes.len(),
        });
    }
    let hdr: WireHdr = bytemuck::pod_read_unaligned(&bytes[..hdr_len]);
    if hdr.version() != WIRE_VERSION {
        return Err(LinSysError::comm(
            neighbor,
            stage,
            format!("wire version {} (expected {WIRE_VERSION})", hdr.version()),
        ));
    }
    if hdr.kind() != kind {
        return Err(LinSysError::comm(
            neighbor,
            stage,
            format!("record kind {} (expected {kind})", hdr.kind()),
        ));
    }
    let body = &bytes[hdr_len..];
    let expected = hdr.count() * size_of::<T>();
    if body.len() != expected {
        return Err(LinSysError::BufferSizeMismatch {
            neighbor,
            stage,
            expected: hdr_len + expected,
            got: bytes.len(),
        });
    }
    Ok(body
        .chunks_exact(size_of::<T>())
        .map(bytemuck::pod_read_unaligned::<T>)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_survives_unaligned_buffer() {
        let msg = encode(kind::EXPORT, &[WireEntry::new(7, 9, 1, 2, -0.5)]);
        let mut shifted = vec![0u8];
        shifted.extend_from_slice(&msg);
        let out: Vec<WireEntry> = decode(3, kind::EXPORT, Stage::Export, &shifted[1..]).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].row_gid(), 7);
        assert_eq!(out[0].col_gid(), 9);
        assert_eq!((out[0].row_dof(), out[0].col_dof()), (1, 2));
        assert_eq!(out[0].value(), -0.5);
        assert!(!out[0].is_rhs());
        assert!(WireEntry::rhs(7, 0, 1.0).is_rhs());
    }

    #[test]
    fn empty_message_is_just_a_header() {
        let msg = encode::<WireGid>(kind::CONNECTIONS, &[]);
        assert_eq!(msg.len(), size_of::<WireHdr>());
        let out: Vec<WireGid> = decode(0, kind::CONNECTIONS, Stage::GraphBuild, &msg).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn truncated_body_is_a_size_mismatch() {
        let msg = encode(kind::ROW_LENGTHS, &[WireRowLength::new(1, 4)]);
        let err = decode::<WireRowLength>(2, kind::ROW_LENGTHS, Stage::GraphBuild, &msg[..msg.len() - 3])
            .unwrap_err();
        assert!(matches!(
            err,
            LinSysError::BufferSizeMismatch { neighbor: 2, stage: Stage::GraphBuild, .. }
        ));
    }

    #[test]
    fn wrong_kind_names_neighbor() {
        let msg = encode(kind::SYNC, &[WireValue::new(1, 0, 2.0)]);
        let err = decode::<WireValue>(5, kind::EXPORT, Stage::Solve, &msg).unwrap_err();
        assert!(matches!(err, LinSysError::CommError { neighbor: 5, stage: Stage::Solve, .. }));
    }
}
