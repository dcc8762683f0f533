use mesh_linsys::algs::communicator::CommTag;
use mesh_linsys::algs::wire::{WIRE_VERSION, WireEntry, WireHdr, WireValue, decode, encode, kind};
use mesh_linsys::{LinSysError, Stage};

#[test]
fn commtag_offset_wrap() {
    let t = CommTag::new(u16::MAX).offset(1);
    assert_eq!(t.as_u16(), 0);
}

#[test]
fn header_records_version_kind_and_count() {
    let msg = encode(kind::SYNC, &[WireValue::new(9, 1, 0.5), WireValue::new(10, 0, -2.0)]);
    let hdr: WireHdr = bytemuck::pod_read_unaligned(&msg[..8]);
    assert_eq!(hdr.version(), WIRE_VERSION);
    assert_eq!(hdr.kind(), kind::SYNC);
    assert_eq!(hdr.count(), 2);
    assert_eq!(msg.len(), 8 + 2 * 24);
}

#[test]
fn entry_carries_rhs_marker() {
    let rhs = WireEntry::rhs(42, 1, 3.25);
    assert!(rhs.is_rhs());
    assert_eq!(rhs.col_gid(), WireEntry::RHS);
    let lhs = WireEntry::new(42, 7, 1, 0, -1.0);
    assert!(!lhs.is_rhs());

    let back: Vec<WireEntry> = decode(3, kind::EXPORT, Stage::Export, &encode(kind::EXPORT, &[rhs, lhs])).unwrap();
    assert_eq!(back[0].value(), 3.25);
    assert_eq!((back[1].row_gid(), back[1].col_gid(), back[1].row_dof(), back[1].col_dof()), (42, 7, 1, 0));
}

#[test]
fn trailing_bytes_are_a_size_mismatch() {
    let mut msg = encode(kind::SYNC, &[WireValue::new(1, 0, 1.0)]);
    msg.push(0);
    assert!(matches!(
        decode::<WireValue>(5, kind::SYNC, Stage::Solve, &msg),
        Err(LinSysError::BufferSizeMismatch { neighbor: 5, stage: Stage::Solve, .. })
    ));
}
