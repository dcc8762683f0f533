use std::time::{Duration, Instant};

use mesh_linsys::algs::communicator::{CommTag, Communicator, LinSysCommTags, RayonComm, Wait};

#[test]
fn rayon_round_trip() {
    let tag = CommTag(0x1000);
    let c0 = RayonComm::new(0, 2);
    let c1 = RayonComm::new(1, 2);

    let msg = b"hello";
    let _s = c0.isend(1, tag.base(), msg);

    let h = c1.irecv(0, tag.base());
    let got = h.wait().unwrap();
    assert_eq!(&got, msg);
}

#[test]
fn rayon_fifo_order() {
    let tag = CommTag(0x1001);
    let c0 = RayonComm::new(0, 2);
    let c1 = RayonComm::new(1, 2);

    for i in 0..10u8 {
        let _ = c0.isend(1, tag.base(), &[i]);
    }
    let mut out = Vec::new();
    for _ in 0..10 {
        let h = c1.irecv(0, tag.base());
        out.push(h.wait().unwrap()[0]);
    }
    assert_eq!(out, (0u8..10u8).collect::<Vec<_>>());
}

#[test]
fn whole_message_is_delivered() {
    let tag = CommTag(0x1002);
    let c0 = RayonComm::new(0, 2);
    let c1 = RayonComm::new(1, 2);

    let payload: Vec<u8> = (0..=255).collect();
    let _ = c0.isend(1, tag.base(), &payload);
    assert_eq!(c1.irecv(0, tag.base()).wait().unwrap(), payload);
}

#[test]
fn tags_do_not_mix() {
    let c0 = RayonComm::new(0, 2);
    let c1 = RayonComm::new(1, 2);
    let _ = c0.isend(1, 0x1003, b"a");
    let _ = c0.isend(1, 0x1004, b"b");
    assert_eq!(c1.irecv(0, 0x1004).wait().unwrap(), b"b");
    assert_eq!(c1.irecv(0, 0x1003).wait().unwrap(), b"a");
}

#[test]
fn receive_waits_for_a_late_sender() {
    let tag = CommTag(0x1005);
    let h = std::thread::spawn(move || {
        let c1 = RayonComm::new(1, 2);
        c1.irecv(0, tag.base()).wait()
    });
    std::thread::sleep(Duration::from_millis(20));
    let _ = RayonComm::new(0, 2).isend(1, tag.base(), b"late");
    assert_eq!(h.join().unwrap().unwrap(), b"late");
}

#[test]
fn silent_peer_times_out() {
    let c1 = RayonComm::new(1, 2).with_timeout(Duration::from_millis(30));
    let start = Instant::now();
    assert!(c1.irecv(0, 0x1006).wait().is_none());
    assert!(start.elapsed() >= Duration::from_millis(30));
}

#[test]
fn linear_system_tags_are_consecutive() {
    let tags = LinSysCommTags::from_base(CommTag::new(0x2000));
    assert_eq!(tags.row_lengths.as_u16(), 0x2000);
    assert_eq!(tags.connections.as_u16(), 0x2001);
    assert_eq!(tags.export.as_u16(), 0x2002);
    assert_eq!(tags.sync.as_u16(), 0x2003);
    assert_eq!(LinSysCommTags::SPAN, 4);
}
