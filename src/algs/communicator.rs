//! Thin façade over intra-process (threads) or inter-process (MPI) message passing.
//!
//! Messages are contiguous byte slices. Sends are non-blocking; receives
//! return a handle whose `wait()` yields the whole message, so senders never
//! have to announce a size in a separate round. Between a fixed pair of
//! ranks and a fixed tag, messages arrive in send order.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use bytes::Bytes;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use parking_lot::{Condvar, Mutex};

/// Non-blocking communication interface (minimal by design).
pub trait Communicator: Send + Sync + 'static {
    /// Handle returned by `isend`.
    type SendHandle: Wait;
    /// Handle returned by `irecv`.
    type RecvHandle: Wait;

    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> Self::SendHandle;
    fn irecv(&self, peer: usize, tag: u16) -> Self::RecvHandle;

    /// Rank of this process.
    fn rank(&self) -> usize;
    /// Number of processes.
    fn size(&self) -> usize;
    /// Synchronise all processes. Default is a no-op.
    fn barrier(&self) {}
}

/// Anything that can be waited on.
pub trait Wait {
    /// Wait for completion and return the received data (if any).
    fn wait(self) -> Option<Vec<u8>>;
}

impl Wait for () {
    fn wait(self) -> Option<Vec<u8>> {
        None
    }
}

/// Message tag, offset per communication phase.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct CommTag(pub u16);

impl CommTag {
    #[inline]
    pub const fn new(tag: u16) -> Self {
        Self(tag)
    }
    #[inline]
    pub const fn as_u16(self) -> u16 {
        self.0
    }
    #[inline]
    pub const fn base(self) -> u16 {
        self.0
    }
    /// Tag `n` slots after this one (wrapping).
    #[inline]
    pub const fn offset(self, n: u16) -> Self {
        Self(self.0.wrapping_add(n))
    }
}

/// One tag per neighbor round of the linear-system pipeline.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct LinSysCommTags {
    /// Graph round 1: row lengths.
    pub row_lengths: CommTag,
    /// Graph round 2: column ids.
    pub connections: CommTag,
    /// Shared-not-owned contributions to owners.
    pub export: CommTag,
    /// Solved values from owners to sharers.
    pub sync: CommTag,
}

impl LinSysCommTags {
    /// Number of consecutive tags consumed from the base.
    pub const SPAN: u16 = 4;

    #[inline]
    pub const fn from_base(base: CommTag) -> Self {
        Self {
            row_lengths: base,
            connections: base.offset(1),
            export: base.offset(2),
            sync: base.offset(3),
        }
    }
}

/// Compile-time no-op comm for pure serial runs.
#[derive(Clone, Debug, Default)]
pub struct NoComm;

impl Communicator for NoComm {
    type SendHandle = ();
    type RecvHandle = ();

    fn isend(&self, _peer: usize, _tag: u16, _buf: &[u8]) {}
    fn irecv(&self, _peer: usize, _tag: u16) {}
    fn rank(&self) -> usize {
        0
    }
    fn size(&self) -> usize {
        1
    }
}

// --- RayonComm: intra-process / multi-thread ---
type Key = (usize, usize, u16); // (src, dst, tag)

static MAILBOX: Lazy<DashMap<Key, VecDeque<Bytes>>> = Lazy::new(DashMap::new);
static DELIVERED: Lazy<(Mutex<()>, Condvar)> = Lazy::new(|| (Mutex::new(()), Condvar::new()));

/// Pending in-process receive. Gives up after the communicator's timeout.
pub struct LocalHandle {
    key: Key,
    timeout: Duration,
}

impl LocalHandle {
    fn try_take(&self) -> Option<Bytes> {
        MAILBOX.get_mut(&self.key).and_then(|mut q| q.pop_front())
    }
}

impl Wait for LocalHandle {
    fn wait(self) -> Option<Vec<u8>> {
        let deadline = Instant::now() + self.timeout;
        loop {
            if let Some(bytes) = self.try_take() {
                return Some(bytes.to_vec());
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            // short slices so a notify racing the check costs at most one slice
            let slice = (deadline - now).min(Duration::from_millis(2));
            let (lock, cvar) = &*DELIVERED;
            let mut guard = lock.lock();
            cvar.wait_for(&mut guard, slice);
        }
    }
}

/// Ranks simulated by threads of one process, exchanging through a shared mailbox.
#[derive(Clone, Debug)]
pub struct RayonComm {
    rank: usize,
    size: usize,
    timeout: Duration,
}

impl RayonComm {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

    pub fn new(rank: usize, size: usize) -> Self {
        Self {
            rank,
            size,
            timeout: Self::DEFAULT_TIMEOUT,
        }
    }

    /// Override how long a receive waits before reporting failure.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Communicator for RayonComm {
    type SendHandle = ();
    type RecvHandle = LocalHandle;

    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> Self::SendHandle {
        let key = (self.rank, peer, tag);
        MAILBOX
            .entry(key)
            .or_default()
            .push_back(Bytes::copy_from_slice(buf));
        let (lock, cvar) = &*DELIVERED;
        let _guard = lock.lock();
        cvar.notify_all();
    }

    fn irecv(&self, peer: usize, tag: u16) -> Self::RecvHandle {
        LocalHandle {
            key: (peer, self.rank, tag),
            timeout: self.timeout,
        }
    }

    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }
}

// --- MPI backend (feature = "mpi-support") ---
#[cfg(feature = "mpi-support")]
mod mpi_backend {
    use super::{Communicator, Wait};
    use mpi::point_to_point::{Destination, Source};
    use mpi::request::{Request, StaticScope};
    use mpi::topology::{Communicator as _, SimpleCommunicator};
    use mpi::traits::*;
    use std::sync::Arc;

    /// MPI world communicator. Receives are matched lazily at `wait()`, after
    /// every send of the round has been posted.
    pub struct MpiComm {
        world: Arc<SimpleCommunicator>,
        rank: usize,
        size: usize,
        _universe: Arc<mpi::environment::Universe>,
    }

    // Handles are only used from the thread that initialised MPI.
    unsafe impl Send for MpiComm {}
    unsafe impl Sync for MpiComm {}

    impl MpiComm {
        /// Initialise MPI. Returns `None` if it was already initialised.
        pub fn new() -> Option<Self> {
            let universe = mpi::initialize()?;
            let world = universe.world();
            let rank = world.rank() as usize;
            let size = world.size() as usize;
            Some(Self {
                world: Arc::new(world),
                rank,
                size,
                _universe: Arc::new(universe),
            })
        }
    }

    pub struct MpiSendHandle {
        req: Request<'static, [u8], StaticScope>,
        buf: *mut [u8],
    }

    impl Wait for MpiSendHandle {
        fn wait(self) -> Option<Vec<u8>> {
            self.req.wait();
            // SAFETY: `buf` came from `Box::into_raw` in `isend` and the request
            // that borrowed it has completed.
            drop(unsafe { Box::from_raw(self.buf) });
            None
        }
    }

    pub struct MpiRecvHandle {
        world: Arc<SimpleCommunicator>,
        peer: usize,
        tag: u16,
    }

    unsafe impl Send for MpiRecvHandle {}

    impl Wait for MpiRecvHandle {
        fn wait(self) -> Option<Vec<u8>> {
            let (data, _status) = self
                .world
                .process_at_rank(self.peer as i32)
                .receive_vec_with_tag::<u8>(self.tag as i32);
            Some(data)
        }
    }

    impl Communicator for MpiComm {
        type SendHandle = MpiSendHandle;
        type RecvHandle = MpiRecvHandle;

        fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> MpiSendHandle {
            let raw: *mut [u8] = Box::into_raw(buf.to_vec().into_boxed_slice());
            // SAFETY: the boxed buffer outlives the request; it is freed in `wait`.
            let staged: &'static [u8] = unsafe { &*raw };
            let req = self
                .world
                .process_at_rank(peer as i32)
                .immediate_send_with_tag(StaticScope, staged, tag as i32);
            MpiSendHandle { req, buf: raw }
        }

        fn irecv(&self, peer: usize, tag: u16) -> MpiRecvHandle {
            MpiRecvHandle {
                world: Arc::clone(&self.world),
                peer,
                tag,
            }
        }

        fn rank(&self) -> usize {
            self.rank
        }

        fn size(&self) -> usize {
            self.size
        }

        fn barrier(&self) {
            self.world.barrier();
        }
    }
}

#[cfg(feature = "mpi-support")]
pub use mpi_backend::MpiComm;
