//! The proxy-side segment pool: a bounded set of shared-memory segments
//! with paired semaphore names, leased to exactly one worker at a time.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};

use anyhow::{Context, Result};
use nix::sys::stat::Mode;
use tracing::info;

use crate::ipc::{sem, shm};

/// One entry of the pool: a name triple, the segment's size, and the
/// shared-memory mapping itself.
///
/// The shm segment is opened once, by the proxy, and held open for the
/// whole process lifetime — only the semaphore pair is created and torn
/// down per transaction. A transaction re-maps the segment by name on the
/// daemon side, since the worker handling a given lease runs in a
/// different process from the one that populated the pool, but the proxy
/// side never re-opens its own mapping.
pub struct SegmentDescriptor {
    pub index: usize,
    pub shm_name: String,
    pub sem_a_name: String,
    pub sem_b_name: String,
    pub segment_size: i32,
    pub shm: shm::MappedSegment,
}

impl SegmentDescriptor {
    fn new(index: usize, segment_size: i32) -> Result<Self> {
        let shm_name = format!("mem_{index}");
        let shm = shm::MappedSegment::create(&shm_name, segment_size as usize, Mode::from_bits_truncate(0o666))
            .with_context(|| format!("failed to create shared memory {shm_name}"))?;
        Ok(Self {
            index,
            shm_name,
            sem_a_name: format!("sem_{index}_a"),
            sem_b_name: format!("sem_{index}_b"),
            segment_size,
            shm,
        })
    }

    /// Unlinks the two per-transaction semaphore names, logging each one
    /// actually removed. Called after every transaction; the shared-memory
    /// segment is left mapped and is never touched here.
    pub fn unlink_semaphore_names(&self) {
        if sem::unlink_name(&self.sem_a_name).unwrap_or(false) {
            info!(segment = self.index, name = %self.sem_a_name, "semaphore removed from system");
        }
        if sem::unlink_name(&self.sem_b_name).unwrap_or(false) {
            info!(segment = self.index, name = %self.sem_b_name, "semaphore removed from system");
        }
    }

    /// Unlinks the shared-memory name. Only called at pool shutdown.
    fn unlink_shm(&self) {
        if shm::unlink(&self.shm_name).unwrap_or(false) {
            info!(segment = self.index, name = %self.shm_name, "shared mem removed from system");
        }
    }
}

/// Bounded FIFO pool of `SegmentDescriptor`s.
///
/// `lease` blocks while empty; `release` pushes back and wakes one waiter.
/// The safety invariant `|free| + |leased| == N` holds because descriptors
/// are only ever created in `new` and only ever destroyed in `shutdown`,
/// never dropped on an individual error path.
pub struct SegmentPool {
    inner: Mutex<VecDeque<SegmentDescriptor>>,
    cond: Condvar,
    total: usize,
}

impl SegmentPool {
    /// Populates the pool with `n` descriptors of `segment_size` bytes
    /// each. Each descriptor's shared-memory segment is created here,
    /// unlinking any stale object of the same name first, so repeated
    /// startups are idempotent; the mapping then stays open for the life
    /// of the pool.
    pub fn new(n: usize, segment_size: i32) -> Result<Self> {
        let mut queue = VecDeque::with_capacity(n);
        for i in 0..n {
            queue.push_back(SegmentDescriptor::new(i, segment_size)?);
        }
        Ok(Self {
            inner: Mutex::new(queue),
            cond: Condvar::new(),
            total: n,
        })
    }

    /// Blocks until a descriptor is available, then removes and returns it.
    /// No timeout, by design; ordering is FIFO but callers must not rely on
    /// it for correctness.
    pub fn lease(&self) -> SegmentDescriptor {
        let mut guard = self.inner.lock().unwrap();
        loop {
            if let Some(desc) = guard.pop_front() {
                return desc;
            }
            guard = self.cond.wait(guard).unwrap();
        }
    }

    /// Returns a descriptor to the pool and wakes exactly one waiter.
    pub fn release(&self, desc: SegmentDescriptor) {
        let mut guard = self.inner.lock().unwrap();
        guard.push_back(desc);
        self.cond.notify_one();
    }

    /// Number of segments currently leased out.
    pub fn leased_count(&self) -> usize {
        self.total - self.inner.lock().unwrap().len()
    }

    pub fn total(&self) -> usize {
        self.total
    }

    /// Unlinks every segment's shared-memory name, then drops the mapping.
    /// Only meaningful once every lease has been released back to the
    /// pool.
    pub fn shutdown(&self) {
        let mut guard = self.inner.lock().unwrap();
        while let Some(desc) = guard.pop_front() {
            desc.unlink_shm();
        }
    }
}
