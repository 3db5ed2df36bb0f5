//! Daemon worker orchestration (spec §4.5): each worker pulls one parsed
//! request off the internal work queue, maps the referenced segment,
//! consults the file cache, and runs the ping-pong protocol as "D".

use std::sync::Arc;

use nix::sys::stat::Mode;
use tracing::{error, info};

use crate::daemon::file_cache::FileCacheIndex;
use crate::ipc::{request::RequestMessage, sem::NamedSemaphore, shm::MappedSegment, transfer};
use crate::ipc::transfer::Verdict;

/// Runs forever, waiting on `work_queue` for the next request. Workers
/// never exit on a per-request error — only on process termination — so a
/// malformed or unlucky request never takes the daemon down.
pub fn run(id: usize, work_queue: &crate::daemon::dispatcher::WorkQueue, cache: &Arc<FileCacheIndex>) {
    loop {
        let msg = work_queue.pop();
        if let Err(e) = handle_one(&msg, cache) {
            error!(worker = id, path = %msg.path, error = %e, "daemon transaction failed");
        }
    }
}

fn handle_one(msg: &RequestMessage, cache: &FileCacheIndex) -> anyhow::Result<()> {
    let shm = MappedSegment::open(&msg.shm_name, msg.segment_size as usize)?;
    let sem_a = NamedSemaphore::open(&msg.sem_a_name)?;
    let _sem_b = NamedSemaphore::open(&msg.sem_b_name)?;

    match cache.lookup(&msg.path) {
        Some(entry) => {
            let len = entry.len();
            let mut offset = 0u64;
            transfer::run_as_daemon(&shm, &sem_a, Verdict::Hit, len as i64, |buf| {
                let n = entry.read_at(buf, offset)?;
                offset += n as u64;
                Ok(n)
            })?;
            info!(path = %msg.path, len, "served cache hit");
        }
        None => {
            transfer::run_as_daemon(&shm, &sem_a, Verdict::Miss, 0, |_buf| Ok(0))?;
            info!(path = %msg.path, "cache miss");
        }
    }

    // The daemon never unlinks the named objects it opened here — the
    // proxy owns that; it only drops its own handles (unmap, sem_close),
    // which happens automatically as `shm`/`sem_a`/`_sem_b` go out of scope.
    Ok(())
}
