//! Accepts Getfile connections and hands each one off to a worker thread.
//!
//! The worker pool is a fixed set of long-lived OS threads (spec §5: no
//! cooperative scheduling, no async runtime), each pulling connections off
//! the same listener independently — there's no shared mutable state
//! between them beyond the segment pool's own mutex and cond-var.

use std::sync::Arc;

use anyhow::Result;
use tracing::{error, warn};

use crate::ipc::segment::SegmentPool;
use crate::proxy::getfile::GetfileListener;
use crate::proxy::worker;

/// Runs `nthreads` worker threads forever, each accepting connections from
/// `listener` and serving them via the cache daemon, or — when `origin` is
/// set — by forwarding straight to that upstream host instead. Blocks the
/// calling thread until the process is terminated.
pub fn serve(
    listener: Arc<GetfileListener>,
    pool: Arc<SegmentPool>,
    nthreads: usize,
    origin: Option<String>,
) -> Result<()> {
    let origin = origin.map(Arc::new);
    let mut handles = Vec::with_capacity(nthreads);
    for id in 0..nthreads {
        let listener = Arc::clone(&listener);
        let pool = Arc::clone(&pool);
        let origin = origin.clone();
        handles.push(std::thread::spawn(move || worker_loop(id, &listener, &pool, origin.as_deref())));
    }
    for handle in handles {
        let _ = handle.join();
    }
    Ok(())
}

fn worker_loop(id: usize, listener: &GetfileListener, pool: &Arc<SegmentPool>, origin: Option<&str>) {
    loop {
        let request = match listener.accept() {
            Ok(Some(r)) => r,
            Ok(None) => continue,
            Err(e) => {
                error!(worker = id, error = %e, "Getfile accept failed");
                continue;
            }
        };

        let mut reply = request.reply;
        let result = match origin {
            Some(origin_host) => worker::handle_request_via_origin(origin_host, &request.path, &mut reply),
            None => worker::handle_request(pool, &request.path, &mut reply),
        };
        if let Err(e) = result {
            warn!(worker = id, path = %request.path, error = %e, "request failed");
        }
    }
}
