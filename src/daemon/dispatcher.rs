//! The daemon's dispatcher: reads the request queue and pushes parsed
//! requests onto an internal mutex+cond-var work queue for the worker pool
//! to drain (spec §4.5). Mirrors the original's `pthread_mutex_t`/
//! `pthread_cond_t` request queue with `std::sync::{Mutex, Condvar}`.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};

use nix::mqueue::MqdT;
use tracing::error;

use crate::daemon::file_cache::FileCacheIndex;
use crate::daemon::worker;
use crate::ipc::request::{self, RequestMessage};

/// A blocking FIFO queue of parsed requests shared between the dispatcher
/// and the worker pool.
pub struct WorkQueue {
    inner: Mutex<VecDeque<RequestMessage>>,
    cond: Condvar,
}

impl WorkQueue {
    fn new() -> Self {
        Self {
            inner: Mutex::new(VecDeque::new()),
            cond: Condvar::new(),
        }
    }

    fn push(&self, msg: RequestMessage) {
        let mut guard = self.inner.lock().unwrap();
        guard.push_back(msg);
        self.cond.notify_one();
    }

    /// Blocks until a request is available, then returns it. No timeout.
    pub fn pop(&self) -> RequestMessage {
        let mut guard = self.inner.lock().unwrap();
        loop {
            if let Some(msg) = guard.pop_front() {
                return msg;
            }
            guard = self.cond.wait(guard).unwrap();
        }
    }
}

/// Opens the request queue, spawns `nthreads` worker threads draining a
/// shared `WorkQueue`, and then reads requests off the queue forever,
/// pushing each one for a worker to pick up. Blocks the calling thread
/// until `mq_receive` returns an error, at which point the dispatcher loop
/// (and the process) terminates.
pub fn run(nthreads: usize, cache: Arc<FileCacheIndex>) -> anyhow::Result<()> {
    let mqd = request::open_daemon_queue()?;
    let work_queue = Arc::new(WorkQueue::new());

    for id in 0..nthreads {
        let work_queue = Arc::clone(&work_queue);
        let cache = Arc::clone(&cache);
        std::thread::spawn(move || worker::run(id, &work_queue, &cache));
    }

    receive_loop(&mqd, &work_queue)
}

fn receive_loop(mqd: &MqdT, work_queue: &WorkQueue) -> anyhow::Result<()> {
    loop {
        match request::receive(mqd) {
            Ok(msg) => work_queue.push(msg),
            Err(e) => {
                error!(error = %e, "mq_receive failed, terminating dispatcher loop");
                return Err(e);
            }
        }
    }
}
