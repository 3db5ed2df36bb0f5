//! # Static-content proxy and cache daemon
//!
//! A two-process system where a proxy terminates client connections
//! speaking a small file-transfer protocol ("Getfile") and serves each
//! request either by forwarding it to an upstream origin over HTTP or by
//! asking a cache daemon to supply the file. The two processes coordinate
//! only through OS-level IPC: a POSIX message queue carries request
//! descriptors from proxy to daemon, and a pool of fixed-size POSIX
//! shared-memory segments, each guarded by a pair of named semaphores,
//! carries file bytes back to the proxy in chunks.

pub mod cli;
pub mod daemon;
pub mod ipc;
pub mod logging;
pub mod proxy;

/// The current version of this crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default configuration values, matching the CLI surface in spec §6.
pub mod defaults {
    /// Default number of segments in the proxy's segment pool.
    pub const NSEGMENTS: usize = 1;

    /// Default size, in bytes, of each shared-memory segment.
    pub const SEGMENT_SIZE: i32 = 1024;

    /// Default Getfile listen port.
    pub const PORT: u16 = 8888;

    /// Default number of proxy worker threads.
    pub const PROXY_THREADS: usize = 1;

    /// Default number of daemon worker threads.
    pub const DAEMON_THREADS: usize = 1;

    /// Default manifest path consulted by the file cache.
    pub const MANIFEST_PATH: &str = "./locals.txt";
}
