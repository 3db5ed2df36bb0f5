//! Static-content proxy entry point.
//!
//! Parses CLI arguments, initializes logging, populates the segment pool,
//! wires SIGINT/SIGTERM to unlink every named object the pool owns, and
//! serves Getfile connections forever across a fixed worker pool.

use std::sync::{Arc, OnceLock};

use anyhow::Result;
use clap::Parser;
use gfcache_ipc::{cli::ProxyArgs, ipc::segment::SegmentPool, proxy};
use tracing::info;

static POOL: OnceLock<Arc<SegmentPool>> = OnceLock::new();

extern "C" fn handle_termination(signo: libc::c_int) {
    if let Some(pool) = POOL.get() {
        pool.shutdown();
    }
    std::process::exit(signo);
}

fn install_signal_handlers() -> Result<()> {
    unsafe {
        if libc::signal(libc::SIGINT, handle_termination as libc::sighandler_t) == libc::SIG_ERR {
            anyhow::bail!("failed to install SIGINT handler");
        }
        if libc::signal(libc::SIGTERM, handle_termination as libc::sighandler_t) == libc::SIG_ERR {
            anyhow::bail!("failed to install SIGTERM handler");
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = ProxyArgs::parse();
    let _log_guard = gfcache_ipc::logging::init(&args.log, "gfproxy.log");

    info!(
        nsegments = args.nsegments,
        segment_size = args.segment_size,
        port = args.port,
        threads = args.threads,
        "starting proxy"
    );

    let pool = Arc::new(SegmentPool::new(args.nsegments, args.segment_size)?);
    POOL.set(Arc::clone(&pool))
        .map_err(|_| anyhow::anyhow!("segment pool already initialized"))?;
    install_signal_handlers()?;

    let listener = Arc::new(proxy::getfile::GetfileListener::bind(args.port)?);

    if let Some(origin) = &args.origin {
        info!(origin, "requests will be forwarded to origin instead of the cache daemon");
    }

    proxy::dispatcher::serve(listener, pool, args.threads, args.origin)
}
