//! Cache daemon entry point.
//!
//! Loads the file manifest, opens the request queue, and serves cache
//! lookups forever across a fixed worker pool. SIGINT/SIGTERM unlink the
//! request queue so a restarted daemon doesn't inherit a stale one.

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use gfcache_ipc::{cli::DaemonArgs, daemon, ipc::request};
use tracing::info;

extern "C" fn handle_termination(signo: libc::c_int) {
    let _ = request::unlink();
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
    let args = DaemonArgs::parse();
    args.validate()?;
    let _log_guard = gfcache_ipc::logging::init(&args.log, "gfcached.log");

    info!(threads = args.threads, manifest = %args.manifest.display(), "starting cache daemon");

    let cache = Arc::new(daemon::file_cache::FileCacheIndex::load(&args.manifest)?);
    install_signal_handlers()?;

    daemon::dispatcher::run(args.threads, cache)
}
