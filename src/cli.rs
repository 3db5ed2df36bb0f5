//! Command-line argument parsing for both binaries, using `clap`'s derive
//! API in the same style across the crate: doc comments double as
//! `--help` text, and a shared `styles()` helper replicates clap v3's
//! colored usage output.

use std::path::PathBuf;

use clap::{
    builder::styling::{AnsiColor, Styles},
    Parser,
};

/// Defines the styles for the help message to replicate clap v3's
/// appearance.
fn styles() -> Styles {
    Styles::styled()
        .header(AnsiColor::Yellow.on_default())
        .usage(AnsiColor::Yellow.on_default())
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

/// Shared logging flags carried by both binaries.
#[derive(Parser, Debug, Clone)]
pub struct LogArgs {
    /// Increase diagnostic log verbosity on stderr/log file.
    ///
    ///  -v: debug
    ///  -vv and more: trace
    /// By default, only INFO and above are shown.
    #[arg(short, long, action = clap::ArgAction::Count, help_heading = "Output and Logging")]
    pub verbose: u8,

    /// Write detailed logs to this file instead of a daily-rotated default.
    /// Pass "stderr" to log detailed output to stderr instead of a file.
    #[arg(long, help_heading = "Output and Logging")]
    pub log_file: Option<String>,

    /// Silence the clean, user-facing summary line printed to stdout.
    #[arg(short = 'q', long, help_heading = "Output and Logging")]
    pub quiet: bool,
}

/// The static-content proxy: terminates Getfile client connections and
/// serves each request from the cache daemon or an upstream origin.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None, styles = styles())]
pub struct ProxyArgs {
    /// Number of segments to use when talking to the cache daemon.
    #[arg(short = 'n', long = "num-segments", default_value_t = crate::defaults::NSEGMENTS)]
    pub nsegments: usize,

    /// Size, in bytes, of each shared-memory segment.
    #[arg(short = 'z', long = "segment-size", default_value_t = crate::defaults::SEGMENT_SIZE)]
    pub segment_size: i32,

    /// Port on which to listen for Getfile client connections.
    #[arg(short = 'p', long, default_value_t = crate::defaults::PORT)]
    pub port: u16,

    /// Number of worker threads serving client connections.
    #[arg(short = 't', long = "threads", default_value_t = crate::defaults::PROXY_THREADS)]
    pub threads: usize,

    /// Upstream origin host to forward to instead of the cache daemon
    /// (e.g. "example.com" or "example.com:8080"). When absent, every
    /// request goes through the cache daemon.
    #[arg(short = 's', long)]
    pub origin: Option<String>,

    #[command(flatten)]
    pub log: LogArgs,
}

/// The cache daemon: preloads a manifest of files and serves them to the
/// proxy over shared memory, one segment per in-flight transaction.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None, styles = styles())]
pub struct DaemonArgs {
    /// Number of worker threads. Range 1..=1000.
    #[arg(short = 't', long = "threads", default_value_t = crate::defaults::DAEMON_THREADS)]
    pub threads: usize,

    /// Path to the manifest file mapping cache keys to file paths.
    #[arg(short = 'c', long = "cachedir", default_value = crate::defaults::MANIFEST_PATH)]
    pub manifest: PathBuf,

    #[command(flatten)]
    pub log: LogArgs,
}

impl DaemonArgs {
    /// Validates the thread count is within the range the spec allows
    /// (1..=1000), returning a descriptive error otherwise.
    pub fn validate(&self) -> anyhow::Result<()> {
        if !(1..=1000).contains(&self.threads) {
            anyhow::bail!(
                "thread count {} out of range (must be 1..=1000)",
                self.threads
            );
        }
        Ok(())
    }
}
