//! The ping-pong chunked transfer protocol run over `sem_a` once a segment
//! has been leased, mapped, and a request message exchanged.
//!
//! Both `run_as_proxy` and `run_as_daemon` strictly alternate: the side
//! about to read the buffer waits, the side that just wrote it posts. After
//! a complete transaction `sem_a`'s value is back at 0 and exactly one side
//! owns the buffer at every other instant. Only `sem_a` is ever waited or
//! posted here — `sem_b` is allocated and destroyed alongside it purely for
//! lifecycle symmetry with a future bidirectional extension.

use anyhow::{anyhow, Result};
use tracing::warn;

use crate::ipc::sem::NamedSemaphore;
use crate::ipc::shm::MappedSegment;

const VERDICT_HIT: i32 = 1;
const VERDICT_MISS: i32 = -1;

/// The daemon's verdict on a lookup, exchanged in phase 1.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    Hit,
    Miss,
}

impl Verdict {
    fn to_word(self) -> i32 {
        match self {
            Verdict::Hit => VERDICT_HIT,
            Verdict::Miss => VERDICT_MISS,
        }
    }

    fn from_word(word: i32) -> Result<Self> {
        match word {
            VERDICT_HIT => Ok(Verdict::Hit),
            VERDICT_MISS => Ok(Verdict::Miss),
            other => Err(anyhow!("unexpected verdict word {other}")),
        }
    }
}

/// What happened on the proxy side of one transaction.
pub enum ProxyOutcome {
    Hit { file_len: i64, bytes_written: i64 },
    Miss,
}

/// Runs the protocol as "P".
///
/// `on_header` is called once, with the verdict and (for a hit) the file
/// length, to emit the client-facing Getfile header. `on_chunk` is called
/// once per buffer full of bytes and must return how many bytes actually
/// reached the client; a short return is logged and does not abort the
/// protocol, so the daemon is never left stranded waiting on a peer that
/// gave up mid-transfer.
pub fn run_as_proxy(
    shm: &MappedSegment,
    sem_a: &NamedSemaphore,
    mut on_header: impl FnMut(Verdict, i64) -> Result<()>,
    mut on_chunk: impl FnMut(&[u8]) -> Result<usize>,
) -> Result<ProxyOutcome> {
    // Phase 1: wait for D's verdict, then acknowledge.
    sem_a.wait()?;
    let verdict = Verdict::from_word(shm.read_i32(0))?;
    sem_a.post()?;

    if verdict == Verdict::Miss {
        on_header(Verdict::Miss, 0)?;
        return Ok(ProxyOutcome::Miss);
    }

    // Phase 3: wait for file length, emit the header, acknowledge.
    sem_a.wait()?;
    let file_len = shm.read_word(0);
    on_header(Verdict::Hit, file_len)?;
    sem_a.post()?;

    // Phases 5..5+k: each chunk is posted by D, consumed here, acknowledged.
    let segment_size = shm.len();
    let mut remaining = file_len;
    let mut bytes_written: i64 = 0;
    while remaining > 0 {
        sem_a.wait()?;
        let this_chunk = remaining.min(segment_size as i64) as usize;
        let data = shm.read_bytes(0, this_chunk);
        sem_a.post()?;
        match on_chunk(&data) {
            Ok(written) => {
                if written != this_chunk {
                    warn!(
                        expected = this_chunk,
                        actual = written,
                        "short write to client, continuing protocol to drain peer"
                    );
                }
                bytes_written += written as i64;
            }
            Err(e) => {
                warn!(error = %e, "client write failed, continuing protocol to drain peer");
            }
        }
        remaining -= this_chunk as i64;
    }

    // Final phase: wait for the zero sentinel, acknowledge.
    sem_a.wait()?;
    let sentinel = shm.read_word(0);
    if sentinel != 0 {
        return Err(anyhow!(
            "expected end-of-transfer sentinel 0, got {sentinel}"
        ));
    }
    sem_a.post()?;

    Ok(ProxyOutcome::Hit {
        file_len,
        bytes_written,
    })
}

/// Runs the protocol as "D".
///
/// `source` is called with successive chunk-sized slices to fill from the
/// cached file; it must return the number of bytes actually read (less
/// than the slice length only at end of file). Always runs the final
/// sentinel phase on a hit, including for zero-length files — a deliberate
/// difference from the original daemon, which skipped it whenever
/// `file_len` was zero.
pub fn run_as_daemon(
    shm: &MappedSegment,
    sem_a: &NamedSemaphore,
    verdict: Verdict,
    file_len: i64,
    mut source: impl FnMut(&mut [u8]) -> Result<usize>,
) -> Result<()> {
    // Phase 1: write verdict, post, wait for P's acknowledgement.
    shm.write_i32(0, verdict.to_word());
    sem_a.post()?;
    sem_a.wait()?;

    if verdict == Verdict::Miss {
        return Ok(());
    }

    // Phase 3: write length, post, wait for acknowledgement.
    shm.write_word(0, file_len);
    sem_a.post()?;
    sem_a.wait()?;

    // Phases 5..5+k: fill the buffer, post, wait for P to drain it.
    let segment_size = shm.len();
    let mut remaining = file_len;
    let mut chunk_buf = vec![0u8; segment_size];
    while remaining > 0 {
        let this_chunk = remaining.min(segment_size as i64) as usize;
        let read = source(&mut chunk_buf[..this_chunk])?;
        shm.write_bytes(0, &chunk_buf[..read]);
        sem_a.post()?;
        sem_a.wait()?;
        if read == 0 {
            break;
        }
        remaining -= read as i64;
    }

    // Final phase: always write the zero sentinel, including when the file
    // was zero bytes long and the loop above never ran.
    shm.write_word(0, 0);
    sem_a.post()?;
    sem_a.wait()?;

    Ok(())
}
