//! Request-channel framing: the packed `RequestMessage` sent from a proxy
//! worker to the daemon over the named message queue, plus the queue
//! open/retry helpers both sides use.

use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use nix::errno::Errno;
use nix::mqueue::{mq_close, mq_open, mq_receive, mq_send, mq_unlink, MQ_OFlag, MqAttr, MqdT};
use nix::sys::stat::Mode;
use tracing::info;

/// Fixed, system-wide name of the request queue.
pub const QUEUE_NAME: &str = "/simplecache_mq";
/// Maximum number of messages the queue will hold at once.
pub const QUEUE_MAXMSG: i64 = 10;
/// Maximum size, in bytes, of a single queue message.
pub const QUEUE_MSGSIZE: i64 = 512;

const NAME_FIELD_LEN: usize = 12;
const HEADER_LEN: usize = NAME_FIELD_LEN * 3 + 4 + 4;
const MAX_PATH_LEN: usize = QUEUE_MSGSIZE as usize - HEADER_LEN;

/// One request, as laid out on the wire: three fixed 12-byte name fields,
/// two native-endian 32-bit integers, then the path bytes.
///
/// Hand-packed rather than run through `serde`/`bincode`: the far side
/// parses it by raw offset exactly as a reinterpreted C struct would be, so
/// this has to match that layout byte for byte rather than carry any
/// self-describing framing of its own.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestMessage {
    pub shm_name: String,
    pub sem_a_name: String,
    pub sem_b_name: String,
    pub segment_size: i32,
    pub path: String,
}

impl RequestMessage {
    /// Packs this request into its wire representation.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let path_bytes = self.path.as_bytes();
        // path_len includes the trailing NUL.
        let path_len = path_bytes.len() + 1;
        if path_len > MAX_PATH_LEN {
            bail!(
                "path {:?} too long for request message ({} > {})",
                self.path,
                path_len,
                MAX_PATH_LEN
            );
        }
        let mut buf = Vec::with_capacity(HEADER_LEN + path_len);
        buf.extend_from_slice(&pack_name(&self.shm_name)?);
        buf.extend_from_slice(&pack_name(&self.sem_a_name)?);
        buf.extend_from_slice(&pack_name(&self.sem_b_name)?);
        buf.extend_from_slice(&self.segment_size.to_ne_bytes());
        buf.extend_from_slice(&(path_len as i32).to_ne_bytes());
        buf.extend_from_slice(path_bytes);
        buf.push(0);
        Ok(buf)
    }

    /// Unpacks a request from its raw wire bytes.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < HEADER_LEN {
            bail!("request message too short: {} bytes", buf.len());
        }
        let shm_name = unpack_name(&buf[0..12]);
        let sem_a_name = unpack_name(&buf[12..24]);
        let sem_b_name = unpack_name(&buf[24..36]);
        let segment_size = i32::from_ne_bytes(buf[36..40].try_into().unwrap());
        let path_len = i32::from_ne_bytes(buf[40..44].try_into().unwrap());
        if path_len < 1 {
            bail!("request message has non-positive path_len {path_len}");
        }
        let path_len = path_len as usize;
        let path_end = HEADER_LEN + path_len;
        if buf.len() < path_end {
            bail!(
                "request message truncated: declared path_len {path_len}, have {} bytes after header",
                buf.len() - HEADER_LEN
            );
        }
        let path_field = &buf[HEADER_LEN..path_end];
        let nul_at = path_field
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(path_field.len());
        let path = String::from_utf8_lossy(&path_field[..nul_at]).into_owned();
        Ok(Self {
            shm_name,
            sem_a_name,
            sem_b_name,
            segment_size,
            path,
        })
    }
}

fn pack_name(name: &str) -> Result<[u8; NAME_FIELD_LEN]> {
    let bytes = name.as_bytes();
    if bytes.len() >= NAME_FIELD_LEN {
        bail!(
            "name {:?} does not fit in a {}-byte field",
            name,
            NAME_FIELD_LEN
        );
    }
    let mut field = [0u8; NAME_FIELD_LEN];
    field[..bytes.len()].copy_from_slice(bytes);
    Ok(field)
}

fn unpack_name(field: &[u8]) -> String {
    let nul_at = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..nul_at]).into_owned()
}

/// Opens the request queue for the daemon (creator) side: `O_CREAT|O_RDONLY`,
/// unlinking any previous instance first so restart is idempotent.
pub fn open_daemon_queue() -> Result<MqdT> {
    let _ = mq_unlink(QUEUE_NAME);
    let attr = MqAttr::new(0, QUEUE_MAXMSG, QUEUE_MSGSIZE, 0);
    mq_open(
        QUEUE_NAME,
        MQ_OFlag::O_CREAT | MQ_OFlag::O_RDONLY,
        Mode::from_bits_truncate(0o777),
        Some(&attr),
    )
    .context("mq_open(creator) failed")
}

/// Opens the request queue for a proxy worker (`O_WRONLY`), retrying with a
/// bounded exponential back-off while the daemon hasn't created it yet.
/// This is the only coupling the protocol tolerates startup-order skew on.
pub fn open_proxy_queue_with_retry(max_attempts: u32) -> Result<MqdT> {
    let mut delay = Duration::from_millis(250);
    let cap = Duration::from_secs(2);
    for attempt in 1..=max_attempts {
        match mq_open(QUEUE_NAME, MQ_OFlag::O_WRONLY, Mode::empty(), None) {
            Ok(mqd) => return Ok(mqd),
            Err(Errno::ENOENT) | Err(Errno::EACCES) => {
                info!(attempt, "waiting for simplecached");
                std::thread::sleep(delay);
                delay = (delay * 2).min(cap);
            }
            Err(e) => return Err(anyhow!("mq_open(proxy) failed: {e}")),
        }
    }
    bail!("request queue {QUEUE_NAME} never appeared after {max_attempts} attempts")
}

/// Sends one encoded request. A failure here is fatal for the request: the
/// caller must still release its leased segment afterward.
pub fn send(mqd: &MqdT, msg: &RequestMessage) -> Result<()> {
    let encoded = msg.encode()?;
    mq_send(mqd, &encoded, 0).context("mq_send failed")
}

/// Blocks until one request is available and returns its decoded form.
pub fn receive(mqd: &MqdT) -> Result<RequestMessage> {
    let mut buf = vec![0u8; QUEUE_MSGSIZE as usize];
    let mut prio = 0u32;
    let received = mq_receive(mqd, &mut buf, &mut prio).context("mq_receive failed")?;
    RequestMessage::decode(&buf[..received])
}

/// Closes this process's queue descriptor.
pub fn close(mqd: MqdT) -> Result<()> {
    mq_close(mqd).context("mq_close failed")
}

/// Unlinks the request-queue name. Called by the daemon at shutdown.
pub fn unlink() -> Result<()> {
    match mq_unlink(QUEUE_NAME) {
        Ok(()) => {
            info!(name = QUEUE_NAME, "message queue removed from system");
            Ok(())
        }
        Err(Errno::ENOENT) => Ok(()),
        Err(e) => Err(anyhow!("mq_unlink({QUEUE_NAME}) failed: {e}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_request() {
        let msg = RequestMessage {
            shm_name: "mem_0".to_string(),
            sem_a_name: "sem_0_a".to_string(),
            sem_b_name: "sem_0_b".to_string(),
            segment_size: 1024,
            path: "/images/a.jpg".to_string(),
        };
        let encoded = msg.encode().unwrap();
        assert!(encoded.len() as i64 <= QUEUE_MSGSIZE);
        let decoded = RequestMessage::decode(&encoded).unwrap();
        assert_eq!(msg, decoded);
    }

    #[test]
    fn rejects_a_name_too_long_for_its_field() {
        let msg = RequestMessage {
            shm_name: "mem_much_too_long_to_fit".to_string(),
            sem_a_name: "sem_0_a".to_string(),
            sem_b_name: "sem_0_b".to_string(),
            segment_size: 1024,
            path: "/a".to_string(),
        };
        assert!(msg.encode().is_err());
    }

    #[test]
    fn rejects_a_path_too_long_for_the_message() {
        let msg = RequestMessage {
            shm_name: "mem_0".to_string(),
            sem_a_name: "sem_0_a".to_string(),
            sem_b_name: "sem_0_b".to_string(),
            segment_size: 1024,
            path: "x".repeat(500),
        };
        assert!(msg.encode().is_err());
    }
}
