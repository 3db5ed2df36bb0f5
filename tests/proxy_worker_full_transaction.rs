//! Drives `proxy::worker::handle_request` end to end through a real
//! `SegmentPool`, the real named semaphores, the real shared-memory
//! mapping, and the real request queue — the path the unit tests around
//! `ipc::transfer` and `ipc::segment` individually don't exercise together.
//!
//! This is also the regression test for the per-transaction teardown
//! contract: the shared-memory segment must still be mapped and unlinkable
//! by name after the transaction (it's held for the pool's lifetime), while
//! both named semaphores must already be gone.
//!
//! Touches the real fixed-name message queue, so it's gated the same way
//! as the deferred-startup test.

#[cfg(target_os = "linux")]
use std::io::{BufRead, BufReader, Read, Write};
#[cfg(target_os = "linux")]
use std::net::{TcpListener, TcpStream};
#[cfg(target_os = "linux")]
use std::sync::Arc;

#[cfg(target_os = "linux")]
use gfcache_ipc::ipc::{
    request::{self, RequestMessage},
    segment::SegmentPool,
    sem::NamedSemaphore,
    shm::MappedSegment,
    transfer::{run_as_daemon, Verdict},
};
#[cfg(target_os = "linux")]
use gfcache_ipc::proxy::{getfile::GetfileReply, worker};

#[cfg(target_os = "linux")]
fn fake_daemon_once(body: &'static [u8]) {
    let mqd = request::open_daemon_queue().expect("daemon queue should be creatable");
    let msg: RequestMessage = request::receive(&mqd).expect("expected one request");
    request::close(mqd).unwrap();

    let shm = MappedSegment::open(&msg.shm_name, msg.segment_size as usize).unwrap();
    let sem_a = NamedSemaphore::open(&msg.sem_a_name).unwrap();
    let _sem_b = NamedSemaphore::open(&msg.sem_b_name).unwrap();

    let mut offset = 0usize;
    run_as_daemon(&shm, &sem_a, Verdict::Hit, body.len() as i64, |buf| {
        let n = buf.len().min(body.len() - offset);
        buf[..n].copy_from_slice(&body[offset..offset + n]);
        offset += n;
        Ok(n)
    })
    .unwrap();
}

#[cfg(target_os = "linux")]
#[test]
fn handle_request_completes_a_hit_and_tears_down_only_the_semaphores() {
    if std::env::var("GFCACHE_RUN_MQ_TESTS").unwrap_or_default() != "1" {
        eprintln!("Skipping full-transaction test: set GFCACHE_RUN_MQ_TESTS=1 to enable");
        return;
    }
    if !std::path::Path::new("/dev/mqueue").is_dir() {
        eprintln!("Skipping full-transaction test: /dev/mqueue not present");
        return;
    }

    let _ = request::unlink();

    let pool = Arc::new(SegmentPool::new(1, 64).unwrap());

    let body: &'static [u8] = b"hello from the fake daemon";
    let daemon_thread = std::thread::spawn(move || fake_daemon_once(body));

    // Give the fake daemon a moment to create the queue before the worker's
    // retry loop starts probing for it.
    std::thread::sleep(std::time::Duration::from_millis(50));

    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let client_thread = std::thread::spawn(move || {
        let mut client = TcpStream::connect(addr).unwrap();
        client.write_all(b"GETFILE GET /hello.txt\r\n\r\n").unwrap();
        client
    });

    let (server_stream, _) = listener.accept().unwrap();
    let mut reply = GetfileReply::from_stream(server_stream);

    worker::handle_request(&pool, "/hello.txt", &mut reply).expect("transaction should succeed");
    daemon_thread.join().unwrap();
    // Dropping the reply closes the server side of the socket, which is
    // what lets the client's read_to_end below observe EOF.
    drop(reply);

    let client = client_thread.join().unwrap();
    let mut reader = BufReader::new(client);
    let mut header = String::new();
    reader.read_line(&mut header).unwrap();
    assert_eq!(header.trim_end(), format!("GETFILE OK {}", body.len()));
    let mut blank = String::new();
    reader.read_line(&mut blank).unwrap();
    assert_eq!(blank, "\r\n");
    let mut received = Vec::new();
    reader.read_to_end(&mut received).unwrap();
    assert_eq!(received, body);

    assert_eq!(pool.leased_count(), 0);

    // The shared-memory segment is held for the pool's lifetime: it must
    // still be mappable by its well-known name after the transaction.
    MappedSegment::open("mem_0", 64).expect("shm segment should survive the transaction");

    // Both semaphores are per-transaction and must already be gone.
    assert!(NamedSemaphore::open("sem_0_a").is_err());
    assert!(NamedSemaphore::open("sem_0_b").is_err());

    pool.shutdown();
    let _ = request::unlink();
}
