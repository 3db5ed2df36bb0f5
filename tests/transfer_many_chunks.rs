//! A hit whose file is much larger than the segment size, forcing the
//! ping-pong protocol through several chunk phases (spec §8 scenario:
//! hit-many-chunks) rather than the single-chunk happy path already
//! covered by the unit tests in `ipc::transfer`.

#[cfg(target_os = "linux")]
use gfcache_ipc::ipc::{
    sem::NamedSemaphore,
    shm::{self, MappedSegment},
    transfer::{run_as_daemon, run_as_proxy, ProxyOutcome, Verdict},
};
#[cfg(target_os = "linux")]
use nix::sys::stat::Mode;

#[cfg(target_os = "linux")]
#[test]
fn hit_spanning_many_chunks_delivers_every_byte_in_order() {
    let shm_name = format!("test_many_chunks_shm_{}", std::process::id());
    let sem_name = format!("test_many_chunks_sem_a_{}", std::process::id());
    let segment_size = 16usize;

    let daemon_shm =
        MappedSegment::create(&shm_name, segment_size, Mode::from_bits_truncate(0o666)).unwrap();
    let sem_a = NamedSemaphore::create(&sem_name, 0o666).unwrap();
    let sem_for_proxy = NamedSemaphore::open(&sem_name).unwrap();
    let proxy_shm = MappedSegment::open(&shm_name, segment_size).unwrap();

    // Deliberately not a multiple of segment_size, so the last chunk is
    // short.
    let file: Vec<u8> = (0..200u32).map(|i| (i % 251) as u8).collect();
    let file_len = file.len() as i64;
    let expected = file.clone();

    let daemon_thread = std::thread::spawn(move || {
        let mut offset = 0usize;
        run_as_daemon(&daemon_shm, &sem_a, Verdict::Hit, file_len, |buf| {
            let n = buf.len().min(file.len() - offset);
            buf[..n].copy_from_slice(&file[offset..offset + n]);
            offset += n;
            Ok(n)
        })
        .unwrap();
    });

    let mut received = Vec::new();
    let mut chunk_count = 0usize;
    let outcome = run_as_proxy(
        &proxy_shm,
        &sem_for_proxy,
        |verdict, len| {
            assert_eq!(verdict, Verdict::Hit);
            assert_eq!(len, file_len);
            Ok(())
        },
        |chunk| {
            chunk_count += 1;
            received.extend_from_slice(chunk);
            Ok(chunk.len())
        },
    )
    .unwrap();

    daemon_thread.join().unwrap();

    match outcome {
        ProxyOutcome::Hit { file_len: l, bytes_written } => {
            assert_eq!(l, file_len);
            assert_eq!(bytes_written, file_len);
        }
        ProxyOutcome::Miss => panic!("expected a hit"),
    }
    assert_eq!(received, expected);
    assert!(chunk_count > 1, "expected the transfer to span multiple chunks");
    assert_eq!(sem_for_proxy.value().unwrap(), 0);

    let _ = sem_for_proxy.unlink();
    let _ = shm::unlink(&shm_name);
}
