//! The preloaded read-only file cache (external collaborator): a manifest
//! of `<key> <path>` lines read once at daemon startup, exposing only
//! `lookup(key) -> Option<&CacheEntry>`.
//!
//! The original builds a sorted array and binary-searches it, opening each
//! file descriptor once up front and failing startup outright if any path
//! doesn't open (`simplecache.c`'s `simplecache_init`). A `HashMap` built
//! once and never mutated afterward is the idiomatic equivalent and needs
//! no lock for concurrent reads (spec §5); each entry keeps its own open
//! `File` for the daemon's lifetime rather than re-opening the path on
//! every lookup, so a file deleted after startup still serves from the
//! descriptor captured at load time instead of silently flipping to a miss.

use std::collections::HashMap;
use std::fs::{self, File};
use std::os::unix::fs::FileExt;
use std::path::Path;

use anyhow::{bail, Context, Result};
use tracing::info;

/// One manifest entry: the file descriptor opened at load time and its
/// length as of that moment.
pub struct CacheEntry {
    file: File,
    len: u64,
}

impl CacheEntry {
    /// The file's length, captured once at load time.
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Reads into `buf` starting at `offset`, without touching any shared
    /// file-position state — callers track their own offset across
    /// successive calls, since the same entry's `File` may be read
    /// concurrently by more than one in-flight transaction.
    pub fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<usize> {
        Ok(self.file.read_at(buf, offset)?)
    }
}

/// Read-only map from cache key to its preopened file.
pub struct FileCacheIndex {
    entries: HashMap<String, CacheEntry>,
}

impl FileCacheIndex {
    /// Parses `manifest_path`, one `<key> <path>` record per line, opening
    /// and stat'ing every referenced file immediately. Blank lines are
    /// skipped; a line missing its path field, or naming a file that can't
    /// be opened, is a hard error — matching the original's fail-fast
    /// `simplecache_init`, since a daemon that started with a silently
    /// absent entry would serve permanent misses an operator believes are
    /// present.
    pub fn load(manifest_path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(manifest_path)
            .with_context(|| format!("failed to read manifest {manifest_path:?}"))?;

        let mut entries = HashMap::new();
        for (lineno, line) in contents.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let mut parts = line.splitn(2, ' ');
            let key = parts.next().unwrap_or_default();
            let path = parts
                .next()
                .map(str::trim)
                .ok_or_else(|| {
                    anyhow::anyhow!("manifest {manifest_path:?} line {}: missing path", lineno + 1)
                })?;
            if key.is_empty() || path.is_empty() {
                bail!(
                    "manifest {manifest_path:?} line {}: empty key or path",
                    lineno + 1
                );
            }

            let file = File::open(path)
                .with_context(|| format!("manifest {manifest_path:?} line {}: unable to open {path}", lineno + 1))?;
            let len = file
                .metadata()
                .with_context(|| format!("manifest {manifest_path:?} line {}: unable to stat {path}", lineno + 1))?
                .len();

            entries.insert(key.to_string(), CacheEntry { file, len });
        }

        info!(count = entries.len(), manifest = ?manifest_path, "loaded file cache manifest");
        Ok(Self { entries })
    }

    /// Looks up `key`, returning the preopened entry on a hit or `None` on
    /// an unknown key.
    pub fn lookup(&self, key: &str) -> Option<&CacheEntry> {
        self.entries.get(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_a_manifest_and_resolves_a_hit() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("a.txt");
        std::fs::write(&file_path, b"hello").unwrap();

        let manifest_path = dir.path().join("locals.txt");
        let mut manifest = File::create(&manifest_path).unwrap();
        writeln!(manifest, "a {}", file_path.display()).unwrap();

        let index = FileCacheIndex::load(&manifest_path).unwrap();
        let entry = index.lookup("a").expect("expected a hit");
        assert_eq!(entry.len(), 5);

        let mut buf = [0u8; 5];
        let n = entry.read_at(&mut buf, 0).unwrap();
        assert_eq!(&buf[..n], b"hello");
    }

    #[test]
    fn unknown_key_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let manifest_path = dir.path().join("locals.txt");
        File::create(&manifest_path).unwrap();

        let index = FileCacheIndex::load(&manifest_path).unwrap();
        assert!(index.lookup("nope").is_none());
    }

    #[test]
    fn rejects_a_line_missing_a_path() {
        let dir = tempfile::tempdir().unwrap();
        let manifest_path = dir.path().join("locals.txt");
        std::fs::write(&manifest_path, b"onlykey\n").unwrap();

        assert!(FileCacheIndex::load(&manifest_path).is_err());
    }

    #[test]
    fn rejects_a_manifest_entry_whose_file_is_missing() {
        let dir = tempfile::tempdir().unwrap();
        let manifest_path = dir.path().join("locals.txt");
        std::fs::write(&manifest_path, format!("a {}\n", dir.path().join("nope.txt").display())).unwrap();

        assert!(FileCacheIndex::load(&manifest_path).is_err());
    }

    #[test]
    fn read_at_allows_concurrent_reads_from_independent_offsets() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("b.txt");
        std::fs::write(&file_path, b"0123456789").unwrap();

        let manifest_path = dir.path().join("locals.txt");
        let mut manifest = File::create(&manifest_path).unwrap();
        writeln!(manifest, "b {}", file_path.display()).unwrap();
        drop(manifest);

        let index = FileCacheIndex::load(&manifest_path).unwrap();
        let entry = index.lookup("b").unwrap();

        let mut tail = [0u8; 4];
        entry.read_at(&mut tail, 6).unwrap();
        let mut head = [0u8; 4];
        entry.read_at(&mut head, 0).unwrap();
        assert_eq!(&head, b"0123");
        assert_eq!(&tail, b"6789");
    }
}
