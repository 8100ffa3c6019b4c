// log.rs — Append-only JSONL audit log.
//
// One JSON object per line. Each entry is linked to the one before it via
// `previous_hash` (SHA-256 of the previous raw line) and carries a sequence
// number one greater than the previous entry's. Any insertion, deletion, or
// modification breaks one of the two and is caught by `verify_chain`.
//
// Appends arrive from many concurrent pipelines and from other processes
// (every CLI command opens its own log). Each append holds the in-process
// mutex and an exclusive advisory lock on the file. Under both, the cached
// tail is checked against the file length and re-read when another writer
// has moved it, so the file order, the seq order, and the chain order are
// always the same order.
//
// A write that fails part way is rolled back to the last complete line. A
// torn trailing line left by a crash is cut off by the next writer.

use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use fs2::FileExt;

use crate::error::AuditError;
use crate::event::AuditEntry;
use crate::hasher;
use crate::sink::AuditSink;

struct Tail {
    file: File,
    /// Hash of the last line written, linked from the next entry.
    last_hash: Option<String>,
    last_seq: u64,
    /// File length the cached state describes.
    len: u64,
}

/// Chain state recovered from the file itself.
struct Scan {
    last_hash: Option<String>,
    last_seq: u64,
    /// Length up to and including the last newline.
    complete_len: u64,
}

/// A durable, append-only audit log backed by a JSONL file.
pub struct AuditLog {
    path: PathBuf,
    tail: Mutex<Tail>,
}

impl AuditLog {
    /// Open (or create) an audit log at the given path.
    ///
    /// If the file already exists, the last entry is read back so new entries
    /// continue both the hash chain and the sequence.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, AuditError> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|source| AuditError::OpenFailed {
                    path: path.clone(),
                    source,
                })?;
            }
        }

        let scan = if path.exists() {
            Self::scan(&path)?
        } else {
            Scan {
                last_hash: None,
                last_seq: 0,
                complete_len: 0,
            }
        };

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| AuditError::OpenFailed {
                path: path.clone(),
                source,
            })?;

        tracing::debug!(path = %path.display(), last_seq = scan.last_seq, "audit log opened");

        Ok(Self {
            path,
            tail: Mutex::new(Tail {
                file,
                last_hash: scan.last_hash,
                last_seq: scan.last_seq,
                len: scan.complete_len,
            }),
        })
    }

    /// Return the path to the log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sequence number of the most recent entry written through this handle
    /// or found at open (0 when empty).
    pub fn last_seq(&self) -> Result<u64, AuditError> {
        let tail = self.tail.lock().map_err(|_| AuditError::LockPoisoned)?;
        Ok(tail.last_seq)
    }

    /// Read all entries from a log file, oldest first.
    pub fn read_all(path: impl AsRef<Path>) -> Result<Vec<AuditEntry>, AuditError> {
        let mut entries = Vec::new();
        for line in Self::lines(path.as_ref())? {
            entries.push(serde_json::from_str(&line?)?);
        }
        Ok(entries)
    }

    /// Read the last `n` entries, oldest first.
    pub fn tail(path: impl AsRef<Path>, n: usize) -> Result<Vec<AuditEntry>, AuditError> {
        let mut window: VecDeque<String> = VecDeque::with_capacity(n);
        for line in Self::lines(path.as_ref())? {
            if window.len() == n {
                window.pop_front();
            }
            if n > 0 {
                window.push_back(line?);
            }
        }
        window
            .iter()
            .map(|line| serde_json::from_str(line).map_err(AuditError::from))
            .collect()
    }

    /// Verify the hash chain and sequence numbering of a log file.
    ///
    /// Returns the number of entries verified, or the first violation found.
    pub fn verify_chain(path: impl AsRef<Path>) -> Result<usize, AuditError> {
        let mut previous_hash: Option<String> = None;
        let mut expected_seq = 1u64;
        let mut count = 0usize;

        for (index, line) in Self::lines(path.as_ref())?.enumerate() {
            let line = line?;
            let entry: AuditEntry = serde_json::from_str(&line)?;
            let line_no = index + 1;

            if entry.previous_hash != previous_hash {
                return Err(AuditError::IntegrityViolation {
                    line: line_no,
                    expected: previous_hash.unwrap_or_else(|| "None".to_string()),
                    actual: entry.previous_hash.unwrap_or_else(|| "None".to_string()),
                });
            }
            if entry.seq != expected_seq {
                return Err(AuditError::SequenceGap {
                    line: line_no,
                    expected: expected_seq,
                    actual: entry.seq,
                });
            }

            // Hash the raw line, not a re-serialization.
            previous_hash = Some(hasher::hash_str(&line));
            expected_seq += 1;
            count += 1;
        }

        Ok(count)
    }

    /// Non-blank lines of a log file.
    fn lines(path: &Path) -> Result<impl Iterator<Item = std::io::Result<String>>, AuditError> {
        let file = File::open(path).map_err(|source| AuditError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(BufReader::new(file)
            .lines()
            .filter(|line| !matches!(line, Ok(l) if l.trim().is_empty())))
    }

    /// Read the chain state from disk, noting where the last complete line
    /// ends.
    fn scan(path: &Path) -> Result<Scan, AuditError> {
        let file = File::open(path).map_err(|source| AuditError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        let mut reader = BufReader::new(file);
        let mut buf = Vec::new();
        let mut offset = 0u64;
        let mut complete_len = 0u64;
        let mut last_line: Option<Vec<u8>> = None;

        loop {
            buf.clear();
            let n = reader.read_until(b'\n', &mut buf)?;
            if n == 0 || buf.last() != Some(&b'\n') {
                break;
            }
            offset += n as u64;
            complete_len = offset;
            let line = &buf[..n - 1];
            if !line.iter().all(u8::is_ascii_whitespace) {
                last_line = Some(line.to_vec());
            }
        }

        match last_line {
            Some(bytes) => {
                let line = String::from_utf8(bytes).map_err(|e| {
                    AuditError::WriteFailed(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
                })?;
                let entry: AuditEntry = serde_json::from_str(&line)?;
                Ok(Scan {
                    last_hash: Some(hasher::hash_str(&line)),
                    last_seq: entry.seq,
                    complete_len,
                })
            }
            None => Ok(Scan {
                last_hash: None,
                last_seq: 0,
                complete_len,
            }),
        }
    }

    /// Append while holding the file lock.
    fn append_locked(&self, tail: &mut Tail, mut entry: AuditEntry) -> Result<u64, AuditError> {
        let on_disk = tail.file.metadata()?.len();
        if on_disk != tail.len {
            let scan = Self::scan(&self.path)?;
            if scan.complete_len < on_disk {
                tracing::warn!(
                    path = %self.path.display(),
                    torn_bytes = on_disk - scan.complete_len,
                    "discarding torn trailing audit line"
                );
                tail.file.set_len(scan.complete_len)?;
            }
            tail.last_hash = scan.last_hash;
            tail.last_seq = scan.last_seq;
            tail.len = scan.complete_len;
        }

        entry.seq = tail.last_seq + 1;
        entry.previous_hash = tail.last_hash.clone();

        let json = serde_json::to_string(&entry)?;
        let mut line = json.clone().into_bytes();
        line.push(b'\n');

        if let Err(e) = tail.file.write_all(&line).and_then(|()| tail.file.sync_data()) {
            if let Err(truncate) = tail.file.set_len(tail.len) {
                tracing::error!(
                    path = %self.path.display(),
                    error = %truncate,
                    "could not roll back failed audit append"
                );
            }
            return Err(e.into());
        }

        tail.last_hash = Some(hasher::hash_str(&json));
        tail.last_seq = entry.seq;
        tail.len += line.len() as u64;

        tracing::debug!(
            seq = entry.seq,
            action_id = %entry.action_id,
            outcome = entry.outcome.label(),
            "audit entry appended"
        );

        Ok(entry.seq)
    }
}

impl AuditSink for AuditLog {
    /// Append an entry and fsync before returning.
    ///
    /// On error nothing is left behind: the file is cut back to its last
    /// complete line and the chain state is unchanged.
    fn append(&self, entry: AuditEntry) -> Result<u64, AuditError> {
        let mut tail = self.tail.lock().map_err(|_| AuditError::LockPoisoned)?;
        tail.file.lock_exclusive()?;
        let result = self.append_locked(&mut tail, entry);
        if let Err(e) = FileExt::unlock(&tail.file) {
            tracing::warn!(path = %self.path.display(), error = %e, "audit log unlock failed");
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::AuditOutcome;
    use redline_policy::{Action, ActionKind};
    use serde_json::json;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn entry(cmd: &str) -> AuditEntry {
        let action = Action::new(ActionKind::ShellExec, json!(cmd), "session-1");
        AuditEntry::for_action(&action, AuditOutcome::Rejected)
    }

    #[test]
    fn append_assigns_monotonic_seq() {
        let dir = tempdir().unwrap();
        let log = AuditLog::open(dir.path().join("audit.jsonl")).unwrap();
        assert_eq!(log.append(entry("a")).unwrap(), 1);
        assert_eq!(log.append(entry("b")).unwrap(), 2);
        assert_eq!(log.append(entry("c")).unwrap(), 3);
        assert_eq!(log.last_seq().unwrap(), 3);
    }

    #[test]
    fn append_and_read_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let log = AuditLog::open(&path).unwrap();
        log.append(entry("ls")).unwrap();
        log.append(entry("pwd")).unwrap();

        let entries = AuditLog::read_all(&path).unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries[0].previous_hash.is_none());
        assert!(entries[1].previous_hash.is_some());
        assert_eq!(entries[1].seq, 2);
    }

    #[test]
    fn reopen_continues_chain_and_sequence() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("audit.jsonl");
        {
            let log = AuditLog::open(&path).unwrap();
            log.append(entry("one")).unwrap();
        }
        {
            let log = AuditLog::open(&path).unwrap();
            assert_eq!(log.append(entry("two")).unwrap(), 2);
        }
        assert_eq!(AuditLog::verify_chain(&path).unwrap(), 2);
    }

    #[test]
    fn tampering_is_detected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let log = AuditLog::open(&path).unwrap();
        for cmd in ["a", "b", "c"] {
            log.append(entry(cmd)).unwrap();
        }

        // Edit the middle line: the third entry's link no longer matches.
        let text = std::fs::read_to_string(&path).unwrap();
        let mut lines: Vec<String> = text.lines().map(String::from).collect();
        lines[1] = lines[1].replace("session-1", "session-X");
        std::fs::write(&path, lines.join("\n") + "\n").unwrap();

        assert!(matches!(
            AuditLog::verify_chain(&path),
            Err(AuditError::IntegrityViolation { line: 3, .. })
        ));
    }

    #[test]
    fn deletion_is_detected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let log = AuditLog::open(&path).unwrap();
        for cmd in ["a", "b", "c"] {
            log.append(entry(cmd)).unwrap();
        }
        let text = std::fs::read_to_string(&path).unwrap();
        let kept: Vec<&str> = text.lines().enumerate().filter(|(i, _)| *i != 1).map(|(_, l)| l).collect();
        std::fs::write(&path, kept.join("\n") + "\n").unwrap();

        assert!(AuditLog::verify_chain(&path).is_err());
    }

    #[test]
    fn separate_handles_share_one_chain() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let first = AuditLog::open(&path).unwrap();
        let second = AuditLog::open(&path).unwrap();

        assert_eq!(first.append(entry("submit")).unwrap(), 1);
        assert_eq!(second.append(entry("approve")).unwrap(), 2);
        assert_eq!(first.append(entry("execute")).unwrap(), 3);
        assert_eq!(AuditLog::verify_chain(&path).unwrap(), 3);
    }

    #[test]
    fn handles_in_parallel_threads_never_reuse_a_seq() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let log = AuditLog::open(&path).unwrap();
                std::thread::spawn(move || {
                    for j in 0..10 {
                        log.append(entry(&format!("proc-{i}-{j}"))).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(AuditLog::verify_chain(&path).unwrap(), 40);
    }

    #[test]
    fn torn_trailing_line_is_discarded() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let log = AuditLog::open(&path).unwrap();
        log.append(entry("a")).unwrap();
        log.append(entry("b")).unwrap();

        // A write that died half way through a line.
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(br#"{"seq":3,"entry_id":"#).unwrap();
        drop(file);

        let reopened = AuditLog::open(&path).unwrap();
        assert_eq!(reopened.append(entry("c")).unwrap(), 3);
        assert_eq!(log.append(entry("d")).unwrap(), 4);
        assert_eq!(AuditLog::verify_chain(&path).unwrap(), 4);
    }

    #[test]
    fn tail_returns_last_entries_in_order() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let log = AuditLog::open(&path).unwrap();
        for cmd in ["a", "b", "c", "d"] {
            log.append(entry(cmd)).unwrap();
        }
        let last = AuditLog::tail(&path, 2).unwrap();
        assert_eq!(last.iter().map(|e| e.seq).collect::<Vec<_>>(), vec![3, 4]);
        assert!(AuditLog::tail(&path, 0).unwrap().is_empty());
    }

    #[test]
    fn concurrent_appends_serialize() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let log = Arc::new(AuditLog::open(&path).unwrap());

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let log = Arc::clone(&log);
                std::thread::spawn(move || {
                    for j in 0..10 {
                        log.append(entry(&format!("cmd-{i}-{j}"))).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(AuditLog::verify_chain(&path).unwrap(), 80);
        assert_eq!(log.last_seq().unwrap(), 80);
    }
}
