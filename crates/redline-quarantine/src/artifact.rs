// artifact.rs — Content-addressed blob storage.
//
// `ArtifactStore` is the seam to cold storage. Blobs are addressed by the
// SHA-256 of their bytes and are first-writer-wins: once a hash exists its
// bytes are never replaced.

use std::collections::HashMap;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::QuarantineError;

/// Lowercase hex SHA-256 of `bytes`.
pub fn content_hash(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

pub(crate) fn validate_hash(hash: &str) -> Result<(), QuarantineError> {
    let valid = hash.len() == 64 && hash.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'));
    if valid {
        Ok(())
    } else {
        Err(QuarantineError::InvalidHash(hash.to_string()))
    }
}

/// Durable byte storage keyed by content hash.
pub trait ArtifactStore: Send + Sync {
    /// Store `bytes` under `hash` unless already present.
    /// Returns true when this call wrote the blob.
    fn put_if_absent(&self, hash: &str, bytes: &[u8]) -> Result<bool, QuarantineError>;

    fn get(&self, hash: &str) -> Result<Option<Vec<u8>>, QuarantineError>;

    /// Remove a blob. Removing a missing blob is not an error.
    fn delete(&self, hash: &str) -> Result<(), QuarantineError>;
}

/// Blobs as read-only files under one directory.
pub struct FsArtifactStore {
    dir: PathBuf,
}

impl FsArtifactStore {
    pub fn new(dir: impl AsRef<Path>) -> Result<Self, QuarantineError> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir).map_err(|e| QuarantineError::io(&dir, e))?;
        Ok(Self { dir })
    }

    fn blob_path(&self, hash: &str) -> PathBuf {
        self.dir.join(hash)
    }
}

impl ArtifactStore for FsArtifactStore {
    fn put_if_absent(&self, hash: &str, bytes: &[u8]) -> Result<bool, QuarantineError> {
        let target = self.blob_path(hash);
        if target.exists() {
            return Ok(false);
        }

        // Write a private temp file, then hard-link it into place. The link
        // fails if another writer got there first, so readers never see a
        // partially written blob and the first bytes stay.
        let tmp = self.dir.join(format!(".{}.{}.tmp", hash, Uuid::new_v4()));
        let result = (|| {
            let mut file = std::fs::File::create(&tmp)?;
            file.write_all(bytes)?;
            file.sync_all()?;
            make_read_only(&tmp)?;
            std::fs::hard_link(&tmp, &target)
        })();
        let _ = std::fs::remove_file(&tmp);

        match result {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(QuarantineError::io(&target, e)),
        }
    }

    fn get(&self, hash: &str) -> Result<Option<Vec<u8>>, QuarantineError> {
        let path = self.blob_path(hash);
        match std::fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(QuarantineError::io(path, e)),
        }
    }

    fn delete(&self, hash: &str) -> Result<(), QuarantineError> {
        let path = self.blob_path(hash);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(QuarantineError::io(path, e)),
        }
    }
}

#[cfg(unix)]
fn make_read_only(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o440))
}

#[cfg(not(unix))]
fn make_read_only(path: &Path) -> std::io::Result<()> {
    let mut perms = std::fs::metadata(path)?.permissions();
    perms.set_readonly(true);
    std::fs::set_permissions(path, perms)
}

/// Blobs held in memory.
#[derive(Default)]
pub struct MemoryArtifactStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ArtifactStore for MemoryArtifactStore {
    fn put_if_absent(&self, hash: &str, bytes: &[u8]) -> Result<bool, QuarantineError> {
        let mut blobs = self.blobs.lock().map_err(|_| QuarantineError::LockPoisoned)?;
        if blobs.contains_key(hash) {
            return Ok(false);
        }
        blobs.insert(hash.to_string(), bytes.to_vec());
        Ok(true)
    }

    fn get(&self, hash: &str) -> Result<Option<Vec<u8>>, QuarantineError> {
        let blobs = self.blobs.lock().map_err(|_| QuarantineError::LockPoisoned)?;
        Ok(blobs.get(hash).cloned())
    }

    fn delete(&self, hash: &str) -> Result<(), QuarantineError> {
        let mut blobs = self.blobs.lock().map_err(|_| QuarantineError::LockPoisoned)?;
        blobs.remove(hash);
        Ok(())
    }
}
