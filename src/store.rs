//! Per-room durable update log.
//!
//! Each room persists its replication updates to one append-only file under
//! the data directory, as `u32` little-endian length-prefixed records. The
//! log is written as updates arrive and read back once, at room warm-up.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;

#[derive(Error, Debug)]
pub enum StoreError {
    /// No log exists yet. This is the "no persisted history" case, tolerated
    /// by room warm-up.
    #[error("no persisted history at {0}")]
    NotFound(PathBuf),

    #[error("update log {path} is truncated at byte {offset}")]
    Corrupt { path: PathBuf, offset: u64 },

    #[error("update log I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Map a client-supplied room name to something safe to use as a file stem.
pub fn sanitize_room_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Append-only update log for one room.
#[derive(Debug, Clone)]
pub struct UpdateStore {
    path: PathBuf,
}

impl UpdateStore {
    pub fn for_room(data_dir: &Path, room: &str) -> Self {
        Self {
            path: data_dir.join(format!("{}.updates", sanitize_room_name(room))),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one update record, creating the log on first write.
    pub async fn append(&self, update: &[u8]) -> Result<(), StoreError> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        let len = u32::try_from(update.len()).map_err(|_| {
            StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "update larger than u32::MAX bytes",
            ))
        })?;
        file.write_all(&len.to_le_bytes()).await?;
        file.write_all(update).await?;
        file.flush().await?;
        Ok(())
    }

    /// Read every persisted update, in append order.
    pub async fn load_all(&self) -> Result<Vec<Vec<u8>>, StoreError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(self.path.clone()));
            }
            Err(e) => return Err(e.into()),
        };

        let mut updates = Vec::new();
        let mut offset = 0usize;
        while offset < bytes.len() {
            let len = match bytes.get(offset..offset + 4) {
                Some(&[a, b, c, d]) => u32::from_le_bytes([a, b, c, d]) as usize,
                _ => {
                    return Err(StoreError::Corrupt {
                        path: self.path.clone(),
                        offset: offset as u64,
                    });
                }
            };
            let start = offset + 4;
            let Some(record) = bytes.get(start..start + len) else {
                return Err(StoreError::Corrupt {
                    path: self.path.clone(),
                    offset: offset as u64,
                });
            };
            updates.push(record.to_vec());
            offset = start + len;
        }
        Ok(updates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn room_names_are_sanitized() {
        assert_eq!(sanitize_room_name("notes"), "notes");
        assert_eq!(sanitize_room_name("a/b\\c"), "a_b_c");
        assert_eq!(sanitize_room_name("../etc/passwd"), ".._etc_passwd");
        assert_eq!(sanitize_room_name("room 1 ✨"), "room_1__");
    }

    #[tokio::test]
    async fn append_then_load_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let store = UpdateStore::for_room(dir.path(), "notes");

        store.append(b"first").await.unwrap();
        store.append(b"").await.unwrap();
        store.append(&[0xde, 0xad, 0xbe, 0xef]).await.unwrap();

        let updates = store.load_all().await.unwrap();
        assert_eq!(
            updates,
            vec![b"first".to_vec(), Vec::new(), vec![0xde, 0xad, 0xbe, 0xef]]
        );
    }

    #[tokio::test]
    async fn missing_log_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = UpdateStore::for_room(dir.path(), "never-seen");
        assert!(matches!(
            store.load_all().await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn truncated_record_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let store = UpdateStore::for_room(dir.path(), "torn");
        store.append(b"complete").await.unwrap();

        // Simulate a partial write: a length header promising more bytes
        // than the file holds.
        let mut bytes = tokio::fs::read(store.path()).await.unwrap();
        bytes.extend_from_slice(&100u32.to_le_bytes());
        bytes.extend_from_slice(b"short");
        tokio::fs::write(store.path(), &bytes).await.unwrap();

        assert!(matches!(
            store.load_all().await,
            Err(StoreError::Corrupt { .. })
        ));
    }

    #[tokio::test]
    async fn truncated_header_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let store = UpdateStore::for_room(dir.path(), "torn-header");
        store.append(b"complete").await.unwrap();

        // Fewer than four trailing bytes cannot be a length header.
        let mut bytes = tokio::fs::read(store.path()).await.unwrap();
        bytes.extend_from_slice(&[1, 0]);
        tokio::fs::write(store.path(), &bytes).await.unwrap();

        assert!(matches!(
            store.load_all().await,
            Err(StoreError::Corrupt { .. })
        ));
    }

    #[tokio::test]
    async fn same_name_maps_to_same_log() {
        let dir = tempfile::tempdir().unwrap();
        let a = UpdateStore::for_room(dir.path(), "shared");
        let b = UpdateStore::for_room(dir.path(), "shared");
        a.append(b"from-a").await.unwrap();
        assert_eq!(b.load_all().await.unwrap(), vec![b"from-a".to_vec()]);
    }
}
