//! Session-based chunked file transfer.
//!
//! One local file becomes one destination object. Files at or below the
//! chunk size go through the single-call upload; anything larger is streamed
//! through an upload session: start with the first chunk, append while more
//! than a chunk remains, and commit the final chunk with exactly one finish
//! call. Chunk boundaries are derived from the absolute byte offset, so no
//! bytes are skipped or duplicated.
//!
//! Transport errors abort the whole transfer; the caller retries by invoking
//! this again, which reopens the file from the start.

use crate::content_hash::ContentHasher;
use crate::error::{BackupError, BackupResult};
use crate::storage_client::ObjectStorage;
use std::path::Path;
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tracing::debug;

/// Default chunk size: 8 MiB.
pub const DEFAULT_CHUNK_SIZE: u64 = 8 * 1024 * 1024;

/// Transfer `local_path` (of known `file_size` bytes) to `dest_path`.
///
/// The destination becomes visible only once the final call succeeds. When
/// the commit response reports a content hash, it is checked against the
/// hash computed while streaming.
pub async fn transfer_file(
    storage: &dyn ObjectStorage,
    local_path: &Path,
    file_size: u64,
    dest_path: &str,
    chunk_size: u64,
) -> BackupResult<()> {
    let mut hasher = ContentHasher::new();

    let committed = if file_size <= chunk_size {
        // Single-call path; also handles the empty file
        let data = tokio::fs::read(local_path).await?;
        hasher.update(&data);
        storage.upload_small(dest_path, data).await?
    } else {
        let mut file = File::open(local_path).await?;

        let first_chunk = read_chunk(&mut file, chunk_size as usize).await?;
        hasher.update(&first_chunk);
        let mut offset = first_chunk.len() as u64;
        let session_id = storage.start_session(first_chunk).await?;

        loop {
            let remaining = file_size - offset;
            if remaining <= chunk_size {
                let chunk = read_chunk(&mut file, remaining as usize).await?;
                hasher.update(&chunk);
                let metadata = storage
                    .finish_session(&session_id, offset, chunk, dest_path)
                    .await?;
                break metadata;
            }

            let chunk = read_chunk(&mut file, chunk_size as usize).await?;
            hasher.update(&chunk);
            storage.append_session(&session_id, offset, chunk).await?;
            offset += chunk_size;
        }
    };

    if let Some(remote_hash) = committed.content_hash {
        let local_hash = hasher.finalize();
        if local_hash != remote_hash {
            return Err(BackupError::HashMismatch {
                path: dest_path.to_string(),
                local: local_hash,
                remote: remote_hash,
            });
        }
    }

    debug!("transferred {} ({file_size} bytes) to {dest_path}", local_path.display());
    Ok(())
}

/// Read exactly `len` bytes. A file shorter than its declared size surfaces
/// as an I/O error and fails the attempt.
async fn read_chunk(file: &mut File, len: usize) -> BackupResult<Vec<u8>> {
    let mut buf = vec![0u8; len];
    file.read_exact(&mut buf).await?;
    Ok(buf)
}
