//! Provider content-hash computation.
//!
//! The storage service reports a `content_hash` for every committed file:
//! the hex SHA-256 of the concatenated SHA-256 digests of each 4 MiB block.
//! Computing the same hash locally while streaming lets the uploader verify
//! the committed bytes without a second read of the file.

use sha2::{Digest, Sha256};

/// Block size the provider hashes over, independent of the upload chunk size.
pub const HASH_BLOCK_SIZE: usize = 4 * 1024 * 1024;

/// Incremental content hasher. Feed it the file bytes in any chunking;
/// block boundaries are tracked internally.
pub struct ContentHasher {
    overall: Sha256,
    block: Sha256,
    block_filled: usize,
}

impl ContentHasher {
    pub fn new() -> Self {
        Self {
            overall: Sha256::new(),
            block: Sha256::new(),
            block_filled: 0,
        }
    }

    pub fn update(&mut self, mut data: &[u8]) {
        while !data.is_empty() {
            let room = HASH_BLOCK_SIZE - self.block_filled;
            let take = room.min(data.len());
            self.block.update(&data[..take]);
            self.block_filled += take;
            data = &data[take..];

            if self.block_filled == HASH_BLOCK_SIZE {
                let digest = std::mem::replace(&mut self.block, Sha256::new()).finalize();
                self.overall.update(digest);
                self.block_filled = 0;
            }
        }
    }

    /// Hex digest over everything fed so far. A trailing partial block is
    /// hashed as its own block; zero input hashes to the empty digest.
    pub fn finalize(mut self) -> String {
        if self.block_filled > 0 {
            let digest = self.block.finalize();
            self.overall.update(digest);
        }
        hex_encode(&self.overall.finalize())
    }
}

impl Default for ContentHasher {
    fn default() -> Self {
        Self::new()
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{:02x}", b));
    }
    out
}

/// Hash a complete in-memory buffer.
pub fn content_hash(data: &[u8]) -> String {
    let mut hasher = ContentHasher::new();
    hasher.update(data);
    hasher.finalize()
}
