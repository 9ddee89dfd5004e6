//! Content digest computation
//!
//! A file's fingerprint is the blake3 hash of its bytes, hex-encoded to 64
//! lowercase characters. Large files are memory-mapped; smaller files are
//! streamed through a buffered reader so nothing is ever buffered whole.

use crate::error::FileReadError;
use blake3::Hasher;
use memmap2::MmapOptions;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

const MEMMAP_THRESHOLD: u64 = 10 * 1024 * 1024; // 10MB
const BUFFER_SIZE: usize = 8 * 1024 * 1024; // 8MB

/// Number of hex characters in a digest
pub const DIGEST_LEN: usize = 64;

/// Hash a file's content.
///
/// `rel_path` is the path recorded in errors (and in the snapshot); `path` is
/// where the bytes actually live. Returns the digest together with the number
/// of bytes fed to the hasher. Deterministic across runs and platforms.
pub fn hash_file(path: &Path, rel_path: &str) -> Result<(String, u64), FileReadError> {
    let metadata =
        std::fs::metadata(path).map_err(|e| FileReadError::new(rel_path, e))?;

    if !metadata.is_file() {
        return Err(FileReadError::new(
            rel_path,
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "not a regular file"),
        ));
    }

    let file = File::open(path).map_err(|e| FileReadError::new(rel_path, e))?;

    if metadata.len() >= MEMMAP_THRESHOLD {
        // Safety: the file is opened read-only and only read through the map
        let mmap = unsafe {
            MmapOptions::new()
                .map(&file)
                .map_err(|e| FileReadError::new(rel_path, e))?
        };

        let mut hasher = Hasher::new();
        hasher.update(&mmap[..]);
        return Ok((hasher.finalize().to_hex().to_string(), mmap.len() as u64));
    }

    let mut reader = BufReader::with_capacity(BUFFER_SIZE, file);
    let mut hasher = Hasher::new();
    let mut buffer = vec![0u8; BUFFER_SIZE];
    let mut bytes_hashed = 0u64;

    loop {
        let bytes_read = reader
            .read(&mut buffer)
            .map_err(|e| FileReadError::new(rel_path, e))?;

        if bytes_read == 0 {
            break;
        }

        hasher.update(&buffer[..bytes_read]);
        bytes_hashed += bytes_read as u64;
    }

    Ok((hasher.finalize().to_hex().to_string(), bytes_hashed))
}

/// Hash a byte slice (digests recorded for files hashed from disk match
/// digests of the same bytes hashed in memory)
pub fn hash_bytes(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}
