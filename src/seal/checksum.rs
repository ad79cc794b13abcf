//! SHA-512 digests for evidence files and sealed reports.

use sha2::{Digest, Sha512};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// Buffer size for reading files (8KB)
const BUFFER_SIZE: usize = 8192;

/// Lowercase hex SHA-512 of a byte slice
pub fn sha512_hex(bytes: &[u8]) -> String {
    hex::encode(Sha512::digest(bytes))
}

/// Lowercase hex SHA-512 of a file, streamed in chunks
pub fn sha512_file(path: &Path) -> std::io::Result<String> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    let mut hasher = Sha512::new();
    let mut buffer = [0u8; BUFFER_SIZE];

    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// "abcdef0123456789..." form shown in footers and QR payloads
pub fn short_hash(hash: &str) -> String {
    let prefix: String = hash.chars().take(16).collect();
    format!("{}...", prefix)
}
