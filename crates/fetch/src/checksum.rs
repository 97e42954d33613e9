//! SHA-256 helpers. All checksums are lowercase hex.

use crate::error::{Error, Result};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

const BUFFER_SIZE: usize = 64 * 1024;

/// Checksum of an in-memory buffer.
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Checksum of everything `reader` yields.
pub fn checksum_reader(reader: &mut dyn Read) -> Result<String> {
    copy_hashing(reader, &mut std::io::sink())
}

/// Checksum of a file on disk.
pub fn checksum_file(path: &Path) -> Result<String> {
    let mut file = File::open(path).map_err(|e| Error::io(path, e))?;
    copy_hashing(&mut file, &mut std::io::sink())
}

/// Copy `reader` into `writer`, hashing the bytes on the way through.
pub(crate) fn copy_hashing(reader: &mut dyn Read, writer: &mut dyn Write) -> Result<String> {
    let mut hasher = Sha256::new();
    let mut buffer = vec![0_u8; BUFFER_SIZE];
    loop {
        let read = reader.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
        writer.write_all(&buffer[..read])?;
    }
    Ok(hex::encode(hasher.finalize()))
}
