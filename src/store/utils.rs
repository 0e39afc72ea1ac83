//! Utility functions for the content store

use sha2::{Digest, Sha256};

/// Content-addressed payload file name for a store key
///
/// Keys embed the template id, which may contain characters that are not
/// safe in file names, so the file name is the SHA-256 of the key.
pub fn payload_file_name(key: &str) -> String {
    format!("{:x}.data", Sha256::digest(key.as_bytes()))
}

/// SHA-256 hex digest of a payload, stored in the index to detect corruption
pub fn checksum(payload: &[u8]) -> String {
    hex::encode(Sha256::digest(payload))
}
