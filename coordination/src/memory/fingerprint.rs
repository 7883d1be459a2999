//! Error fingerprints for memory lookup.

use crate::trace::ErrorDescription;

/// Stable key for an error: blake3 over (category, failure-site path, message).
///
/// Fields are length-prefixed so that shifting text between fields can never
/// produce the same input.
pub fn fingerprint(error: &ErrorDescription) -> String {
    fingerprint_parts(&error.error_type, &error.file_path, &error.error_message)
}

pub fn fingerprint_parts(error_type: &str, file_path: &str, message: &str) -> String {
    let mut hasher = blake3::Hasher::new();
    for part in [error_type, file_path, message] {
        hasher.update(&(part.len() as u64).to_le_bytes());
        hasher.update(part.as_bytes());
    }
    hasher.finalize().to_hex().to_string()
}
