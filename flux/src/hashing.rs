//! Credential hash derivation for the auth-file adapter (spec.md §4.9, C9).
//!
//! The 56-byte canonical input is built once and fed through whichever
//! digest the zone operator configured; the output is then rendered as
//! lowercase hex or base64, matching what an operator's existing
//! `passwd.conf` file would contain.

use md5::Md5;
use sha2::{Digest, Sha256, Sha512};

const NAME_FIELD: usize = 24;
const NAME_MAX_CHARS: usize = 23;
const PASS_FIELD: usize = 32;
const PASS_MAX_CHARS: usize = 31;

#[derive(Clone, Copy, Debug, Eq, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum HashAlgorithm {
    Md5,
    Sha256,
    Sha512,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashEncoding {
    Hex,
    Base64,
}

/// Builds the canonical 56-byte `(name, password)` buffer: the name
/// lowercased and truncated to 23 ASCII characters in a zero-filled 24-byte
/// field, followed by the password truncated to 31 characters in a
/// zero-filled 32-byte field.
pub fn canonical_buffer(name: &str, password: &str) -> [u8; NAME_FIELD + PASS_FIELD] {
    let mut buf = [0u8; NAME_FIELD + PASS_FIELD];

    let lowered: String = name.chars().take(NAME_MAX_CHARS).flat_map(|c| c.to_lowercase()).collect();
    let name_bytes = lowered.as_bytes();
    let name_len = name_bytes.len().min(NAME_MAX_CHARS);
    buf[..name_len].copy_from_slice(&name_bytes[..name_len]);

    let pass_bytes = password.as_bytes();
    let pass_len = pass_bytes.len().min(PASS_MAX_CHARS);
    buf[NAME_FIELD..NAME_FIELD + pass_len].copy_from_slice(&pass_bytes[..pass_len]);

    buf
}

/// Derives the stored-credential string for `(name, password)` under the
/// given algorithm/encoding pair (testable property S6).
pub fn derive(name: &str, password: &str, algorithm: HashAlgorithm, encoding: HashEncoding) -> String {
    let buf = canonical_buffer(name, password);

    let digest: Vec<u8> = match algorithm {
        HashAlgorithm::Md5 => Md5::digest(buf).to_vec(),
        HashAlgorithm::Sha256 => Sha256::digest(buf).to_vec(),
        HashAlgorithm::Sha512 => Sha512::digest(buf).to_vec(),
    };

    match encoding {
        HashEncoding::Hex => hex::encode(digest),
        HashEncoding::Base64 => base64::Engine::encode(&base64::engine::general_purpose::STANDARD, digest),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_buffer_matches_worked_example() {
        let buf = canonical_buffer("Alice", "secret");
        let mut expected = [0u8; 56];
        expected[..5].copy_from_slice(b"alice");
        expected[24..30].copy_from_slice(b"secret");
        assert_eq!(buf, expected);
    }

    #[test]
    fn derive_md5_hex_round_trips() {
        let buf = canonical_buffer("alice", "secret");
        let expected = hex::encode(Md5::digest(buf));
        assert_eq!(derive("Alice", "secret", HashAlgorithm::Md5, HashEncoding::Hex), expected);
    }

    #[test]
    fn name_truncates_at_23_chars_before_padding() {
        let long_name = "a".repeat(40);
        let buf = canonical_buffer(&long_name, "x");
        assert_eq!(&buf[..23], "a".repeat(23).as_bytes());
        assert_eq!(buf[23], 0);
    }
}
