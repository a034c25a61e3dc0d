//! Content keys
//!
//! A key is the lowercase hex digest of a blob's bytes. It is both the blob's
//! identity and the input to its placement path, so no index is ever needed.

use std::fmt;
use std::str::FromStr;

use md5::Md5;
use serde::Serialize;
use sha2::{Digest, Sha256};

/// Number of leading key characters used as the shard directory name
pub const SHARD_PREFIX_LEN: usize = 2;

/// Digest used to derive keys from content
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HashAlgorithm {
    /// 32 hex characters, compatible with existing stores
    #[default]
    Md5,
    /// 64 hex characters
    Sha256,
}

impl HashAlgorithm {
    /// Length of a hex-encoded key under this algorithm
    pub fn hex_len(self) -> usize {
        match self {
            Self::Md5 => 32,
            Self::Sha256 => 64,
        }
    }

    /// Compute the key for a byte sequence
    pub fn key_for(self, data: &[u8]) -> BlobKey {
        let hex = match self {
            Self::Md5 => hex::encode(Md5::digest(data)),
            Self::Sha256 => hex::encode(Sha256::digest(data)),
        };
        BlobKey(hex)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Md5 => "md5",
            Self::Sha256 => "sha256",
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HashAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "md5" => Ok(Self::Md5),
            "sha256" | "sha-256" => Ok(Self::Sha256),
            other => Err(format!("unknown hash algorithm '{}'", other)),
        }
    }
}

/// Reasons a caller-supplied key is rejected
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyError {
    #[error("Key has {actual} characters, expected {expected}")]
    Length { expected: usize, actual: usize },

    #[error("Key contains invalid character {0:?}")]
    InvalidCharacter(char),
}

/// A sanitized content key
///
/// Only lowercase hex characters of the algorithm's digest length, so a key
/// can never carry a path separator or traversal component into the
/// filesystem layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct BlobKey(String);

impl BlobKey {
    /// Validate a key received from a client
    pub fn parse(raw: &str, algorithm: HashAlgorithm) -> Result<Self, KeyError> {
        if let Some(bad) = raw.chars().find(|c| !matches!(c, '0'..='9' | 'a'..='f')) {
            return Err(KeyError::InvalidCharacter(bad));
        }

        let expected = algorithm.hex_len();
        if raw.len() != expected {
            return Err(KeyError::Length {
                expected,
                actual: raw.len(),
            });
        }

        Ok(Self(raw.to_string()))
    }

    /// Shard directory name: the first two key characters
    pub fn shard(&self) -> &str {
        &self.0[..SHARD_PREFIX_LEN]
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BlobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for BlobKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_md5_reference_key() {
        let key = HashAlgorithm::Md5.key_for(b"test");
        assert_eq!(key.as_str(), "098f6bcd4621d373cade4e832627b4f6");
        assert_eq!(key.shard(), "09");
    }

    #[test]
    fn test_sha256_key_length() {
        let key = HashAlgorithm::Sha256.key_for(b"Hello, World!");
        assert_eq!(key.as_str().len(), 64);
        assert_eq!(
            key.as_str(),
            "dffd6021bb2bd5b0af676290809ec3a53191dd81c7f70a4b28688a362182986f"
        );
    }

    #[test]
    fn test_key_is_deterministic() {
        let data = b"same bytes every time";
        for algorithm in [HashAlgorithm::Md5, HashAlgorithm::Sha256] {
            assert_eq!(algorithm.key_for(data), algorithm.key_for(data));
        }
    }

    #[test]
    fn test_shard_is_key_prefix() {
        for i in 0..64u32 {
            let key = HashAlgorithm::Md5.key_for(&i.to_le_bytes());
            assert_eq!(key.shard(), &key.as_str()[..2]);
            assert_eq!(key.as_str().len(), HashAlgorithm::Md5.hex_len());
        }
    }

    #[test]
    fn test_parse_accepts_minted_keys() {
        let key = HashAlgorithm::Sha256.key_for(b"round");
        let parsed = BlobKey::parse(key.as_str(), HashAlgorithm::Sha256).unwrap();
        assert_eq!(parsed, key);
    }

    #[test]
    fn test_parse_rejects_traversal() {
        assert_eq!(
            BlobKey::parse("../etc/passwd", HashAlgorithm::Md5),
            Err(KeyError::InvalidCharacter('.'))
        );
        assert!(BlobKey::parse("09/8f6bcd4621d373cade4e832627b4f6", HashAlgorithm::Md5).is_err());
        assert!(BlobKey::parse("098f6bcd4621d373cade4e832627b4\0f", HashAlgorithm::Md5).is_err());
    }

    #[test]
    fn test_parse_rejects_wrong_shape() {
        assert!(matches!(
            BlobKey::parse("", HashAlgorithm::Md5),
            Err(KeyError::Length { expected: 32, actual: 0 })
        ));
        assert!(matches!(
            BlobKey::parse("incorrect_hash", HashAlgorithm::Md5),
            Err(KeyError::InvalidCharacter('i'))
        ));
        // Uppercase hex is never produced, so it never names a blob
        assert!(BlobKey::parse("098F6BCD4621D373CADE4E832627B4F6", HashAlgorithm::Md5).is_err());
        // An md5 key is not a valid sha256 key
        assert!(BlobKey::parse("098f6bcd4621d373cade4e832627b4f6", HashAlgorithm::Sha256).is_err());
    }

    #[test]
    fn test_algorithm_from_str() {
        assert_eq!("MD5".parse::<HashAlgorithm>(), Ok(HashAlgorithm::Md5));
        assert_eq!(" sha256 ".parse::<HashAlgorithm>(), Ok(HashAlgorithm::Sha256));
        assert!("crc32".parse::<HashAlgorithm>().is_err());
    }

    #[test]
    fn test_key_serializes_as_string() {
        let key = HashAlgorithm::Md5.key_for(b"test");
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, "\"098f6bcd4621d373cade4e832627b4f6\"");
    }
}
