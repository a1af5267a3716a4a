use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::error::DomainError;

const HASH_HEX_LEN: usize = 64;

/// Stable fingerprint of document text, used as the render cache key.
///
/// Hex-encoded SHA-256 of the UTF-8 bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentHash(String);

impl ContentHash {
    pub fn of(text: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Leading twelve hex digits, enough to tell renders apart in logs.
    pub fn short(&self) -> &str {
        &self.0[..12]
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ContentHash {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if trimmed.len() != HASH_HEX_LEN {
            return Err(DomainError::validation(format!(
                "content hash must be {HASH_HEX_LEN} hex digits, got {}",
                trimmed.len()
            )));
        }
        if !trimmed.bytes().all(|byte| byte.is_ascii_hexdigit()) {
            return Err(DomainError::validation(
                "content hash contains non-hex characters",
            ));
        }
        Ok(Self(trimmed.to_ascii_lowercase()))
    }
}

impl TryFrom<String> for ContentHash {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ContentHash> for String {
    fn from(hash: ContentHash) -> Self {
        hash.0
    }
}

/// Immutable view over the caller's document text for the duration of one render.
#[derive(Debug, Clone)]
pub struct Document<'a> {
    text: &'a str,
    size: usize,
    content_hash: ContentHash,
}

impl<'a> Document<'a> {
    pub fn new(text: &'a str) -> Self {
        Self {
            text,
            size: text.chars().count(),
            content_hash: ContentHash::of(text),
        }
    }

    pub fn text(&self) -> &'a str {
        self.text
    }

    /// Character count, the unit every size threshold is expressed in.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn content_hash(&self) -> &ContentHash {
        &self.content_hash
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}
