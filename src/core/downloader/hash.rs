use std::fmt;
use std::path::Path;

use md5::Md5;
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use sha2::Sha256;
use tokio::io::AsyncReadExt;

use crate::core::error::{LauncherError, LauncherResult};

/// Digest algorithms a manifest may declare for an artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    Sha1,
    Sha256,
    Md5,
}

impl HashAlgorithm {
    /// Directory name under the cache root.
    pub fn as_str(self) -> &'static str {
        match self {
            HashAlgorithm::Sha1 => "sha1",
            HashAlgorithm::Sha256 => "sha256",
            HashAlgorithm::Md5 => "md5",
        }
    }

    fn hex_len(self) -> usize {
        match self {
            HashAlgorithm::Sha1 => 40,
            HashAlgorithm::Sha256 => 64,
            HashAlgorithm::Md5 => 32,
        }
    }

    pub fn hasher(self) -> Hasher {
        match self {
            HashAlgorithm::Sha1 => Hasher::Sha1(Sha1::new()),
            HashAlgorithm::Sha256 => Hasher::Sha256(Sha256::new()),
            HashAlgorithm::Md5 => Hasher::Md5(Md5::new()),
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Expected digest of an artifact. The hex form is always lowercase.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Checksum {
    pub algorithm: HashAlgorithm,
    pub hex: String,
}

impl Checksum {
    /// Returns `None` when `hex` is not a digest of the given algorithm.
    pub fn new(algorithm: HashAlgorithm, hex: &str) -> Option<Self> {
        let hex = hex.trim().to_ascii_lowercase();
        let well_formed =
            hex.len() == algorithm.hex_len() && hex.chars().all(|c| c.is_ascii_hexdigit());
        well_formed.then_some(Self { algorithm, hex })
    }

    pub fn sha1(hex: &str) -> Option<Self> {
        Self::new(HashAlgorithm::Sha1, hex)
    }

    pub fn of_bytes(algorithm: HashAlgorithm, bytes: &[u8]) -> Self {
        let mut hasher = algorithm.hasher();
        hasher.update(bytes);
        hasher.finish()
    }

    /// First two hex characters, used to fan out cache directories.
    pub fn prefix(&self) -> &str {
        &self.hex[..2]
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.hex)
    }
}

/// Incremental hasher over any supported algorithm.
pub enum Hasher {
    Sha1(Sha1),
    Sha256(Sha256),
    Md5(Md5),
}

impl Hasher {
    pub fn update(&mut self, bytes: &[u8]) {
        match self {
            Hasher::Sha1(h) => h.update(bytes),
            Hasher::Sha256(h) => h.update(bytes),
            Hasher::Md5(h) => h.update(bytes),
        }
    }

    pub fn finish(self) -> Checksum {
        let (algorithm, hex) = match self {
            Hasher::Sha1(h) => (HashAlgorithm::Sha1, hex::encode(h.finalize())),
            Hasher::Sha256(h) => (HashAlgorithm::Sha256, hex::encode(h.finalize())),
            Hasher::Md5(h) => (HashAlgorithm::Md5, hex::encode(h.finalize())),
        };
        Checksum { algorithm, hex }
    }
}

/// Hash an existing file without loading it into memory at once.
pub async fn hash_file(path: &Path, algorithm: HashAlgorithm) -> LauncherResult<Checksum> {
    let mut file = tokio::fs::File::open(path)
        .await
        .map_err(|e| LauncherError::io(path, e))?;
    let mut hasher = algorithm.hasher();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let read = file
            .read(&mut buf)
            .await
            .map_err(|e| LauncherError::io(path, e))?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }
    Ok(hasher.finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_digests() {
        assert_eq!(
            Checksum::of_bytes(HashAlgorithm::Sha1, b"hello").hex,
            "aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d"
        );
        assert_eq!(
            Checksum::of_bytes(HashAlgorithm::Sha256, b"hello").hex,
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
        assert_eq!(
            Checksum::of_bytes(HashAlgorithm::Md5, b"hello").hex,
            "5d41402abc4b2a76b9719d911017c592"
        );
    }

    #[test]
    fn checksum_rejects_wrong_length_and_normalizes_case() {
        assert!(Checksum::sha1("abc").is_none());
        let c = Checksum::sha1("AAF4C61DDCC5E8A2DABEDE0F3B482CD9AEA9434D").unwrap();
        assert_eq!(c.hex, "aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d");
        assert_eq!(c.prefix(), "aa");
    }

    #[tokio::test]
    async fn hash_file_matches_in_memory_digest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blob");
        tokio::fs::write(&path, b"hello").await.unwrap();
        let digest = hash_file(&path, HashAlgorithm::Sha1).await.unwrap();
        assert_eq!(digest, Checksum::of_bytes(HashAlgorithm::Sha1, b"hello"));
    }
}
