//! Content digests for copy verification.
//!
//! This module provides:
//! - Content digests (SHA-256 by default, BLAKE3 and MD5 selectable)
//! - Streaming file digests that never load a whole file into memory
//! - Post-copy verification comparing source and destination digests

use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::fs_ops::CHUNK_SIZE;

/// Digest used for post-copy verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumAlgorithm {
    /// MD5 (not collision resistant, kept for compatibility)
    Md5,
    #[default]
    Sha256,
    Blake3,
}

impl fmt::Display for ChecksumAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Md5 => write!(f, "md5"),
            Self::Sha256 => write!(f, "sha256"),
            Self::Blake3 => write!(f, "blake3"),
        }
    }
}

impl FromStr for ChecksumAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "md5" => Ok(Self::Md5),
            "sha256" | "sha-256" => Ok(Self::Sha256),
            "blake3" => Ok(Self::Blake3),
            _ => Err(format!(
                "Invalid hash algorithm '{}'. Must be 'sha256', 'blake3' or 'md5'",
                s
            )),
        }
    }
}

/// Hex digest tagged with the algorithm that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChecksumValue {
    algorithm: ChecksumAlgorithm,
    hex: String,
}

impl ChecksumValue {
    pub fn new(algorithm: ChecksumAlgorithm, hex: String) -> Self {
        ChecksumValue { algorithm, hex }
    }

    pub fn algorithm(&self) -> ChecksumAlgorithm {
        self.algorithm
    }

    pub fn hex(&self) -> &str {
        &self.hex
    }

    /// `sha256:<hex>` style label for logs
    pub fn labeled(&self) -> String {
        format!("{}:{}", self.algorithm, self.hex)
    }
}

impl fmt::Display for ChecksumValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.hex)
    }
}

/// Incremental digest over a byte stream.
pub enum StreamingDigest {
    Md5(md5::Context),
    Sha256(sha2::Sha256),
    Blake3(Box<blake3::Hasher>),
}

impl StreamingDigest {
    pub fn new(algorithm: ChecksumAlgorithm) -> Self {
        match algorithm {
            ChecksumAlgorithm::Md5 => StreamingDigest::Md5(md5::Context::new()),
            ChecksumAlgorithm::Sha256 => StreamingDigest::Sha256(sha2::Sha256::default()),
            ChecksumAlgorithm::Blake3 => StreamingDigest::Blake3(Box::new(blake3::Hasher::new())),
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        use sha2::Digest;
        match self {
            StreamingDigest::Md5(ctx) => ctx.consume(data),
            StreamingDigest::Sha256(h) => h.update(data),
            StreamingDigest::Blake3(h) => {
                h.update(data);
            }
        }
    }

    pub fn finish(self) -> ChecksumValue {
        use sha2::Digest;
        match self {
            StreamingDigest::Md5(ctx) => {
                ChecksumValue::new(ChecksumAlgorithm::Md5, format!("{:x}", ctx.compute()))
            }
            StreamingDigest::Sha256(h) => {
                ChecksumValue::new(ChecksumAlgorithm::Sha256, format!("{:x}", h.finalize()))
            }
            StreamingDigest::Blake3(h) => {
                ChecksumValue::new(ChecksumAlgorithm::Blake3, h.finalize().to_hex().to_string())
            }
        }
    }
}

/// Compute the checksum of a file, streaming it in chunks.
pub fn compute_file_checksum(path: &Path, algorithm: ChecksumAlgorithm) -> Result<ChecksumValue> {
    let read_error = |e| EngineError::ReadError {
        path: path.to_path_buf(),
        source: e,
    };

    let mut file = File::open(path).map_err(read_error)?;
    let mut digest = StreamingDigest::new(algorithm);
    let mut buffer = vec![0u8; CHUNK_SIZE];

    loop {
        let n = match file.read(&mut buffer) {
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(read_error(e)),
        };
        if n == 0 {
            break;
        }
        digest.update(&buffer[..n]);
    }

    Ok(digest.finish())
}

/// Verify that `dst` has the same content as `src`.
///
/// Returns the source checksum on success.
///
/// # Errors
/// Returns `IntegrityMismatch` naming `src` if the digests differ, or a read
/// error if either file cannot be hashed.
pub fn verify_copy(src: &Path, dst: &Path, algorithm: ChecksumAlgorithm) -> Result<ChecksumValue> {
    let source = compute_file_checksum(src, algorithm)?;
    let dest = compute_file_checksum(dst, algorithm)?;

    if source.hex() != dest.hex() {
        return Err(EngineError::IntegrityMismatch {
            path: src.to_path_buf(),
            algorithm: algorithm.to_string(),
            expected: source.hex,
            actual: dest.hex,
        });
    }
    Ok(source)
}
