//! Cache digests
//!
//! A task's cache identity is the hash of an ordered list of strings: its
//! explicit inputs plus, where relevant, the runner content hash and the base
//! execution image hash. The digest is computed once during lowering and never
//! mutated.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Ordered digest data whose hash forms a task's cache identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheDigest {
    data: Vec<String>,
}

impl CacheDigest {
    /// Build a digest from ordered input strings
    pub fn from_data(data: Vec<String>) -> Self {
        Self { data }
    }

    /// The ordered input strings
    pub fn data(&self) -> &[String] {
        &self.data
    }

    /// Order-sensitive SHA-256 over the digest data.
    ///
    /// Each element is length-prefixed before hashing so that element
    /// boundaries are unambiguous (["ab","c"] and ["a","bc"] differ).
    pub fn hash(&self) -> String {
        let mut hasher = Sha256::new();
        for element in &self.data {
            hasher.update((element.len() as u64).to_be_bytes());
            hasher.update(element.as_bytes());
        }
        format!("{:x}", hasher.finalize())
    }
}
