//! Document identifiers for derived documents

use esrollup_shared::types::document::RollupTuple;
use esrollup_shared::utils::bytes_to_hex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// How derived documents are addressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdStrategy {
    /// Run-scoped counter; a re-run against a populated index collides
    /// with earlier documents and fails.
    #[default]
    Sequential,
    /// Hash of (key, bucket label); a re-run overwrites in place.
    ContentHash,
}

impl std::str::FromStr for IdStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "sequential" => Ok(IdStrategy::Sequential),
            "content_hash" | "hash" => Ok(IdStrategy::ContentHash),
            _ => Err(format!("Invalid id strategy: {}", s)),
        }
    }
}

/// Process-local, strictly increasing counter scoped to one run.
#[derive(Debug, Clone)]
pub struct IdSequence {
    next: u64,
}

impl IdSequence {
    pub fn starting_at(seed: u64) -> Self {
        Self { next: seed }
    }

    /// Draw the next identifier.
    pub fn next_id(&mut self) -> u64 {
        let id = self.next;
        self.next += 1;
        id
    }

    /// Value the next call to `next_id` returns.
    pub fn peek(&self) -> u64 {
        self.next
    }
}

impl Default for IdSequence {
    fn default() -> Self {
        Self::starting_at(1)
    }
}

/// Deterministic id for a tuple: hex SHA-256 of `key \0 label`.
pub fn content_id(tuple: &RollupTuple) -> String {
    let mut hasher = Sha256::new();
    hasher.update(tuple.key.as_bytes());
    hasher.update([0u8]);
    hasher.update(tuple.label.as_bytes());
    bytes_to_hex(&hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_is_strictly_increasing() {
        let mut seq = IdSequence::default();
        let ids: Vec<u64> = (0..5).map(|_| seq.next_id()).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
        assert_eq!(seq.peek(), 6);
    }

    #[test]
    fn test_sequence_seed() {
        let mut seq = IdSequence::starting_at(100);
        assert_eq!(seq.next_id(), 100);
        assert_eq!(seq.next_id(), 101);
    }

    #[test]
    fn test_content_id_is_stable() {
        let a = content_id(&RollupTuple::new("alice", "2017-01-01", 3));
        let b = content_id(&RollupTuple::new("alice", "2017-01-01", 99));
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_content_id_separates_fields() {
        let a = content_id(&RollupTuple::new("ab", "c", 1));
        let b = content_id(&RollupTuple::new("a", "bc", 1));
        assert_ne!(a, b);
    }

    #[test]
    fn test_strategy_from_str() {
        assert_eq!("sequential".parse::<IdStrategy>().unwrap(), IdStrategy::Sequential);
        assert_eq!("content-hash".parse::<IdStrategy>().unwrap(), IdStrategy::ContentHash);
        assert!("uuid".parse::<IdStrategy>().is_err());
    }
}
