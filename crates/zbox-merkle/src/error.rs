//! Error types for merkle tree operations.

use thiserror::Error;

/// Errors raised by the integrity trees.
#[derive(Debug, Error)]
pub enum MerkleError {
    /// The leaf at this index has already been absorbed. Callers may ignore it.
    #[error("merkle: leaf {index} exists (count {count}), it can be skipped")]
    LeafExists { index: u64, count: u64 },

    /// A leaf was skipped; leaves must be pushed one by one.
    #[error("merkle: leaf {index} pushed out of order, expected {expected}")]
    LeafOutOfOrder { index: u64, expected: u64 },

    #[error("data size overflow: expected {expected}, got {got}")]
    SizeOverflow { expected: u64, got: u64 },

    #[error("tree is already finalized")]
    AlreadyFinalized,

    #[error("tree is not finalized")]
    NotFinalized,

    #[error("invalid size: expected {expected}, written {written}")]
    SizeMismatch { expected: u64, written: u64 },

    #[error("chunk of {got} bytes exceeds chunk size {max}")]
    ChunkTooLarge { max: usize, got: usize },

    #[error("invalid leaf range [{start}, {end}] for {total} leaves")]
    InvalidRange { start: u64, end: u64, total: u64 },

    #[error("invalid proof: {0}")]
    InvalidProof(String),

    #[error("invalid hash length: expected {expected}, got {got}")]
    InvalidHashLength { expected: usize, got: usize },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl MerkleError {
    /// Whether this error is the benign "already absorbed" signal.
    pub fn is_leaf_exists(&self) -> bool {
        matches!(self, MerkleError::LeafExists { .. })
    }
}

pub type MerkleResult<T> = Result<T, MerkleError>;
