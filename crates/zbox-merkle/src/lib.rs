//! # zbox-merkle
//!
//! Content-integrity trees used to fingerprint file data before it is handed
//! to blobbers, and to verify ranges of it when it comes back.
//!
//! This crate provides three hashing engines:
//!
//! - [`compact::CompactMerkleTree`]: a streaming accumulator over an ordered leaf
//!   stream that keeps only O(log N) state
//! - [`fixed::FixedMerkleTree`]: 1024 compact lanes with file bytes interleaved
//!   across them, so any sub-chunk can be proven on its own
//! - [`validation::ValidationTree`]: a balanced tree over 64 KiB data leaves with
//!   multi-leaf range proofs ([`proof::MerklePath`])
//!
//! ## Design Philosophy
//!
//! The compact/fixed pair protects against outsourcing attacks: a blobber that
//! throws data away cannot fabricate possession proofs for it. The validation
//! tree lets a reader check that the bytes a replica returned belong to the
//! root the client recorded at upload time.
//!
//! Note that compact roots self-pair a lonely node while validation roots promote
//! it unchanged. The two roots are not interchangeable even for the same leaves.

pub mod compact;
pub mod error;
pub mod fixed;
pub mod hash;
pub mod proof;
pub mod validation;

pub use compact::{CompactMerkleTree, CompactState, LaneHasher, MerkleHasher, Sha256Hasher};
pub use error::{MerkleError, MerkleResult};
pub use fixed::{FixedMerkleTree, LaneProof};
pub use hash::{HashValue, ShortHash};
pub use proof::{leaf_byte_range, verify_range, MerklePath, Side};
pub use validation::{tree_depth, ValidationTree};

/// The length of tree digests (32 bytes = 256 bits)
pub const HASH_LENGTH: usize = 32;

/// The length of lane leaf digests (20 bytes = 160 bits)
pub const SHORT_HASH_LENGTH: usize = 20;

/// Number of lanes in the fixed merkle tree
pub const FIXED_MERKLE_LEAVES: usize = 1024;

/// Depth of the tree built over the fixed lane roots (2^10 = 1024)
pub const FIXED_MT_DEPTH: usize = 10;

/// Size of a validation tree data leaf
pub const MAX_MERKLE_LEAF_SIZE: usize = 64 * 1024;

/// Fill `buf` from `reader` until it is full or the reader is exhausted.
///
/// Returns the number of bytes read; anything short of `buf.len()` means EOF.
pub(crate) fn read_chunk<R: std::io::Read>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
