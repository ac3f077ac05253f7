//! Compact (streaming) Merkle accumulator.
//!
//! A stateful algorithm: it takes leaves in strict index order, hashes them,
//! and computes as many parent hashes as it can. Only one digest per level is
//! kept, so memory is O(log N) regardless of how many leaves are absorbed.
//!
//! # Design
//!
//! The accumulator behaves like a binary counter:
//! - Slot `i` holds the digest of a complete subtree of `2^i` leaves, or is empty
//! - After `N` leaves, slot `i` is occupied iff bit `i` of `N` is set
//! - Absorbing a leaf is a carry: merge with occupied slots until an empty one
//!
//! # Example
//!
//! ```
//! use zbox_merkle::compact::{CompactMerkleTree, Sha256Hasher};
//!
//! let mut tree = CompactMerkleTree::new(Sha256Hasher);
//! tree.push_data(b"block-0", 0).unwrap();
//! tree.push_data(b"block-1", 1).unwrap();
//!
//! // Re-pushing an absorbed index is reported but harmless.
//! assert!(tree.push_data(b"block-1", 1).unwrap_err().is_leaf_exists());
//! assert!(tree.root().is_some());
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Read;

use crate::error::{MerkleError, MerkleResult};
use crate::hash::{self, HashValue, ShortHash};
use crate::read_chunk;

/// Leaf and parent hashing used by a [`CompactMerkleTree`].
pub trait MerkleHasher {
    type Node: Clone + PartialEq + fmt::Debug;

    /// Digest of a raw data block.
    fn hash_leaf(&self, data: &[u8]) -> Self::Node;

    /// Parent digest of two children.
    fn hash_pair(&self, left: &Self::Node, right: &Self::Node) -> Self::Node;
}

/// SHA-1 lanes of the fixed tree (20-byte nodes).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LaneHasher;

impl MerkleHasher for LaneHasher {
    type Node = ShortHash;

    fn hash_leaf(&self, data: &[u8]) -> ShortHash {
        hash::sha1(data)
    }

    fn hash_pair(&self, left: &ShortHash, right: &ShortHash) -> ShortHash {
        hash::sha1_pair(left, right)
    }
}

/// SHA-256 leaves and parents (32-byte nodes).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Sha256Hasher;

impl MerkleHasher for Sha256Hasher {
    type Node = HashValue;

    fn hash_leaf(&self, data: &[u8]) -> HashValue {
        hash::sha256(data)
    }

    fn hash_pair(&self, left: &HashValue, right: &HashValue) -> HashValue {
        hash::sha256_pair(left.as_bytes(), right.as_bytes())
    }
}

/// Persistable accumulator state, used to resume hashing an interrupted upload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompactState<N> {
    /// Level slots, lowest level first
    pub slots: Vec<Option<N>>,
    /// How many leaves have been absorbed
    pub count: u64,
}

/// Streaming Merkle accumulator over a single ordered leaf stream.
#[derive(Clone, Debug)]
pub struct CompactMerkleTree<H: MerkleHasher> {
    slots: Vec<Option<H::Node>>,
    count: u64,
    hasher: H,
}

impl<H: MerkleHasher + Default> Default for CompactMerkleTree<H> {
    fn default() -> Self {
        Self::new(H::default())
    }
}

impl<H: MerkleHasher> CompactMerkleTree<H> {
    /// Create an empty accumulator
    pub fn new(hasher: H) -> Self {
        Self {
            slots: Vec::with_capacity(10),
            count: 0,
            hasher,
        }
    }

    /// Number of leaves absorbed so far
    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Number of level slots currently allocated
    pub fn levels(&self) -> usize {
        self.slots.len()
    }

    pub fn hasher(&self) -> &H {
        &self.hasher
    }

    /// Absorb `leaf` at position `index`.
    ///
    /// `index` must equal [`count`](Self::count). A smaller index returns
    /// [`MerkleError::LeafExists`] and a larger one [`MerkleError::LeafOutOfOrder`];
    /// neither touches the state.
    pub fn push(&mut self, leaf: H::Node, index: u64) -> MerkleResult<()> {
        if index < self.count {
            return Err(MerkleError::LeafExists {
                index,
                count: self.count,
            });
        }
        if index > self.count {
            return Err(MerkleError::LeafOutOfOrder {
                index,
                expected: self.count,
            });
        }

        let mut carry = leaf;
        for slot in self.slots.iter_mut() {
            match slot.take() {
                None => {
                    *slot = Some(carry);
                    self.count += 1;
                    return Ok(());
                }
                Some(left) => carry = self.hasher.hash_pair(&left, &carry),
            }
        }

        // Every level was occupied: the carry becomes a new top level.
        self.slots.push(Some(carry));
        self.count += 1;
        Ok(())
    }

    /// Hash a raw block with the leaf hash and absorb it at `index`
    pub fn push_data(&mut self, data: &[u8], index: u64) -> MerkleResult<()> {
        let leaf = self.hasher.hash_leaf(data);
        self.push(leaf, index)
    }

    /// Compute the Merkle root of everything absorbed so far.
    ///
    /// A lonely node at any level is paired with itself. A single absorbed
    /// leaf is its own root; an empty accumulator has none. Does not mutate
    /// the slots, so it can be called at any time.
    pub fn root(&self) -> Option<H::Node> {
        if self.count == 1 {
            return self.slots.first().cloned().flatten();
        }

        let mut right: Option<H::Node> = None;
        for slot in &self.slots {
            right = match (slot, right) {
                (None, None) => None,
                (Some(left), None) => Some(self.hasher.hash_pair(left, left)),
                (Some(left), Some(right)) => Some(self.hasher.hash_pair(left, &right)),
                (None, Some(right)) => Some(self.hasher.hash_pair(&right, &right)),
            };
        }
        right
    }

    /// Drop all absorbed leaves
    pub fn reset(&mut self) {
        self.slots.clear();
        self.count = 0;
    }

    /// Reset and re-absorb `reader` in blocks of `chunk_size` bytes.
    ///
    /// The final block may be short. Read errors are returned as-is.
    pub fn reload<R: Read>(&mut self, chunk_size: usize, mut reader: R) -> MerkleResult<()> {
        if chunk_size == 0 {
            return Err(MerkleError::InvalidInput("chunk size must be positive".into()));
        }
        self.reset();

        let mut buf = vec![0u8; chunk_size];
        for index in 0u64.. {
            let n = read_chunk(&mut reader, &mut buf)?;
            if n == 0 {
                break;
            }
            self.push_data(&buf[..n], index)?;
            if n < chunk_size {
                break;
            }
        }
        Ok(())
    }

    /// Capture the current state
    pub fn snapshot(&self) -> CompactState<H::Node> {
        CompactState {
            slots: self.slots.clone(),
            count: self.count,
        }
    }

    /// Rebuild an accumulator from a snapshot.
    ///
    /// Fails if the occupied slots don't match the bits of `count`.
    pub fn restore(state: CompactState<H::Node>, hasher: H) -> MerkleResult<Self> {
        let bit_len = (u64::BITS - state.count.leading_zeros()) as usize;
        if state.slots.len() != bit_len {
            return Err(MerkleError::InvalidInput(format!(
                "{} slots for count {}",
                state.slots.len(),
                state.count
            )));
        }
        for (level, slot) in state.slots.iter().enumerate() {
            let bit_set = state.count >> level & 1 == 1;
            if slot.is_some() != bit_set {
                return Err(MerkleError::InvalidInput(format!(
                    "slot {} does not match count {}",
                    level, state.count
                )));
            }
        }

        Ok(Self {
            slots: state.slots,
            count: state.count,
            hasher,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Renders the tree shape: `H(l, r) = "[" + l + "+" + r + "]"`.
    #[derive(Clone, Debug, Default)]
    struct ConcatHasher;

    impl MerkleHasher for ConcatHasher {
        type Node = String;

        fn hash_leaf(&self, data: &[u8]) -> String {
            String::from_utf8_lossy(data).into_owned()
        }

        fn hash_pair(&self, left: &String, right: &String) -> String {
            format!("[{}+{}]", left, right)
        }
    }

    fn tree_with(n: u64) -> CompactMerkleTree<ConcatHasher> {
        let mut tree = CompactMerkleTree::new(ConcatHasher);
        for i in 0..n {
            tree.push(i.to_string(), i).unwrap();
        }
        tree
    }

    #[test]
    fn test_even_leaves() {
        let tree = tree_with(6);
        assert_eq!(tree.root().unwrap(), "[[[0+1]+[2+3]]+[[4+5]+[4+5]]]");
    }

    #[test]
    fn test_odd_leaves() {
        let mut tree = tree_with(7);
        assert_eq!(tree.root().unwrap(), "[[[0+1]+[2+3]]+[[4+5]+[6+6]]]");

        let err = tree.push("10".to_string(), 10).unwrap_err();
        assert!(matches!(err, MerkleError::LeafOutOfOrder { index: 10, expected: 7 }));
        assert_eq!(tree.count(), 7);
    }

    #[test]
    fn test_repush_is_idempotent() {
        let mut tree = CompactMerkleTree::new(ConcatHasher);
        for i in 0..7u64 {
            tree.push(i.to_string(), i).unwrap();
            let before = tree.snapshot();
            let err = tree.push(i.to_string(), i).unwrap_err();
            assert!(err.is_leaf_exists());
            assert_eq!(tree.snapshot(), before);
        }
        assert_eq!(tree.root().unwrap(), "[[[0+1]+[2+3]]+[[4+5]+[6+6]]]");
    }

    #[test]
    fn test_single_and_empty_root() {
        let empty: CompactMerkleTree<ConcatHasher> = CompactMerkleTree::default();
        assert_eq!(empty.root(), None);

        let single = tree_with(1);
        assert_eq!(single.root().unwrap(), "0");
    }

    #[test]
    fn test_root_does_not_mutate() {
        let tree = tree_with(5);
        let before = tree.snapshot();
        let first = tree.root();
        assert_eq!(tree.root(), first);
        assert_eq!(tree.snapshot(), before);
    }

    #[test]
    fn test_slots_track_count_bits() {
        let mut tree = CompactMerkleTree::new(ConcatHasher);
        for i in 0..200u64 {
            tree.push(i.to_string(), i).unwrap();
            let n = tree.count();
            for (level, slot) in tree.snapshot().slots.iter().enumerate() {
                assert_eq!(slot.is_some(), n >> level & 1 == 1, "count {} level {}", n, level);
            }
        }
    }

    #[test]
    fn test_snapshot_restore_continues() {
        let mut full = tree_with(11);

        let partial = tree_with(6);
        let mut resumed = CompactMerkleTree::restore(partial.snapshot(), ConcatHasher).unwrap();
        for i in 6..11u64 {
            resumed.push(i.to_string(), i).unwrap();
        }
        assert_eq!(resumed.root(), full.root());

        full.push("11".to_string(), 11).unwrap();
        assert_ne!(resumed.root(), full.root());
    }

    #[test]
    fn test_restore_rejects_inconsistent_state() {
        let state = CompactState {
            slots: vec![Some("x".to_string()), None],
            count: 2,
        };
        assert!(CompactMerkleTree::restore(state, ConcatHasher).is_err());

        let state = CompactState::<String> {
            slots: vec![None, None],
            count: 2,
        };
        assert!(CompactMerkleTree::restore(state, ConcatHasher).is_err());
    }

    #[test]
    fn test_reload_matches_manual_push() {
        let data: Vec<u8> = (0..1000u32).map(|i| (i % 251) as u8).collect();

        let mut manual = CompactMerkleTree::new(Sha256Hasher);
        for (i, block) in data.chunks(64).enumerate() {
            manual.push_data(block, i as u64).unwrap();
        }

        let mut reloaded = CompactMerkleTree::new(Sha256Hasher);
        reloaded.push_data(b"stale", 0).unwrap();
        reloaded.reload(64, std::io::Cursor::new(&data)).unwrap();

        assert_eq!(reloaded.count(), 16);
        assert_eq!(reloaded.root(), manual.root());
    }

    #[test]
    fn test_reload_surfaces_read_errors() {
        struct Broken;
        impl Read for Broken {
            fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
                Err(std::io::Error::new(std::io::ErrorKind::Other, "disk gone"))
            }
        }

        let mut tree = CompactMerkleTree::new(LaneHasher);
        assert!(matches!(tree.reload(16, Broken), Err(MerkleError::Io(_))));
        assert!(matches!(
            tree.reload(0, std::io::empty()),
            Err(MerkleError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_state_serializes() {
        let mut tree = CompactMerkleTree::new(LaneHasher);
        for i in 0..3u64 {
            tree.push_data(&[i as u8], i).unwrap();
        }
        let json = serde_json::to_string(&tree.snapshot()).unwrap();
        let state: CompactState<ShortHash> = serde_json::from_str(&json).unwrap();
        let restored = CompactMerkleTree::restore(state, LaneHasher).unwrap();
        assert_eq!(restored.root(), tree.root());
    }
}
