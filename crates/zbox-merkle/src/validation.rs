//! Validation tree over fixed-size data leaves.
//!
//! File data is split into 64 KiB leaves, each hashed with BLAKE3. Parents are
//! BLAKE3 of the concatenated children; when a level has odd arity its last
//! node is promoted unchanged. The root is what a reader checks range proofs
//! ([`MerklePath`]) against.

use std::fmt;
use std::io;

use crate::error::{MerkleError, MerkleResult};
use crate::hash::{self, HashValue};
use crate::proof::{sibling_positions, MerklePath};
use crate::{HASH_LENGTH, MAX_MERKLE_LEAF_SIZE};

/// Initial leaf capacity when the expected size gives no hint
const START_LENGTH: usize = 64;

/// Depth of a validation tree with `leaf_count` leaves: `ceil(log2(n)) + 1`.
pub fn tree_depth(leaf_count: u64) -> usize {
    if leaf_count <= 1 {
        1
    } else {
        (u64::BITS - (leaf_count - 1).leading_zeros()) as usize + 1
    }
}

/// Hash one level into the next: pairs are hashed, an odd tail is promoted.
pub(crate) fn reduce_level(nodes: &[HashValue]) -> Vec<HashValue> {
    nodes
        .chunks(2)
        .map(|pair| match pair {
            [left, right] => hash::blake3_pair(left, right),
            [single] => *single,
            _ => unreachable!("chunks(2) yields one or two nodes"),
        })
        .collect()
}

/// Root over a complete leaf vector.
pub(crate) fn root_of(leaves: &[HashValue]) -> HashValue {
    if leaves.is_empty() {
        return hash::blake3(&[]);
    }
    let mut level = leaves.to_vec();
    while level.len() > 1 {
        level = reduce_level(&level);
    }
    level[0]
}

/// Incrementally built validation tree for one file.
#[derive(Clone)]
pub struct ValidationTree {
    data_size: u64,
    written: u64,
    in_leaf: usize,
    hasher: blake3::Hasher,
    leaves: Vec<HashValue>,
    finalized: bool,
    root: Option<HashValue>,
}

impl ValidationTree {
    /// Create a tree expecting exactly `data_size` bytes
    pub fn new(data_size: u64) -> Self {
        let capacity = match data_size.div_ceil(MAX_MERKLE_LEAF_SIZE as u64) {
            0 => START_LENGTH,
            n => n as usize,
        };
        Self {
            data_size,
            written: 0,
            in_leaf: 0,
            hasher: blake3::Hasher::new(),
            leaves: Vec::with_capacity(capacity),
            finalized: false,
            root: None,
        }
    }

    /// Rebuild a finalized tree from stored leaf digests.
    ///
    /// `leaves` must hold one digest per 64 KiB of `data_size`, or exactly one
    /// for an empty file.
    pub fn from_leaves(leaves: Vec<HashValue>, data_size: u64) -> MerkleResult<Self> {
        let expected = data_size.div_ceil(MAX_MERKLE_LEAF_SIZE as u64).max(1);
        if leaves.len() as u64 != expected {
            return Err(MerkleError::InvalidInput(format!(
                "{} leaves for {} bytes, expected {}",
                leaves.len(),
                data_size,
                expected
            )));
        }
        let root = root_of(&leaves);
        Ok(Self {
            data_size,
            written: data_size,
            in_leaf: 0,
            hasher: blake3::Hasher::new(),
            leaves,
            finalized: true,
            root: Some(root),
        })
    }

    pub fn data_size(&self) -> u64 {
        self.data_size
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    /// Leaves emitted so far (complete once finalized)
    pub fn leaves(&self) -> &[HashValue] {
        &self.leaves
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Feed file bytes. May be called any number of times before finalize.
    pub fn write(&mut self, data: &[u8]) -> MerkleResult<usize> {
        if self.finalized {
            return Err(MerkleError::AlreadyFinalized);
        }
        if data.is_empty() {
            return Ok(0);
        }

        let total = self.written + data.len() as u64;
        if total > self.data_size {
            return Err(MerkleError::SizeOverflow {
                expected: self.data_size,
                got: total,
            });
        }

        let mut rest = data;
        while !rest.is_empty() {
            let take = (MAX_MERKLE_LEAF_SIZE - self.in_leaf).min(rest.len());
            let (head, tail) = rest.split_at(take);
            self.hasher.update(head);
            self.in_leaf += take;
            rest = tail;

            if self.in_leaf == MAX_MERKLE_LEAF_SIZE {
                self.leaves.push(self.hasher.finalize().into());
                self.hasher.reset();
                self.in_leaf = 0;
            }
        }

        self.written = total;
        Ok(data.len())
    }

    /// Close the tree: flush the short last leaf and fix the root.
    pub fn finalize(&mut self) -> MerkleResult<()> {
        if self.finalized {
            return Err(MerkleError::AlreadyFinalized);
        }
        if self.written != self.data_size {
            return Err(MerkleError::SizeMismatch {
                expected: self.data_size,
                written: self.written,
            });
        }

        // An empty file still gets one (empty) leaf.
        if self.in_leaf > 0 || self.leaves.is_empty() {
            self.leaves.push(self.hasher.finalize().into());
            self.hasher.reset();
            self.in_leaf = 0;
        }

        self.finalized = true;
        self.root = Some(root_of(&self.leaves));
        Ok(())
    }

    /// Current root.
    ///
    /// Stable once finalized. Before that it covers the bytes written so far,
    /// with the partial leaf hashed as it stands.
    pub fn root(&self) -> HashValue {
        if let Some(root) = self.root {
            return root;
        }
        if self.in_leaf == 0 {
            return root_of(&self.leaves);
        }
        let mut leaves = self.leaves.clone();
        leaves.push(self.hasher.finalize().into());
        root_of(&leaves)
    }

    /// Number of levels, root included
    pub fn depth(&self) -> usize {
        let pending = usize::from(!self.finalized && self.in_leaf > 0);
        tree_depth((self.leaves.len() + pending) as u64)
    }

    /// Every level, leaves first and root last
    fn levels(&self) -> Vec<Vec<HashValue>> {
        let mut levels = vec![self.leaves.clone()];
        loop {
            let last = &levels[levels.len() - 1];
            if last.len() <= 1 {
                break;
            }
            let next = reduce_level(last);
            levels.push(next);
        }
        levels
    }

    /// All node digests concatenated level by level, leaves first.
    ///
    /// This is the layout a blobber persists and slices proofs out of with
    /// [`MerklePath::from_flat_nodes`].
    pub fn flatten_nodes(&self) -> MerkleResult<Vec<u8>> {
        if !self.finalized {
            return Err(MerkleError::NotFinalized);
        }
        let levels = self.levels();
        let total: usize = levels.iter().map(Vec::len).sum();
        let mut flat = Vec::with_capacity(total * HASH_LENGTH);
        for node in levels.iter().flatten() {
            flat.extend_from_slice(node.as_bytes());
        }
        Ok(flat)
    }

    /// Build the proof for leaves `start..=end`
    pub fn range_proof(&self, start: u64, end: u64) -> MerkleResult<MerklePath> {
        if !self.finalized {
            return Err(MerkleError::NotFinalized);
        }
        let total = self.leaves.len() as u64;
        if start > end || start >= total {
            return Err(MerkleError::InvalidRange { start, end, total });
        }
        let end = end.min(total - 1);

        let levels = self.levels();
        let mut nodes = Vec::new();
        let mut index = Vec::new();
        for (level, positions) in sibling_positions(total, start, end).into_iter().enumerate() {
            let mut level_nodes = Vec::with_capacity(positions.len());
            let mut level_sides = Vec::with_capacity(positions.len());
            for (position, side) in positions {
                let node = levels
                    .get(level)
                    .and_then(|nodes| nodes.get(position as usize))
                    .ok_or_else(|| {
                        MerkleError::InvalidInput(format!("no node {} at level {}", position, level))
                    })?;
                level_nodes.push(*node);
                level_sides.push(side);
            }
            nodes.push(level_nodes);
            index.push(level_sides);
        }

        Ok(MerklePath {
            root: self.root(),
            nodes,
            index,
            data_size: self.data_size,
        })
    }
}

impl fmt::Debug for ValidationTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidationTree")
            .field("data_size", &self.data_size)
            .field("written", &self.written)
            .field("leaves", &self.leaves.len())
            .field("finalized", &self.finalized)
            .finish()
    }
}

impl io::Write for ValidationTree {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        ValidationTree::write(self, buf).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
