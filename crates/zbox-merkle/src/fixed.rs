//! Fixed-fan-out Merkle tree for outsourcing-attack protection.
//!
//! Every file chunk is cut into 1024 sub-chunks; sub-chunk `j` of chunk `k`
//! becomes leaf `k` of lane `j`. Each lane is a [`CompactMerkleTree`] over SHA-1
//! leaves, and the fixed root is a depth-10 SHA-256 tree over the 1024 lane
//! roots. Proving one sub-chunk therefore needs only ten sibling digests plus
//! the lane's own path.

#[cfg(feature = "parallel")]
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::io::Read;

use crate::compact::{CompactMerkleTree, LaneHasher};
use crate::error::{MerkleError, MerkleResult};
use crate::hash::{sha256_pair, HashValue, ShortHash};
use crate::{read_chunk, FIXED_MERKLE_LEAVES, FIXED_MT_DEPTH};

/// 1024 interleaved compact lanes.
#[derive(Clone, Debug)]
pub struct FixedMerkleTree {
    chunk_size: usize,
    sub_chunk_size: usize,
    /// Allocated on first write
    lanes: Vec<CompactMerkleTree<LaneHasher>>,
}

impl FixedMerkleTree {
    /// Create a tree for chunks of at most `chunk_size` bytes
    pub fn new(chunk_size: usize) -> MerkleResult<Self> {
        if chunk_size == 0 {
            return Err(MerkleError::InvalidInput("chunk size must be positive".into()));
        }
        Ok(Self {
            chunk_size,
            sub_chunk_size: chunk_size.div_ceil(FIXED_MERKLE_LEAVES).max(1),
            lanes: Vec::new(),
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Bytes routed to each lane per chunk
    pub fn sub_chunk_size(&self) -> usize {
        self.sub_chunk_size
    }

    /// Number of chunks absorbed (identical on every lane)
    pub fn count(&self) -> u64 {
        self.lanes.first().map_or(0, CompactMerkleTree::count)
    }

    pub fn lane(&self, index: usize) -> Option<&CompactMerkleTree<LaneHasher>> {
        self.lanes.get(index)
    }

    /// Interleave `chunk` across the lanes as leaf `chunk_index`.
    ///
    /// Chunk indices follow the same ordering rules as
    /// [`CompactMerkleTree::push`]. Lanes past the end of a short chunk
    /// receive the digest of an empty sub-chunk so all lanes stay level.
    pub fn write(&mut self, chunk: &[u8], chunk_index: u64) -> MerkleResult<()> {
        if chunk.len() > self.chunk_size {
            return Err(MerkleError::ChunkTooLarge {
                max: self.chunk_size,
                got: chunk.len(),
            });
        }

        let count = self.count();
        if chunk_index < count {
            return Err(MerkleError::LeafExists {
                index: chunk_index,
                count,
            });
        }
        if chunk_index > count {
            return Err(MerkleError::LeafOutOfOrder {
                index: chunk_index,
                expected: count,
            });
        }

        if self.lanes.is_empty() {
            self.lanes = (0..FIXED_MERKLE_LEAVES)
                .map(|_| CompactMerkleTree::new(LaneHasher))
                .collect();
        }

        let size = self.sub_chunk_size;

        #[cfg(feature = "parallel")]
        let result = self
            .lanes
            .par_iter_mut()
            .enumerate()
            .try_for_each(|(lane, tree)| {
                tree.push_data(sub_chunk(chunk, lane, size), chunk_index)
            });

        #[cfg(not(feature = "parallel"))]
        let result = self
            .lanes
            .iter_mut()
            .enumerate()
            .try_for_each(|(lane, tree)| {
                tree.push_data(sub_chunk(chunk, lane, size), chunk_index)
            });

        result
    }

    /// Root of each lane, or `None` before the first write
    pub fn lane_roots(&self) -> Option<Vec<ShortHash>> {
        if self.lanes.is_empty() {
            return None;
        }

        #[cfg(feature = "parallel")]
        let roots = self.lanes.par_iter().map(CompactMerkleTree::root).collect();

        #[cfg(not(feature = "parallel"))]
        let roots = self.lanes.iter().map(CompactMerkleTree::root).collect();

        roots
    }

    /// Root over the 1024 lane roots, or `None` before the first write
    pub fn root(&self) -> Option<HashValue> {
        let lane_roots = self.lane_roots()?;
        let mut level = lane_level(&lane_roots);
        while level.len() > 1 {
            level = parent_level(&level);
        }
        level.first().copied()
    }

    /// Path from lane `lane` up to the fixed root
    pub fn lane_proof(&self, lane: usize) -> Option<LaneProof> {
        if lane >= FIXED_MERKLE_LEAVES {
            return None;
        }
        let lane_roots = self.lane_roots()?;

        let sibling = *lane_roots.get(lane ^ 1)?;
        let mut level = lane_level(&lane_roots);
        let mut index = lane >> 1;
        let mut nodes = Vec::with_capacity(FIXED_MT_DEPTH - 1);
        while level.len() > 1 {
            nodes.push(*level.get(index ^ 1)?);
            level = parent_level(&level);
            index >>= 1;
        }

        Some(LaneProof {
            lane,
            sibling,
            nodes,
        })
    }

    /// Reset and rebuild every lane from `reader` in `chunk_size` pieces
    pub fn reload<R: Read>(&mut self, mut reader: R) -> MerkleResult<()> {
        self.lanes.clear();

        let mut buf = vec![0u8; self.chunk_size];
        for index in 0u64.. {
            let n = read_chunk(&mut reader, &mut buf)?;
            if n == 0 {
                break;
            }
            self.write(&buf[..n], index)?;
            if n < self.chunk_size {
                break;
            }
        }
        Ok(())
    }
}

/// Sub-chunk of `chunk` routed to `lane`; empty past the end of the chunk.
fn sub_chunk(chunk: &[u8], lane: usize, size: usize) -> &[u8] {
    let start = (lane * size).min(chunk.len());
    let end = (start + size).min(chunk.len());
    &chunk[start..end]
}

/// First tree level: pairs of 20-byte lane roots hashed into 32-byte nodes.
fn lane_level(lane_roots: &[ShortHash]) -> Vec<HashValue> {
    lane_roots
        .chunks_exact(2)
        .map(|pair| sha256_pair(pair[0].as_bytes(), pair[1].as_bytes()))
        .collect()
}

fn parent_level(level: &[HashValue]) -> Vec<HashValue> {
    level
        .chunks_exact(2)
        .map(|pair| sha256_pair(pair[0].as_bytes(), pair[1].as_bytes()))
        .collect()
}

/// Sibling path from one lane root to the fixed root.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaneProof {
    /// Lane index in `0..1024`
    pub lane: usize,
    /// Root of the neighbouring lane
    pub sibling: ShortHash,
    /// Remaining siblings, bottom-up
    pub nodes: Vec<HashValue>,
}

impl LaneProof {
    /// Check that `lane_root` at `self.lane` hashes up to `root`
    pub fn verify(&self, lane_root: &ShortHash, root: &HashValue) -> MerkleResult<()> {
        if self.lane >= FIXED_MERKLE_LEAVES {
            return Err(MerkleError::InvalidProof(format!("lane {} out of range", self.lane)));
        }
        if self.nodes.len() != FIXED_MT_DEPTH - 1 {
            return Err(MerkleError::InvalidProof(format!(
                "expected {} nodes, got {}",
                FIXED_MT_DEPTH - 1,
                self.nodes.len()
            )));
        }

        let mut index = self.lane;
        let mut acc = if index & 1 == 0 {
            sha256_pair(lane_root.as_bytes(), self.sibling.as_bytes())
        } else {
            sha256_pair(self.sibling.as_bytes(), lane_root.as_bytes())
        };
        index >>= 1;

        for node in &self.nodes {
            acc = if index & 1 == 0 {
                sha256_pair(acc.as_bytes(), node.as_bytes())
            } else {
                sha256_pair(node.as_bytes(), acc.as_bytes())
            };
            index >>= 1;
        }

        if &acc == root {
            Ok(())
        } else {
            Err(MerkleError::InvalidProof(format!(
                "root mismatch: expected {}, computed {}",
                root, acc
            )))
        }
    }
}
