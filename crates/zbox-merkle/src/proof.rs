//! Range proofs over the validation tree.
//!
//! A [`MerklePath`] proves that a contiguous run of 64 KiB leaves belongs to a
//! validation root. Per level it carries at most two sibling digests: one to
//! the left of the covered range and one to the right.

use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::error::{MerkleError, MerkleResult};
use crate::hash::{self, HashValue};
use crate::validation::{reduce_level, tree_depth};
use crate::{HASH_LENGTH, MAX_MERKLE_LEAF_SIZE};

/// Which side of the covered range a sibling sits on.
///
/// Serialized as the integer `0` (left) or `1` (right).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Side {
    Left = 0,
    Right = 1,
}

impl From<Side> for u8 {
    fn from(side: Side) -> u8 {
        side as u8
    }
}

impl TryFrom<u8> for Side {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Side::Left),
            1 => Ok(Side::Right),
            other => Err(format!("invalid sibling side {}", other)),
        }
    }
}

/// Proof for the leaf range `[start, end]` of a validation tree.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerklePath {
    pub root: HashValue,
    /// Sibling digests per level, leaves first
    pub nodes: Vec<Vec<HashValue>>,
    /// Side of each entry in `nodes`
    pub index: Vec<Vec<Side>>,
    pub data_size: u64,
}

impl MerklePath {
    /// Leaf count of the tree this proof was built from
    pub fn total_leaves(&self) -> u64 {
        self.data_size.div_ceil(MAX_MERKLE_LEAF_SIZE as u64)
    }

    /// Check that `data` is exactly leaves `[start, end]` of the file and
    /// hashes up to `root`.
    ///
    /// `start` and `end` are the range the caller asked for; `end` is clamped
    /// to the last leaf. Every level must carry exactly the siblings that
    /// range needs, on the sides it needs them.
    pub fn verify(&self, start: u64, end: u64, data: &[u8]) -> MerkleResult<()> {
        let total = self.total_leaves();
        if total == 0 {
            return Err(MerkleError::InvalidProof("proof covers an empty file".into()));
        }
        let range = leaf_byte_range(start, end, self.data_size)?;
        let end = end.min(total - 1);
        if data.len() as u64 != range.end - range.start {
            return Err(MerkleError::InvalidProof(format!(
                "leaves [{}, {}] span {} bytes, got {}",
                start,
                end,
                range.end - range.start,
                data.len()
            )));
        }
        if self.nodes.len() != self.index.len() {
            return Err(MerkleError::InvalidProof(format!(
                "{} node levels but {} index levels",
                self.nodes.len(),
                self.index.len()
            )));
        }

        let depth = tree_depth(total);
        if self.nodes.len() >= depth {
            return Err(MerkleError::InvalidProof(format!(
                "{} levels for a tree of depth {}",
                self.nodes.len(),
                depth
            )));
        }
        let expected = sibling_positions(total, start, end);
        if self.nodes.len() < expected.len() {
            return Err(MerkleError::InvalidProof(format!(
                "{} levels but leaves [{}, {}] need {}",
                self.nodes.len(),
                start,
                end,
                expected.len()
            )));
        }

        let mut hashes: Vec<HashValue> = data.chunks(MAX_MERKLE_LEAF_SIZE).map(hash::blake3).collect();
        for (level, (nodes, sides)) in self.nodes.iter().zip(&self.index).enumerate() {
            let wanted: Vec<Side> = expected
                .get(level)
                .map(|positions| positions.iter().map(|(_, side)| *side).collect())
                .unwrap_or_default();
            check_level(level, nodes, sides, &wanted)?;
            for (node, side) in nodes.iter().zip(sides) {
                match side {
                    Side::Left => hashes.insert(0, *node),
                    Side::Right => hashes.push(*node),
                }
            }
            hashes = reduce_level(&hashes);
        }
        while hashes.len() > 1 {
            hashes = reduce_level(&hashes);
        }

        match hashes.as_slice() {
            [computed] if *computed == self.root => Ok(()),
            [computed] => Err(MerkleError::InvalidProof(format!(
                "computed root {} does not match {}",
                computed, self.root
            ))),
            _ => Err(MerkleError::InvalidProof("no leaves to verify".into())),
        }
    }

    /// Slice a proof out of a flattened node array (see
    /// [`ValidationTree::flatten_nodes`](crate::ValidationTree::flatten_nodes)).
    pub fn from_flat_nodes(
        flat: &[u8],
        root: HashValue,
        data_size: u64,
        start: u64,
        end: u64,
    ) -> MerkleResult<Self> {
        let total = data_size.div_ceil(MAX_MERKLE_LEAF_SIZE as u64);
        if start > end || start >= total {
            return Err(MerkleError::InvalidRange { start, end, total });
        }
        let end = end.min(total - 1);

        let mut nodes = Vec::new();
        let mut index = Vec::new();
        let mut level_offset = 0u64;
        let mut level_width = total;

        for positions in sibling_positions(total, start, end) {
            let mut level_nodes = Vec::with_capacity(positions.len());
            let mut level_sides = Vec::with_capacity(positions.len());
            for (position, side) in positions {
                let offset = ((level_offset + position) as usize) * HASH_LENGTH;
                let bytes = flat.get(offset..offset + HASH_LENGTH).ok_or_else(|| {
                    MerkleError::InvalidInput(format!(
                        "flat nodes too short: need {} bytes, have {}",
                        offset + HASH_LENGTH,
                        flat.len()
                    ))
                })?;
                level_nodes.push(HashValue::from_slice(bytes)?);
                level_sides.push(side);
            }
            nodes.push(level_nodes);
            index.push(level_sides);

            level_offset += level_width;
            level_width = level_width.div_ceil(2);
        }

        Ok(Self {
            root,
            nodes,
            index,
            data_size,
        })
    }
}

fn check_level(level: usize, nodes: &[HashValue], sides: &[Side], wanted: &[Side]) -> MerkleResult<()> {
    if nodes.len() != sides.len() {
        return Err(MerkleError::InvalidProof(format!(
            "level {}: {} nodes but {} sides",
            level,
            nodes.len(),
            sides.len()
        )));
    }
    if sides != wanted {
        return Err(MerkleError::InvalidProof(format!(
            "level {}: siblings {:?}, range needs {:?}",
            level, sides, wanted
        )));
    }
    Ok(())
}

/// Sibling positions per level for the leaf range `[start, end]`.
///
/// Stops at the first level where the range spans the whole level.
pub(crate) fn sibling_positions(total_leaves: u64, start: u64, end: u64) -> Vec<Vec<(u64, Side)>> {
    let depth = tree_depth(total_leaves);
    let (mut s, mut e, mut width) = (start, end, total_leaves);
    let mut levels = Vec::new();

    for _ in 0..depth.saturating_sub(1) {
        if s == 0 && e == width - 1 {
            break;
        }
        let mut level = Vec::with_capacity(2);
        if s % 2 == 1 {
            level.push((s - 1, Side::Left));
        }
        if e != width - 1 && e % 2 == 0 {
            level.push((e + 1, Side::Right));
        }
        levels.push(level);

        s /= 2;
        e /= 2;
        width = width.div_ceil(2);
    }
    levels
}

/// Verify `data` against `path` as leaves `[start, end]` of the file.
pub fn verify_range(path: &MerklePath, start: u64, end: u64, data: &[u8]) -> MerkleResult<()> {
    path.verify(start, end, data)
}

/// Byte range covered by leaves `[start, end]` of a file of `data_size` bytes.
pub fn leaf_byte_range(start: u64, end: u64, data_size: u64) -> MerkleResult<Range<u64>> {
    let total = data_size.div_ceil(MAX_MERKLE_LEAF_SIZE as u64);
    if start > end || start >= total {
        return Err(MerkleError::InvalidRange { start, end, total });
    }
    let leaf = MAX_MERKLE_LEAF_SIZE as u64;
    let end = end.min(total - 1);
    Ok(start * leaf..((end + 1) * leaf).min(data_size))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ValidationTree;

    const L: u64 = MAX_MERKLE_LEAF_SIZE as u64;

    #[test]
    fn test_side_serializes_as_integer() {
        assert_eq!(serde_json::to_string(&Side::Left).unwrap(), "0");
        assert_eq!(serde_json::to_string(&Side::Right).unwrap(), "1");
        assert_eq!(serde_json::from_str::<Side>("1").unwrap(), Side::Right);
        assert!(serde_json::from_str::<Side>("2").is_err());
    }

    #[test]
    fn test_path_json_shape() {
        let path = MerklePath {
            root: hash::blake3(b"root"),
            nodes: vec![vec![hash::blake3(b"a")], vec![]],
            index: vec![vec![Side::Left], vec![]],
            data_size: 3 * L,
        };
        let value = serde_json::to_value(&path).unwrap();
        assert_eq!(value["index"], serde_json::json!([[0], []]));
        assert_eq!(value["data_size"], serde_json::json!(3 * L));
        assert_eq!(value["root"], serde_json::json!(path.root.to_hex()));

        let back: MerklePath = serde_json::from_value(value).unwrap();
        assert_eq!(back, path);
    }

    #[test]
    fn test_sibling_positions() {
        assert!(sibling_positions(1, 0, 0).is_empty());
        assert_eq!(sibling_positions(2, 1, 1), vec![vec![(0, Side::Left)]]);

        // 5 leaves, leaf 4 alone: it is promoted twice before meeting node 0.
        assert_eq!(
            sibling_positions(5, 4, 4),
            vec![vec![], vec![], vec![(0, Side::Left)]]
        );
        assert_eq!(
            sibling_positions(4, 1, 1),
            vec![vec![(0, Side::Left)], vec![(1, Side::Right)]]
        );
    }

    #[test]
    fn test_leaf_byte_range() {
        assert_eq!(leaf_byte_range(1, 3, 340 * 1024).unwrap(), L..4 * L);
        assert_eq!(leaf_byte_range(4, 9, 340 * 1024).unwrap(), 4 * L..340 * 1024);
        assert!(matches!(
            leaf_byte_range(6, 6, 340 * 1024),
            Err(MerkleError::InvalidRange { total: 6, .. })
        ));
        assert!(leaf_byte_range(0, 0, 0).is_err());
    }

    fn finalized(data: &[u8]) -> ValidationTree {
        let mut tree = ValidationTree::new(data.len() as u64);
        tree.write(data).unwrap();
        tree.finalize().unwrap();
        tree
    }

    #[test]
    fn test_verify_rejects_malformed_paths() {
        let data = vec![3u8; (4 * L) as usize];
        let tree = finalized(&data);
        let leaf1 = &data[L as usize..2 * L as usize];

        let good = tree.range_proof(1, 1).unwrap();
        verify_range(&good, 1, 1, leaf1).unwrap();

        let mut missing_side = good.clone();
        missing_side.index[0].clear();
        assert!(matches!(
            missing_side.verify(1, 1, leaf1),
            Err(MerkleError::InvalidProof(_))
        ));

        let mut flipped = good.clone();
        flipped.index[0][0] = Side::Right;
        assert!(flipped.verify(1, 1, leaf1).is_err());

        let mut too_deep = good.clone();
        too_deep.nodes.extend(vec![vec![]; 3]);
        too_deep.index.extend(vec![vec![]; 3]);
        assert!(too_deep.verify(1, 1, leaf1).is_err());

        let mut truncated = good.clone();
        truncated.nodes.pop();
        truncated.index.pop();
        assert!(truncated.verify(1, 1, leaf1).is_err());

        assert!(good.verify(1, 1, &[]).is_err());
        assert!(matches!(
            good.verify(4, 4, leaf1),
            Err(MerkleError::InvalidRange { .. })
        ));
    }

    #[test]
    fn test_verify_rejects_child_digests_as_data() {
        let data: Vec<u8> = (0..4 * L).map(|i| (i % 251) as u8).collect();
        let tree = finalized(&data);
        let leaves = tree.leaves().to_vec();

        // leaf0 || leaf1 hashes to parent(0, 1) with BLAKE3 on both levels.
        let mut forged = leaves[0].to_vec();
        forged.extend_from_slice(leaves[1].as_bytes());
        assert_eq!(forged.len(), 64);

        let proof = tree.range_proof(0, 1).unwrap();
        proof.verify(0, 1, &data[..2 * L as usize]).unwrap();
        assert!(matches!(
            proof.verify(0, 1, &forged),
            Err(MerkleError::InvalidProof(_))
        ));
        assert!(proof.verify(0, 0, &forged).is_err());
    }

    #[test]
    fn test_short_last_leaf() {
        let data: Vec<u8> = (0..4 * L + 64).map(|i| (i % 7) as u8).collect();
        let tree = finalized(&data);
        let leaves = tree.leaves().to_vec();
        assert_eq!(leaves.len(), 5);

        let last = tree.range_proof(4, 4).unwrap();
        last.verify(4, 4, &data[(4 * L) as usize..]).unwrap();
        // A request past the end is clamped to the last leaf.
        last.verify(4, 9, &data[(4 * L) as usize..]).unwrap();

        let mut forged = leaves[0].to_vec();
        forged.extend_from_slice(leaves[1].as_bytes());
        let head = tree.range_proof(0, 1).unwrap();
        assert!(head.verify(0, 1, &forged).is_err());
        assert!(last.verify(4, 4, &forged).is_err());
    }

    #[test]
    fn test_verify_rejects_other_range() {
        let data: Vec<u8> = (0..4 * L).map(|i| (i % 13) as u8).collect();
        let tree = finalized(&data);
        let head = &data[..2 * L as usize];
        let tail = &data[2 * L as usize..];

        let tail_proof = tree.range_proof(2, 3).unwrap();
        tail_proof.verify(2, 3, tail).unwrap();
        assert!(verify_range(&tail_proof, 0, 1, tail).is_err());

        let head_proof = tree.range_proof(0, 1).unwrap();
        assert!(verify_range(&head_proof, 0, 1, tail).is_err());
        assert!(verify_range(&head_proof, 2, 3, tail).is_err());
        verify_range(&head_proof, 0, 1, head).unwrap();
    }

    #[test]
    fn test_from_flat_nodes_short_input() {
        let root = hash::blake3(b"root");
        assert!(matches!(
            MerklePath::from_flat_nodes(&[0u8; 32], root, 4 * L, 1, 1),
            Err(MerkleError::InvalidInput(_))
        ));
        assert!(matches!(
            MerklePath::from_flat_nodes(&[], root, 4 * L, 5, 5),
            Err(MerkleError::InvalidRange { .. })
        ));
    }
}
