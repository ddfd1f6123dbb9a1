//! Merkle tree over 32-byte item hashes.
//!
//! Used for sub-block transaction roots and for plasma batch commitments.
//! Leaves and internal nodes are hashed under different domains, so a leaf
//! can never be passed off as an internal node. Odd levels duplicate their
//! last node.

use serde::{Deserialize, Serialize};

use crate::error::CryptoError;
use crate::hash::{domain, domain_hash};

/// Which side the sibling sits on when recomputing the parent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Left,
    Right,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleTree {
    items: Vec<[u8; 32]>,
    /// Level 0 holds leaf hashes, the last level holds the root.
    levels: Vec<Vec<[u8; 32]>>,
}

impl MerkleTree {
    pub fn new(items: Vec<[u8; 32]>) -> Result<Self, CryptoError> {
        if items.is_empty() {
            return Err(CryptoError::EmptyMerkleTree);
        }

        let mut current: Vec<[u8; 32]> = items.iter().map(leaf_hash).collect();
        let mut levels = vec![current.clone()];
        while current.len() > 1 {
            current = next_level(&current);
            levels.push(current.clone());
        }

        Ok(Self { items, levels })
    }

    pub fn root(&self) -> [u8; 32] {
        // A tree always has at least one level with at least one node.
        self.levels
            .last()
            .and_then(|level| level.first())
            .copied()
            .unwrap_or([0u8; 32])
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[[u8; 32]] {
        &self.items
    }

    /// Position of an item in the tree, if present.
    pub fn position(&self, item: &[u8; 32]) -> Option<usize> {
        self.items.iter().position(|i| i == item)
    }

    pub fn generate_proof(&self, index: usize) -> Result<MerkleProof, CryptoError> {
        if index >= self.items.len() {
            return Err(CryptoError::InvalidLeafIndex {
                index,
                size: self.items.len(),
            });
        }

        let mut siblings = Vec::with_capacity(self.levels.len());
        let mut current = index;
        for level in &self.levels[..self.levels.len() - 1] {
            let (sibling_index, direction) = if current % 2 == 0 {
                (current + 1, Direction::Right)
            } else {
                (current - 1, Direction::Left)
            };
            let sibling = level.get(sibling_index).unwrap_or(&level[current]);
            siblings.push((*sibling, direction));
            current /= 2;
        }

        Ok(MerkleProof {
            leaf_index: index,
            item: self.items[index],
            siblings,
        })
    }
}

/// Inclusion proof for one item.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleProof {
    pub leaf_index: usize,
    pub item: [u8; 32],
    /// Sibling hashes from leaf to root.
    pub siblings: Vec<([u8; 32], Direction)>,
}

impl MerkleProof {
    /// Recompute the root this proof commits to.
    pub fn compute_root(&self) -> [u8; 32] {
        let mut current = leaf_hash(&self.item);
        for (sibling, direction) in &self.siblings {
            current = match direction {
                Direction::Left => node_hash(sibling, &current),
                Direction::Right => node_hash(&current, sibling),
            };
        }
        current
    }
}

/// Check that `proof` shows `item` is included under `root`.
pub fn verify_proof(item: &[u8; 32], proof: &MerkleProof, root: &[u8; 32]) -> bool {
    proof.item == *item && proof.compute_root() == *root
}

/// Root of a list of items. The empty list has the all-zero root.
pub fn merkle_root(items: &[[u8; 32]]) -> [u8; 32] {
    match MerkleTree::new(items.to_vec()) {
        Ok(tree) => tree.root(),
        Err(_) => [0u8; 32],
    }
}

fn leaf_hash(item: &[u8; 32]) -> [u8; 32] {
    domain_hash(domain::MERKLE_LEAF, &[item])
}

fn node_hash(left: &[u8; 32], right: &[u8; 32]) -> [u8; 32] {
    domain_hash(domain::MERKLE_NODE, &[left, right])
}

fn next_level(current: &[[u8; 32]]) -> Vec<[u8; 32]> {
    current
        .chunks(2)
        .map(|pair| match pair {
            [left, right] => node_hash(left, right),
            [single] => node_hash(single, single),
            _ => unreachable!("chunks(2) yields one or two items"),
        })
        .collect()
}
