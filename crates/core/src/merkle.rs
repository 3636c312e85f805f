//! Merkle tree over transaction hashes.
//!
//! The tree is stored flattened: all leaves first, then each parent level in
//! turn, with the root as the last node. A level with an odd number of nodes
//! pairs its last node with itself; that duplicate is not stored.

use crate::hash::{hash_multi, Hash};

/// Build the flattened merkle tree for `leaves`.
///
/// Returns an empty vector for no leaves and `[leaf]` for a single leaf.
pub fn build_merkle_tree(leaves: &[Hash]) -> Vec<Hash> {
    let mut tree = leaves.to_vec();
    let mut start = 0;
    let mut len = leaves.len();

    while len > 1 {
        for i in (0..len).step_by(2) {
            let left = tree[start + i];
            let right = tree[start + (i + 1).min(len - 1)];
            tree.push(hash_multi(&[left, right]));
        }
        start += len;
        len = len.div_ceil(2);
    }

    tree
}

/// Compute the merkle root of a list of hashes.
///
/// Returns the null hash if the list is empty.
pub fn merkle_root(leaves: &[Hash]) -> Hash {
    build_merkle_tree(leaves).last().copied().unwrap_or(Hash::NULL)
}

/// A merkle tree with inclusion proofs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerkleTree {
    nodes: Vec<Hash>,
    leaf_count: usize,
}

/// A merkle proof for a single leaf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerkleProof {
    /// The leaf being proven.
    pub leaf: Hash,
    /// Index of the leaf in the tree.
    pub index: usize,
    /// Sibling hashes from leaf to root.
    pub siblings: Vec<Hash>,
    /// For each sibling, whether the running node is the left input.
    pub directions: Vec<bool>,
}

impl MerkleTree {
    /// Build a merkle tree from a list of leaf hashes.
    pub fn new(leaves: &[Hash]) -> Self {
        Self {
            nodes: build_merkle_tree(leaves),
            leaf_count: leaves.len(),
        }
    }

    /// All nodes, leaves first and root last.
    pub fn nodes(&self) -> &[Hash] {
        &self.nodes
    }

    /// Get the root, or `None` for an empty tree.
    pub fn root(&self) -> Option<Hash> {
        self.nodes.last().copied()
    }

    /// Get the number of leaves in the tree.
    pub fn leaf_count(&self) -> usize {
        self.leaf_count
    }

    /// Generate a proof for the leaf at the given index.
    pub fn proof(&self, index: usize) -> Option<MerkleProof> {
        if index >= self.leaf_count {
            return None;
        }

        let mut siblings = Vec::new();
        let mut directions = Vec::new();
        let mut start = 0;
        let mut len = self.leaf_count;
        let mut idx = index;

        while len > 1 {
            let is_left = idx % 2 == 0;
            let sibling_idx = if is_left { (idx + 1).min(len - 1) } else { idx - 1 };

            siblings.push(self.nodes[start + sibling_idx]);
            directions.push(is_left);

            start += len;
            len = len.div_ceil(2);
            idx /= 2;
        }

        Some(MerkleProof {
            leaf: self.nodes[index],
            index,
            siblings,
            directions,
        })
    }

    /// Verify a merkle proof against this tree's root.
    pub fn verify_proof(&self, proof: &MerkleProof) -> bool {
        self.root()
            .map(|root| verify_proof(&root, proof))
            .unwrap_or(false)
    }
}

/// Verify a merkle proof against a given root.
pub fn verify_proof(root: &Hash, proof: &MerkleProof) -> bool {
    if proof.siblings.len() != proof.directions.len() {
        return false;
    }

    let mut current = proof.leaf;

    for (sibling, is_left) in proof.siblings.iter().zip(proof.directions.iter()) {
        current = if *is_left {
            hash_multi(&[current, *sibling])
        } else {
            hash_multi(&[*sibling, current])
        };
    }

    current == *root
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::hash;

    fn make_hashes(n: usize) -> Vec<Hash> {
        (0..n).map(|i| hash(&[i as u8])).collect()
    }

    #[test]
    fn test_empty_tree() {
        assert!(build_merkle_tree(&[]).is_empty());
        assert_eq!(merkle_root(&[]), Hash::NULL);
        assert_eq!(MerkleTree::new(&[]).root(), None);
    }

    #[test]
    fn test_single_leaf() {
        let hashes = make_hashes(1);
        assert_eq!(build_merkle_tree(&hashes), hashes);
        assert_eq!(merkle_root(&hashes), hashes[0]);
    }

    #[test]
    fn test_two_leaves() {
        let hashes = make_hashes(2);
        let tree = build_merkle_tree(&hashes);
        assert_eq!(tree.len(), 3);
        assert_eq!(tree[2], hash_multi(&[hashes[0], hashes[1]]));
    }

    #[test]
    fn test_node_counts() {
        let expected = [(3, 6), (4, 7), (5, 11), (7, 14), (8, 15)];
        for (leaves, nodes) in expected {
            assert_eq!(build_merkle_tree(&make_hashes(leaves)).len(), nodes, "{leaves} leaves");
        }
    }

    #[test]
    fn test_odd_level_pairs_last_with_itself() {
        let h = make_hashes(3);
        let tree = build_merkle_tree(&h);

        let left = hash_multi(&[h[0], h[1]]);
        let right = hash_multi(&[h[2], h[2]]);
        assert_eq!(&tree[3..], &[left, right, hash_multi(&[left, right])]);
    }

    #[test]
    fn test_merkle_root_deterministic() {
        let hashes = make_hashes(10);
        assert_eq!(build_merkle_tree(&hashes), build_merkle_tree(&hashes));
    }

    #[test]
    fn test_merkle_root_order_matters() {
        let hashes = make_hashes(7);
        let mut swapped = hashes.clone();
        swapped.swap(1, 4);

        assert_ne!(merkle_root(&hashes), merkle_root(&swapped));
    }

    #[test]
    fn test_merkle_proof_valid() {
        for n in [1, 2, 5, 7, 8] {
            let hashes = make_hashes(n);
            let tree = MerkleTree::new(&hashes);

            for i in 0..n {
                let proof = tree.proof(i).unwrap();
                assert_eq!(proof.leaf, hashes[i]);
                assert!(tree.verify_proof(&proof), "leaf {i} of {n}");
            }
        }
    }

    #[test]
    fn test_merkle_proof_invalid_index() {
        let tree = MerkleTree::new(&make_hashes(4));
        assert!(tree.proof(4).is_none());
    }

    #[test]
    fn test_merkle_proof_wrong_root() {
        let tree = MerkleTree::new(&make_hashes(4));
        let proof = tree.proof(0).unwrap();

        let wrong_root = hash(b"wrong");
        assert!(!verify_proof(&wrong_root, &proof));
    }

    #[test]
    fn test_tampered_proof_fails() {
        let tree = MerkleTree::new(&make_hashes(6));
        let mut proof = tree.proof(3).unwrap();
        proof.leaf = hash(b"forged");
        assert!(!tree.verify_proof(&proof));
    }
}
