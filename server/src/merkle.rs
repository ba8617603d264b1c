//! Sparse fixed-depth Merkle tree over member commitments.
//!
//! Only the occupied prefix of the leaf layer is materialized. Any missing right sibling at level
//! `k` is the precomputed empty-subtree root `Z[k]`, so roots and paths cost O(n) rather than
//! O(2^depth). The same ordered leaf list always yields the same root.

use common::{poseidon2, F};
use ark_ff::AdditiveGroup;
use std::sync::OnceLock;

/// Depth of every membership tree.
pub const TREE_DEPTH: usize = 20;

/// Maximum number of leaves.
pub const TREE_CAPACITY: usize = 1 << TREE_DEPTH;

/// `Z[0] = 0`, `Z[k] = H(Z[k-1], Z[k-1])`.
pub fn zero_values() -> &'static [F; TREE_DEPTH + 1] {
    static ZEROS: OnceLock<[F; TREE_DEPTH + 1]> = OnceLock::new();
    ZEROS.get_or_init(|| {
        let mut zeros = [F::ZERO; TREE_DEPTH + 1];
        for k in 1..=TREE_DEPTH {
            zeros[k] = poseidon2(zeros[k - 1], zeros[k - 1]);
        }
        zeros
    })
}

fn next_level(level: &[F], zero: F) -> Vec<F> {
    level
        .chunks(2)
        .map(|pair| poseidon2(pair[0], pair.get(1).copied().unwrap_or(zero)))
        .collect()
}

/// Root of the depth-20 tree whose first `leaves.len()` leaves are `leaves`.
pub fn compute_root(leaves: &[F]) -> F {
    let zeros = zero_values();
    if leaves.is_empty() {
        return zeros[TREE_DEPTH];
    }
    let mut level = leaves.to_vec();
    for zero in zeros.iter().take(TREE_DEPTH) {
        level = next_level(&level, *zero);
    }
    level[0]
}

/// A membership witness for one leaf.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MerklePath {
    pub elements: [F; TREE_DEPTH],
    /// `0` when the running node is the left child at that level, `1` when it is the right.
    pub indices: [u8; TREE_DEPTH],
}

impl MerklePath {
    /// Walks from `leaf` up to the root using the recorded siblings.
    pub fn compute_root(&self, leaf: F) -> F {
        self.elements
            .iter()
            .zip(self.indices.iter())
            .fold(leaf, |node, (sibling, index)| match index {
                0 => poseidon2(node, *sibling),
                _ => poseidon2(*sibling, node),
            })
    }

    /// Leaf position encoded by the path bits.
    pub fn leaf_index(&self) -> usize {
        self.indices
            .iter()
            .enumerate()
            .fold(0, |acc, (level, bit)| acc | (usize::from(*bit) << level))
    }
}

/// Builds the path for `leaves[index]`, or `None` if the index is out of range.
pub fn build_path(leaves: &[F], index: usize) -> Option<MerklePath> {
    if index >= leaves.len() {
        return None;
    }
    let zeros = zero_values();
    let mut elements = [F::ZERO; TREE_DEPTH];
    let mut indices = [0u8; TREE_DEPTH];
    let mut level = leaves.to_vec();
    let mut idx = index;

    for k in 0..TREE_DEPTH {
        if level.len() == 1 {
            // Lone node: left child from here up, siblings are empty subtrees.
            elements[k..].copy_from_slice(&zeros[k..TREE_DEPTH]);
            break;
        }
        let sibling = idx ^ 1;
        elements[k] = level.get(sibling).copied().unwrap_or(zeros[k]);
        indices[k] = (idx & 1) as u8;
        level = next_level(&level, zeros[k]);
        idx >>= 1;
    }

    Some(MerklePath { elements, indices })
}

#[cfg(test)]
mod test {
    use super::*;
    use ark_ff::UniformRand;
    use rand::thread_rng;

    fn random_leaves(n: usize) -> Vec<F> {
        let mut rng = thread_rng();
        (0..n).map(|_| F::rand(&mut rng)).collect()
    }

    #[test]
    fn empty_tree_is_top_zero() {
        assert_eq!(compute_root(&[]), zero_values()[TREE_DEPTH]);
    }

    #[test]
    fn zero_chain_is_self_hashed() {
        let z = zero_values();
        assert_eq!(z[0], F::ZERO);
        for k in 1..=TREE_DEPTH {
            assert_eq!(z[k], poseidon2(z[k - 1], z[k - 1]));
        }
    }

    #[test]
    fn single_leaf_folds_against_zeros() {
        let leaf = F::from(42u64);
        let z = zero_values();
        let mut expected = leaf;
        for zero in z.iter().take(TREE_DEPTH) {
            expected = poseidon2(expected, *zero);
        }
        assert_eq!(compute_root(&[leaf]), expected);
    }

    #[test]
    fn root_is_deterministic() {
        let leaves = random_leaves(13);
        let first = compute_root(&leaves);
        // Unrelated tree work in between must not matter.
        compute_root(&random_leaves(5));
        assert_eq!(compute_root(&leaves), first);
    }

    #[test]
    fn root_depends_on_order() {
        let leaves = random_leaves(4);
        let mut swapped = leaves.clone();
        swapped.swap(0, 1);
        assert_ne!(compute_root(&leaves), compute_root(&swapped));
    }

    #[test]
    fn trailing_zero_leaf_matches_sparse_fill() {
        // An explicit zero leaf at the end is indistinguishable from an empty slot.
        let leaves = random_leaves(3);
        let mut padded = leaves.clone();
        padded.push(F::ZERO);
        assert_eq!(compute_root(&leaves), compute_root(&padded));
    }

    #[test]
    fn every_path_reconstructs_the_root() {
        for n in [1usize, 2, 3, 5, 8, 17] {
            let leaves = random_leaves(n);
            let root = compute_root(&leaves);
            for (i, leaf) in leaves.iter().enumerate() {
                let path = build_path(&leaves, i).unwrap();
                assert_eq!(path.compute_root(*leaf), root, "n = {n}, i = {i}");
                assert_eq!(path.leaf_index(), i);
            }
        }
    }

    #[test]
    fn single_leaf_path_is_all_zeros_on_the_right() {
        let path = build_path(&[F::from(7u64)], 0).unwrap();
        assert_eq!(path.indices, [0u8; TREE_DEPTH]);
        assert_eq!(&path.elements[..], &zero_values()[..TREE_DEPTH]);
    }

    #[test]
    fn out_of_range_index_has_no_path() {
        assert!(build_path(&random_leaves(3), 3).is_none());
        assert!(build_path(&[], 0).is_none());
    }

    #[test]
    fn wrong_leaf_does_not_reconstruct() {
        let leaves = random_leaves(6);
        let path = build_path(&leaves, 2).unwrap();
        assert_ne!(path.compute_root(leaves[3]), compute_root(&leaves));
    }
}
