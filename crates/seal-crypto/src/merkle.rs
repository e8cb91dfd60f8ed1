//! # Merkle Commitments
//!
//! Binary merkle root over a category's sorted leaf digests, used for the
//! per-category `inputs_commitments` of a sealed run.
//!
//! ## Algorithm
//!
//! Domain-separated SHA-256:
//! - Leaf: `SHA256(0x00 || leaf_bytes)` where `leaf_bytes` is the 32-byte
//!   content digest of one file.
//! - Node: `SHA256(0x01 || left || right)`.
//!
//! Leaves are sorted by their `sha256:<hex>` text before hashing. A level
//! with an odd node count duplicates its last node. An empty category has
//! the root `SHA256("")`.
//!
//! The padding rule is part of the commitment format: changing it changes
//! every stored root.

use sha2::{Digest, Sha256};

use seal_core::{sha256_raw, ContentDigest, DigestAlgorithm};

pub const MERKLE_ALGORITHM: &str = "sha256-merkle";

fn leaf_hash(leaf: &ContentDigest) -> [u8; 32] {
    let mut h = Sha256::new();
    h.update([0x00]);
    h.update(leaf.as_bytes());
    h.finalize().into()
}

fn node_hash(left: &[u8; 32], right: &[u8; 32]) -> [u8; 32] {
    let mut h = Sha256::new();
    h.update([0x01]);
    h.update(left);
    h.update(right);
    h.finalize().into()
}

/// Root of the empty tree.
pub fn empty_root() -> ContentDigest {
    sha256_raw(b"")
}

/// Merkle root of `leaves`, which are sorted internally.
pub fn merkle_root(leaves: &[ContentDigest]) -> ContentDigest {
    if leaves.is_empty() {
        return empty_root();
    }
    let mut sorted: Vec<&ContentDigest> = leaves.iter().collect();
    sorted.sort_by_key(|d| d.to_string());

    let mut level: Vec<[u8; 32]> = sorted.into_iter().map(leaf_hash).collect();
    while level.len() > 1 {
        if level.len() % 2 == 1 {
            if let Some(last) = level.last().copied() {
                level.push(last);
            }
        }
        level = level
            .chunks_exact(2)
            .map(|pair| node_hash(&pair[0], &pair[1]))
            .collect();
    }
    let root = level.first().copied().unwrap_or_default();
    ContentDigest::new(DigestAlgorithm::Sha256, root)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> ContentDigest {
        sha256_raw(s.as_bytes())
    }

    #[test]
    fn empty_is_sha256_of_empty_string() {
        assert_eq!(
            merkle_root(&[]).to_string(),
            "sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn single_leaf_is_leaf_hash() {
        let leaf = d("a");
        let root = merkle_root(std::slice::from_ref(&leaf));
        assert_eq!(root.as_bytes(), &leaf_hash(&leaf));
    }

    #[test]
    fn order_of_input_does_not_matter() {
        let a = merkle_root(&[d("a"), d("b"), d("c")]);
        let b = merkle_root(&[d("c"), d("a"), d("b")]);
        assert_eq!(a, b);
    }

    #[test]
    fn odd_level_duplicates_last() {
        let mut leaves = vec![d("a"), d("b"), d("c")];
        leaves.sort_by_key(|x| x.to_string());
        let l: Vec<[u8; 32]> = leaves.iter().map(leaf_hash).collect();
        let expected = node_hash(&node_hash(&l[0], &l[1]), &node_hash(&l[2], &l[2]));
        assert_eq!(merkle_root(&leaves).as_bytes(), &expected);
    }

    #[test]
    fn leaf_and_node_domains_differ() {
        // A two-leaf root must not equal the leaf hash of anything built
        // from the same bytes.
        let leaves = [d("x"), d("y")];
        let root = merkle_root(&leaves);
        assert_ne!(root.as_bytes(), &leaf_hash(&leaves[0]));
        assert_ne!(root, empty_root());
    }
}
