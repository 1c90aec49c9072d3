use crate::error::{NodeError, Result};
use crate::utils::sha256_digest;

/// Binary Merkle root over a list of leaf byte strings.
///
/// Internal nodes are `sha256(left || right)`; a level with an odd number
/// of nodes duplicates its last node, so a single leaf pairs with itself.
pub fn merkle_root(leaves: &[Vec<u8>]) -> Result<Vec<u8>> {
    if leaves.is_empty() {
        return Err(NodeError::InvalidBlock(
            "Cannot compute Merkle root of an empty list".to_string(),
        ));
    }

    if leaves.len() == 1 {
        return Ok(hash_pair(&leaves[0], &leaves[0]));
    }

    let mut current_level = leaves.to_vec();
    while current_level.len() > 1 {
        let mut next_level = Vec::with_capacity(current_level.len().div_ceil(2));
        let mut i = 0;
        while i < current_level.len() {
            let left = &current_level[i];
            let right = if i + 1 < current_level.len() {
                &current_level[i + 1]
            } else {
                // odd level, duplicate the last node
                &current_level[i]
            };
            next_level.push(hash_pair(left, right));
            i += 2;
        }
        current_level = next_level;
    }

    Ok(current_level.into_iter().next().unwrap())
}

fn hash_pair(left: &[u8], right: &[u8]) -> Vec<u8> {
    let mut combined = Vec::with_capacity(left.len() + right.len());
    combined.extend_from_slice(left);
    combined.extend_from_slice(right);
    sha256_digest(&combined)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_list_rejected() {
        assert!(merkle_root(&[]).is_err());
    }

    #[test]
    fn test_single_leaf_pairs_with_itself() {
        let leaf = vec![1, 2, 3, 4];
        let root = merkle_root(std::slice::from_ref(&leaf)).unwrap();
        assert_eq!(root, hash_pair(&leaf, &leaf));
        assert_eq!(root.len(), 32);
    }

    #[test]
    fn test_two_leaves() {
        let a = vec![1u8; 16];
        let b = vec![2u8; 16];
        let root = merkle_root(&[a.clone(), b.clone()]).unwrap();
        assert_eq!(root, hash_pair(&a, &b));
    }

    #[test]
    fn test_odd_level_duplicates_last() {
        let a = vec![1u8];
        let b = vec![2u8];
        let c = vec![3u8];
        let root = merkle_root(&[a.clone(), b.clone(), c.clone()]).unwrap();
        let expected = hash_pair(&hash_pair(&a, &b), &hash_pair(&c, &c));
        assert_eq!(root, expected);
    }

    #[test]
    fn test_root_is_order_sensitive() {
        let a = vec![1u8; 8];
        let b = vec![2u8; 8];
        assert_ne!(
            merkle_root(&[a.clone(), b.clone()]).unwrap(),
            merkle_root(&[b, a]).unwrap()
        );
    }
}
