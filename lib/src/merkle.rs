use serde::{Deserialize, Serialize};

use crate::crypto::sha256d;
use crate::types::Transaction;
use crate::Hash;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "_type")]
pub struct MerkleNode {
    pub val: Hash,
    pub children: Vec<MerkleNode>,
}

/// Merkle root over a list of leaves. An odd level duplicates its last
/// entry; parent values double-hash the concatenated child hex strings.
pub fn get_merkle_root(leaves: &[Hash]) -> Option<MerkleNode> {
    if leaves.is_empty() {
        return None;
    }

    let mut nodes: Vec<MerkleNode> = leaves
        .iter()
        .map(|leaf| MerkleNode {
            val: sha256d(leaf.as_bytes()),
            children: vec![],
        })
        .collect();

    while nodes.len() > 1 {
        if nodes.len() % 2 == 1 {
            if let Some(last) = nodes.last().cloned() {
                nodes.push(last);
            }
        }
        nodes = nodes
            .chunks(2)
            .map(|pair| MerkleNode {
                val: sha256d(format!("{}{}", pair[0].val, pair[1].val).as_bytes()),
                children: pair.to_vec(),
            })
            .collect();
    }

    nodes.pop()
}

/// The block's merkle commitment: the root over its txids, in block order.
pub fn get_merkle_root_of_txns(txns: &[Transaction]) -> Option<MerkleNode> {
    let txids: Vec<Hash> = txns.iter().map(|txn| txn.id()).collect();
    get_merkle_root(&txids)
}
