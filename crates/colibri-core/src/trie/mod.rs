//! Hex-nibble Merkle-Patricia trie.
//!
//! The prover builds receipt and transaction tries from fetched block data
//! and extracts ordered node proofs; the verifier walks those same node
//! lists against a root taken from a verified execution payload. Node
//! references follow the standard rule: RLP shorter than 32 bytes is
//! embedded in the parent, anything else is referenced by its Keccak-256.

use thiserror::Error;

use crate::primitives::hash::keccak256;
use crate::primitives::rlp;

/// The root of an empty trie: keccak256(rlp("")).
pub const EMPTY_ROOT: [u8; 32] = [
    0x56, 0xe8, 0x1f, 0x17, 0x1b, 0xcc, 0x55, 0xa6, 0xff, 0x83, 0x45, 0xe6, 0x92, 0xc0, 0xf8,
    0x6e, 0x5b, 0x48, 0xe0, 0x1b, 0x99, 0x6c, 0xad, 0xc0, 0x01, 0x62, 0x2f, 0xb5, 0xe3, 0x63,
    0xb4, 0x21,
];

#[derive(Debug, Error)]
pub enum TrieError {
    #[error("empty proof: no trie nodes provided")]
    EmptyProof,

    #[error("invalid RLP in proof node {depth}: {reason}")]
    InvalidRlp { depth: usize, reason: String },

    #[error("node hash mismatch at depth {depth}: computed {computed}, referenced {expected}")]
    HashMismatch {
        depth: usize,
        computed: String,
        expected: String,
    },

    #[error("invalid trie node at depth {depth}: {got}-element list")]
    InvalidNode { depth: usize, got: usize },

    #[error("proof ended at depth {depth} without reaching the key")]
    Incomplete { depth: usize },
}

impl From<TrieError> for crate::error::Error {
    fn from(e: TrieError) -> Self {
        crate::error::Error::ProofInvalid(e.to_string())
    }
}

enum Node {
    Leaf {
        path: Vec<u8>,
        value: Vec<u8>,
    },
    Extension {
        path: Vec<u8>,
        child: Box<Node>,
    },
    Branch {
        children: Box<[Option<Node>; 16]>,
        value: Option<Vec<u8>>,
    },
}

/// An in-memory trie under construction. Receipt/transaction tries key by
/// the RLP-encoded item index.
pub struct PatriciaTrie {
    root: Option<Node>,
}

impl Default for PatriciaTrie {
    fn default() -> Self {
        Self::new()
    }
}

impl PatriciaTrie {
    pub fn new() -> Self {
        PatriciaTrie { root: None }
    }

    /// Insert or update a key.
    pub fn set(&mut self, key: &[u8], value: Vec<u8>) {
        let nibbles = to_nibbles(key);
        let current = self.root.take();
        self.root = Some(insert(current, &nibbles, value));
    }

    pub fn root_hash(&self) -> [u8; 32] {
        match &self.root {
            None => EMPTY_ROOT,
            Some(node) => keccak256(&encode_node(node)),
        }
    }

    /// Ordered node RLPs from the root towards the key. Nodes embedded in
    /// their parent (RLP < 32 bytes) are not emitted separately — the
    /// verifier reads them out of the parent's child slot.
    pub fn prove(&self, key: &[u8]) -> Vec<Vec<u8>> {
        let mut proof = Vec::new();
        let Some(mut node) = self.root.as_ref() else {
            return proof;
        };
        let nibbles = to_nibbles(key);
        let mut consumed = 0usize;
        loop {
            let encoded = encode_node(node);
            if proof.is_empty() || encoded.len() >= 32 {
                proof.push(encoded);
            }
            match node {
                Node::Leaf { .. } => return proof,
                Node::Extension { path, child } => {
                    if !nibbles[consumed..].starts_with(path) {
                        return proof;
                    }
                    consumed += path.len();
                    node = child;
                }
                Node::Branch { children, .. } => {
                    if consumed >= nibbles.len() {
                        return proof;
                    }
                    match &children[nibbles[consumed] as usize] {
                        Some(child) => {
                            consumed += 1;
                            node = child;
                        }
                        None => return proof,
                    }
                }
            }
        }
    }
}

/// Walk an ordered proof against a trusted root.
///
/// Every hashed node is recomputed and compared against the reference that
/// named it. Returns the leaf value, or `None` for a provable absence (the
/// path diverges or ends in an empty slot).
pub fn verify_proof(
    root: &[u8; 32],
    key: &[u8],
    proof: &[Vec<u8>],
) -> Result<Option<Vec<u8>>, TrieError> {
    if proof.is_empty() {
        return if *root == EMPTY_ROOT {
            Ok(None)
        } else {
            Err(TrieError::EmptyProof)
        };
    }

    let nibbles = to_nibbles(key);
    let mut consumed = 0usize;
    let mut reference: Vec<u8> = root.to_vec();
    let mut cursor = 0usize;
    let mut depth = 0usize;

    loop {
        let node_bytes: Vec<u8> = if reference.len() == 32 {
            let node = proof
                .get(cursor)
                .ok_or(TrieError::Incomplete { depth })?;
            cursor += 1;
            let computed = keccak256(node);
            if computed[..] != reference[..] {
                return Err(TrieError::HashMismatch {
                    depth,
                    computed: hex::encode(computed),
                    expected: hex::encode(&reference),
                });
            }
            node.clone()
        } else {
            // Embedded node: the reference *is* the RLP.
            reference.clone()
        };

        let items = rlp::decode_list(&node_bytes)
            .map_err(|reason| TrieError::InvalidRlp { depth, reason })?;

        match items.len() {
            17 => {
                if consumed == nibbles.len() {
                    let value = &items[16];
                    return Ok(non_empty(value));
                }
                let child = &items[nibbles[consumed] as usize];
                consumed += 1;
                if child.is_empty() {
                    return Ok(None);
                }
                reference = child.clone();
            }
            2 => {
                let (prefix, is_leaf) = decode_hex_prefix(&items[0])
                    .map_err(|reason| TrieError::InvalidRlp { depth, reason })?;
                let remaining = &nibbles[consumed..];
                if is_leaf {
                    return Ok(if remaining == prefix.as_slice() {
                        non_empty(&items[1])
                    } else {
                        None
                    });
                }
                if !remaining.starts_with(&prefix) {
                    return Ok(None);
                }
                consumed += prefix.len();
                reference = items[1].clone();
            }
            got => return Err(TrieError::InvalidNode { depth, got }),
        }
        depth += 1;
    }
}

fn non_empty(value: &[u8]) -> Option<Vec<u8>> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_vec())
    }
}

fn insert(node: Option<Node>, path: &[u8], value: Vec<u8>) -> Node {
    match node {
        None => Node::Leaf {
            path: path.to_vec(),
            value,
        },
        Some(Node::Leaf {
            path: leaf_path,
            value: leaf_value,
        }) => {
            let common = common_prefix(&leaf_path, path);
            if common == leaf_path.len() && common == path.len() {
                return Node::Leaf {
                    path: leaf_path,
                    value,
                };
            }
            let mut branch = empty_branch();
            attach(&mut branch, &leaf_path[common..], leaf_value);
            attach(&mut branch, &path[common..], value);
            wrap_extension(&path[..common], branch)
        }
        Some(Node::Extension {
            path: ext_path,
            child,
        }) => {
            let common = common_prefix(&ext_path, path);
            if common == ext_path.len() {
                return Node::Extension {
                    path: ext_path,
                    child: Box::new(insert(Some(*child), &path[common..], value)),
                };
            }
            let mut branch = empty_branch();
            // Re-hang the shortened extension (or its child directly when
            // no nibbles remain past the branch slot).
            let slot = ext_path[common] as usize;
            let rest = &ext_path[common + 1..];
            let reattached = if rest.is_empty() {
                *child
            } else {
                Node::Extension {
                    path: rest.to_vec(),
                    child,
                }
            };
            if let Node::Branch { children, .. } = &mut branch {
                children[slot] = Some(reattached);
            }
            attach(&mut branch, &path[common..], value);
            wrap_extension(&path[..common], branch)
        }
        Some(Node::Branch {
            mut children,
            value: branch_value,
        }) => {
            if path.is_empty() {
                return Node::Branch {
                    children,
                    value: Some(value),
                };
            }
            let slot = path[0] as usize;
            let child = children[slot].take();
            children[slot] = Some(insert(child, &path[1..], value));
            Node::Branch {
                children,
                value: branch_value,
            }
        }
    }
}

fn empty_branch() -> Node {
    Node::Branch {
        children: Box::new(std::array::from_fn(|_| None)),
        value: None,
    }
}

/// Hang a (possibly empty) remainder path with its value off a branch.
fn attach(branch: &mut Node, path: &[u8], value: Vec<u8>) {
    let Node::Branch { children, value: branch_value } = branch else {
        unreachable!("attach target is always a branch");
    };
    if path.is_empty() {
        *branch_value = Some(value);
    } else {
        children[path[0] as usize] = Some(Node::Leaf {
            path: path[1..].to_vec(),
            value,
        });
    }
}

fn wrap_extension(prefix: &[u8], node: Node) -> Node {
    if prefix.is_empty() {
        node
    } else {
        Node::Extension {
            path: prefix.to_vec(),
            child: Box::new(node),
        }
    }
}

fn encode_node(node: &Node) -> Vec<u8> {
    match node {
        Node::Leaf { path, value } => rlp::encode_list(&[
            rlp::encode_bytes(&hex_prefix(path, true)),
            rlp::encode_bytes(value),
        ]),
        Node::Extension { path, child } => rlp::encode_list(&[
            rlp::encode_bytes(&hex_prefix(path, false)),
            node_reference(child),
        ]),
        Node::Branch { children, value } => {
            let mut items = Vec::with_capacity(17);
            for child in children.iter() {
                items.push(match child {
                    Some(c) => node_reference(c),
                    None => rlp::encode_bytes(&[]),
                });
            }
            items.push(match value {
                Some(v) => rlp::encode_bytes(v),
                None => rlp::encode_bytes(&[]),
            });
            rlp::encode_list(&items)
        }
    }
}

fn node_reference(node: &Node) -> Vec<u8> {
    let encoded = encode_node(node);
    if encoded.len() >= 32 {
        rlp::encode_bytes(&keccak256(&encoded))
    } else {
        encoded
    }
}

fn common_prefix(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b).take_while(|(x, y)| x == y).count()
}

fn to_nibbles(bytes: &[u8]) -> Vec<u8> {
    let mut nibbles = Vec::with_capacity(bytes.len() * 2);
    for byte in bytes {
        nibbles.push(byte >> 4);
        nibbles.push(byte & 0x0F);
    }
    nibbles
}

/// Decode the hex-prefix encoding of a node path: returns the nibbles and
/// whether the node is a leaf.
fn decode_hex_prefix(encoded: &[u8]) -> Result<(Vec<u8>, bool), String> {
    let Some(&first) = encoded.first() else {
        return Err("empty path encoding".to_string());
    };
    let flag = first >> 4;
    if flag > 3 {
        return Err(format!("invalid hex-prefix flag {flag}"));
    }
    let is_leaf = flag >= 2;
    let is_odd = flag % 2 == 1;

    let mut nibbles = Vec::new();
    if is_odd {
        nibbles.push(first & 0x0F);
    }
    for &byte in &encoded[1..] {
        nibbles.push(byte >> 4);
        nibbles.push(byte & 0x0F);
    }
    Ok((nibbles, is_leaf))
}

/// Hex-prefix encode a nibble path.
fn hex_prefix(nibbles: &[u8], is_leaf: bool) -> Vec<u8> {
    let flag: u8 = if is_leaf { 2 } else { 0 };
    let mut out = Vec::with_capacity(nibbles.len() / 2 + 1);
    if nibbles.len() % 2 == 1 {
        out.push(((flag | 1) << 4) | nibbles[0]);
        for pair in nibbles[1..].chunks(2) {
            out.push((pair[0] << 4) | pair[1]);
        }
    } else {
        out.push(flag << 4);
        for pair in nibbles.chunks(2) {
            out.push((pair[0] << 4) | pair[1]);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_trie_has_known_root() {
        assert_eq!(PatriciaTrie::new().root_hash(), EMPTY_ROOT);
    }

    #[test]
    fn hex_prefix_round_trip() {
        for (nibbles, is_leaf) in [
            (vec![0xA, 0xB, 0xC, 0xD], false),
            (vec![0xA, 0xB, 0xC], false),
            (vec![0xA, 0xB], true),
            (vec![0xA], true),
            (vec![], true),
        ] {
            let encoded = hex_prefix(&nibbles, is_leaf);
            let (decoded, leaf) = decode_hex_prefix(&encoded).unwrap();
            assert_eq!(decoded, nibbles);
            assert_eq!(leaf, is_leaf);
        }
    }

    #[test]
    fn single_entry_proof() {
        let mut trie = PatriciaTrie::new();
        let key = rlp::encode_uint(0);
        trie.set(&key, b"first receipt".to_vec());
        let root = trie.root_hash();

        let proof = trie.prove(&key);
        let value = verify_proof(&root, &key, &proof).unwrap();
        assert_eq!(value, Some(b"first receipt".to_vec()));
    }

    #[test]
    fn index_keyed_trie_like_receipts() {
        let mut trie = PatriciaTrie::new();
        let mut values = Vec::new();
        for i in 0..20u64 {
            // Pad values past the embedding threshold so every node hashes.
            let value = format!("receipt-{i}-{}", "x".repeat(40)).into_bytes();
            trie.set(&rlp::encode_uint(i), value.clone());
            values.push(value);
        }
        let root = trie.root_hash();

        for i in 0..20u64 {
            let key = rlp::encode_uint(i);
            let proof = trie.prove(&key);
            let got = verify_proof(&root, &key, &proof).unwrap();
            assert_eq!(got, Some(values[i as usize].clone()), "index {i}");
        }

        // A key that was never inserted proves absent.
        let missing = rlp::encode_uint(99);
        let proof = trie.prove(&missing);
        assert_eq!(verify_proof(&root, &missing, &proof).unwrap(), None);
    }

    #[test]
    fn update_replaces_value() {
        let mut trie = PatriciaTrie::new();
        let key = rlp::encode_uint(3);
        trie.set(&key, vec![1; 40]);
        let first = trie.root_hash();
        trie.set(&key, vec![2; 40]);
        assert_ne!(trie.root_hash(), first);

        let proof = trie.prove(&key);
        let got = verify_proof(&trie.root_hash(), &key, &proof).unwrap();
        assert_eq!(got, Some(vec![2; 40]));
    }

    #[test]
    fn tampered_node_is_rejected() {
        let mut trie = PatriciaTrie::new();
        for i in 0..4u64 {
            trie.set(&rlp::encode_uint(i), vec![i as u8; 40]);
        }
        let root = trie.root_hash();
        let key = rlp::encode_uint(2);
        let mut proof = trie.prove(&key);
        let last = proof.len() - 1;
        let tail = proof[last].len() - 1;
        proof[last][tail] ^= 0x01;
        assert!(verify_proof(&root, &key, &proof).is_err());
    }

    #[test]
    fn embedded_small_nodes_verify_inline() {
        // Tiny values keep leaf nodes under 32 bytes, exercising the
        // embedded-child path of the walk.
        let mut trie = PatriciaTrie::new();
        for i in 0..8u64 {
            trie.set(&rlp::encode_uint(i), vec![i as u8 + 1]);
        }
        let root = trie.root_hash();
        let key = rlp::encode_uint(5);
        let proof = trie.prove(&key);
        assert_eq!(
            verify_proof(&root, &key, &proof).unwrap(),
            Some(vec![6])
        );
    }

    #[test]
    fn empty_proof_only_matches_empty_root() {
        assert_eq!(verify_proof(&EMPTY_ROOT, &[0x80], &[]).unwrap(), None);
        assert!(verify_proof(&[0u8; 32], &[0x80], &[]).is_err());
    }
}
