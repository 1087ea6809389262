use std::collections::{BTreeMap, BTreeSet};

use alloy_primitives::B256;

use crate::primitives::hash::sha256_pair;

use super::gindex::gindex_depth;
use super::merkle::{byte_chunks, merkleize_chunks, root_of, subtree_over};
use super::types::SszType;
use super::view::{bitlist_len, container_spans, element_spans, SszView};
use super::SszError;

/// A multiproof: the proven leaves (gindex-ascending) and the witness hashes
/// needed to rebuild the root, also in ascending gindex order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultiProof {
    pub leaves: Vec<(u64, B256)>,
    pub witnesses: Vec<B256>,
}

/// Hash of the subtree at `gindex` within the value's own Merkle tree
/// (gindex 1 is the value's root). Addresses internal nodes, chunk-level
/// leaves, zero padding, and nodes inside child values.
pub fn subtree_hash(view: &SszView<'_>, gindex: u64) -> Result<[u8; 32], SszError> {
    node_hash(view.ty(), view.as_bytes(), gindex)
}

/// Sibling branch for a single leaf, ordered leaf to root.
pub fn create_proof(view: &SszView<'_>, gindex: u64) -> Result<Vec<[u8; 32]>, SszError> {
    if gindex == 0 {
        return Err(SszError::BadGindex(0));
    }
    let mut branch = Vec::with_capacity(gindex_depth(gindex) as usize);
    let mut g = gindex;
    while g > 1 {
        branch.push(node_hash(view.ty(), view.as_bytes(), g ^ 1)?);
        g >>= 1;
    }
    Ok(branch)
}

/// Re-hash a leaf up its branch and compare against the expected root.
/// The parity bits of the gindex pick the hashing order at each level.
pub fn verify_single_proof(
    leaf: &[u8; 32],
    gindex: u64,
    branch: &[[u8; 32]],
    root: &[u8; 32],
) -> bool {
    if gindex == 0 {
        return false;
    }
    let mut node = *leaf;
    let mut g = gindex;
    for sibling in branch {
        if g <= 1 {
            return false;
        }
        node = if g & 1 == 1 {
            sha256_pair(sibling, &node)
        } else {
            sha256_pair(&node, sibling)
        };
        g >>= 1;
    }
    g == 1 && node == *root
}

/// Witness gindexes for a multiproof: every sibling along the leaves' paths
/// that cannot be derived from the leaves themselves, ascending.
pub fn multi_proof_witness_indices(indices: &[u64]) -> Result<Vec<u64>, SszError> {
    let mut path: BTreeSet<u64> = BTreeSet::new();
    let mut siblings: BTreeSet<u64> = BTreeSet::new();
    for &index in indices {
        if index == 0 {
            return Err(SszError::BadGindex(0));
        }
        let mut g = index;
        while g > 1 {
            path.insert(g);
            siblings.insert(g ^ 1);
            g >>= 1;
        }
    }
    path.insert(1);
    Ok(siblings.difference(&path).copied().collect())
}

/// Build a multiproof for the given gindexes over one value.
pub fn create_multi_proof(view: &SszView<'_>, indices: &[u64]) -> Result<MultiProof, SszError> {
    let mut sorted: Vec<u64> = indices.to_vec();
    sorted.sort_unstable();
    sorted.dedup();

    let mut leaves = Vec::with_capacity(sorted.len());
    for &g in &sorted {
        leaves.push((g, B256::from(node_hash(view.ty(), view.as_bytes(), g)?)));
    }
    let mut witnesses = Vec::new();
    for g in multi_proof_witness_indices(&sorted)? {
        witnesses.push(B256::from(node_hash(view.ty(), view.as_bytes(), g)?));
    }
    Ok(MultiProof { leaves, witnesses })
}

/// Rebuild ancestors bottom-up from leaves plus witnesses and check the root.
/// The witness count and order are derived from the leaf gindexes, so a
/// shuffled or truncated witness list fails.
pub fn verify_multi_proof(leaves: &[(u64, B256)], witnesses: &[B256], root: &B256) -> bool {
    let indices: Vec<u64> = leaves.iter().map(|(g, _)| *g).collect();
    let Ok(witness_indices) = multi_proof_witness_indices(&indices) else {
        return false;
    };
    if witness_indices.len() != witnesses.len() {
        return false;
    }

    let mut db: BTreeMap<u64, [u8; 32]> = BTreeMap::new();
    for (g, hash) in leaves {
        if let Some(existing) = db.insert(*g, hash.0) {
            if existing != hash.0 {
                return false;
            }
        }
    }
    for (g, hash) in witness_indices.iter().zip(witnesses) {
        if let Some(existing) = db.insert(*g, hash.0) {
            if existing != hash.0 {
                return false;
            }
        }
    }

    // Largest gindex first: both children of any computable parent are
    // present before the parent is needed.
    while let Some((&g, _)) = db.iter().next_back() {
        if g == 1 {
            break;
        }
        let left = g & !1;
        let right = g | 1;
        let (Some(l), Some(r)) = (db.get(&left), db.get(&right)) else {
            return false;
        };
        let parent_hash = sha256_pair(l, r);
        db.remove(&left);
        db.remove(&right);
        match db.insert(g >> 1, parent_hash) {
            Some(existing) if existing != parent_hash => return false,
            _ => {}
        }
    }
    db.get(&1) == Some(&root.0)
}

/// Where a gindex lands inside one type's chunk tree.
enum Resolved {
    /// An internal node or chunk hash, fully computed here.
    Node([u8; 32]),
    /// The gindex descends into child `index` with a remainder gindex.
    Into(usize, u64),
}

fn node_hash(ty: &'static SszType, bytes: &[u8], g: u64) -> Result<[u8; 32], SszError> {
    if g == 0 {
        return Err(SszError::BadGindex(0));
    }
    if g == 1 {
        return root_of(ty, bytes);
    }

    match ty {
        SszType::Uint(_) | SszType::Bool | SszType::Bytes(_) | SszType::Bitvector(_) => {
            let chunks = byte_chunks(bytes);
            match resolve_chunk_tree(&chunks, ty.chunk_limit(), g)? {
                Resolved::Node(h) => Ok(h),
                Resolved::Into(..) => Err(SszError::BadGindex(g)),
            }
        }
        SszType::Container(fields) => {
            let spans = container_spans(fields, bytes)?;
            let mut roots = Vec::with_capacity(fields.len());
            for (f, (start, end)) in fields.iter().zip(&spans) {
                roots.push(root_of(f.ty, &bytes[*start..*end])?);
            }
            match resolve_chunk_tree(&roots, fields.len(), g)? {
                Resolved::Node(h) => Ok(h),
                Resolved::Into(index, rest) => {
                    if index >= fields.len() {
                        return Err(SszError::BadGindex(g));
                    }
                    let (start, end) = spans[index];
                    node_hash(fields[index].ty, &bytes[start..end], rest)
                }
            }
        }
        SszType::Vector(elem, _) => {
            if elem.basic_size().is_some() {
                let chunks = byte_chunks(bytes);
                match resolve_chunk_tree(&chunks, ty.chunk_limit(), g)? {
                    Resolved::Node(h) => Ok(h),
                    Resolved::Into(..) => Err(SszError::BadGindex(g)),
                }
            } else {
                let (elem, spans) = element_spans(ty, bytes)?;
                let roots = spans
                    .iter()
                    .map(|&(s, e)| root_of(elem, &bytes[s..e]))
                    .collect::<Result<Vec<_>, _>>()?;
                match resolve_chunk_tree(&roots, ty.chunk_limit(), g)? {
                    Resolved::Node(h) => Ok(h),
                    Resolved::Into(index, rest) => {
                        if index >= spans.len() {
                            return Err(SszError::BadGindex(g));
                        }
                        let (start, end) = spans[index];
                        node_hash(elem, &bytes[start..end], rest)
                    }
                }
            }
        }
        SszType::List(elem, _) => {
            let (data_g, is_length_side) = split_mixin(g)?;
            if is_length_side {
                let len = match elem.basic_size() {
                    Some(size) => (bytes.len() / size) as u64,
                    None => element_spans(ty, bytes)?.1.len() as u64,
                };
                let mut chunk = [0u8; 32];
                chunk[..8].copy_from_slice(&len.to_le_bytes());
                return Ok(chunk);
            }
            if elem.basic_size().is_some() {
                let chunks = byte_chunks(bytes);
                if data_g == 1 {
                    return Ok(merkleize_chunks(&chunks, ty.chunk_limit()));
                }
                match resolve_chunk_tree(&chunks, ty.chunk_limit(), data_g)? {
                    Resolved::Node(h) => Ok(h),
                    Resolved::Into(..) => Err(SszError::BadGindex(g)),
                }
            } else {
                let (elem, spans) = element_spans(ty, bytes)?;
                let roots = spans
                    .iter()
                    .map(|&(s, e)| root_of(elem, &bytes[s..e]))
                    .collect::<Result<Vec<_>, _>>()?;
                if data_g == 1 {
                    return Ok(merkleize_chunks(&roots, ty.chunk_limit()));
                }
                match resolve_chunk_tree(&roots, ty.chunk_limit(), data_g)? {
                    Resolved::Node(h) => Ok(h),
                    Resolved::Into(index, rest) => {
                        if index >= spans.len() {
                            return Err(SszError::BadGindex(g));
                        }
                        let (start, end) = spans[index];
                        node_hash(elem, &bytes[start..end], rest)
                    }
                }
            }
        }
        SszType::Bitlist(_) => {
            let bits = bitlist_len(bytes)?;
            let (data_g, is_length_side) = split_mixin(g)?;
            if is_length_side {
                let mut chunk = [0u8; 32];
                chunk[..8].copy_from_slice(&(bits as u64).to_le_bytes());
                return Ok(chunk);
            }
            let mut data = bytes.to_vec();
            if bits % 8 == 0 {
                data.truncate(bits / 8);
            } else {
                data.truncate(bits / 8 + 1);
                let last = data.len() - 1;
                data[last] &= (1u8 << (bits % 8)) - 1;
            }
            let chunks = byte_chunks(&data);
            if data_g == 1 {
                return Ok(merkleize_chunks(&chunks, ty.chunk_limit()));
            }
            match resolve_chunk_tree(&chunks, ty.chunk_limit(), data_g)? {
                Resolved::Node(h) => Ok(h),
                Resolved::Into(..) => Err(SszError::BadGindex(g)),
            }
        }
        SszType::Union(variants) => {
            if bytes.is_empty() {
                return Err(SszError::Truncated { need: 1, have: 0 });
            }
            let selector = bytes[0];
            let variant = variants
                .get(selector as usize)
                .ok_or(SszError::BadSelector { selector })?;
            let (inner_g, is_selector_side) = split_mixin(g)?;
            if is_selector_side {
                let mut chunk = [0u8; 32];
                chunk[0] = selector;
                return Ok(chunk);
            }
            match variant.ty {
                None => {
                    if inner_g == 1 {
                        Ok([0u8; 32])
                    } else {
                        Err(SszError::BadGindex(g))
                    }
                }
                Some(inner_ty) => node_hash(inner_ty, &bytes[1..], inner_g),
            }
        }
    }
}

/// Peel one level off a mixin node (lists, bitlists, unions): returns the
/// gindex relative to the left (data) child and whether the path went right
/// into the mixin chunk instead.
fn split_mixin(g: u64) -> Result<(u64, bool), SszError> {
    let depth = gindex_depth(g);
    if depth == 0 {
        return Err(SszError::BadGindex(g));
    }
    let took_right = (g >> (depth - 1)) & 1 == 1;
    let rest = (1u64 << (depth - 1)) | (g & ((1u64 << (depth - 1)) - 1));
    if took_right && rest != 1 {
        // Nothing lives below the mixin chunk.
        return Err(SszError::BadGindex(g));
    }
    Ok((rest, took_right))
}

fn resolve_chunk_tree(
    chunks: &[[u8; 32]],
    limit: usize,
    g: u64,
) -> Result<Resolved, SszError> {
    let padded = limit.max(chunks.len()).max(1).next_power_of_two() as u64;
    let tree_depth = padded.trailing_zeros() as u32;
    let depth = gindex_depth(g);

    if depth < tree_depth {
        // Internal node covering a chunk range.
        let size = (padded >> depth) as usize;
        let start = ((g - (1u64 << depth)) as usize) * size;
        let hash = subtree_over(&|i| chunks.get(i).copied(), start, size);
        Ok(Resolved::Node(hash))
    } else if depth == tree_depth {
        let index = (g - padded) as usize;
        Ok(match chunks.get(index) {
            Some(chunk) => Resolved::Node(*chunk),
            None => Resolved::Node([0u8; 32]),
        })
    } else {
        let shift = depth - tree_depth;
        let index = ((g >> shift) - padded) as usize;
        let rest = (1u64 << shift) | (g & ((1u64 << shift) - 1));
        Ok(Resolved::Into(index, rest))
    }
}
