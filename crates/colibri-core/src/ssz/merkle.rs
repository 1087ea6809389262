use alloy_primitives::B256;
use once_cell::sync::Lazy;

use crate::primitives::hash::sha256_pair;

use super::types::SszType;
use super::view::{bitlist_len, container_spans, element_spans};
use super::SszError;

/// Maximum tree height the engine will address. Covers the largest consensus
/// lists (2^40 chunks) with room to spare.
pub const MAX_TREE_DEPTH: usize = 56;

static ZERO_HASHES: Lazy<[[u8; 32]; MAX_TREE_DEPTH + 1]> = Lazy::new(|| {
    let mut table = [[0u8; 32]; MAX_TREE_DEPTH + 1];
    for depth in 1..=MAX_TREE_DEPTH {
        table[depth] = sha256_pair(&table[depth - 1], &table[depth - 1]);
    }
    table
});

/// Root of an all-zero subtree of the given height.
pub fn zero_hash(depth: usize) -> [u8; 32] {
    ZERO_HASHES[depth]
}

/// Merkleize chunks into a tree padded (with zero subtrees) to
/// `limit.next_power_of_two()` leaves. Virtual padding keeps this O(n) in
/// the number of real chunks even for billion-leaf list limits.
pub fn merkleize_chunks(chunks: &[[u8; 32]], limit: usize) -> [u8; 32] {
    let padded = limit.max(chunks.len()).max(1).next_power_of_two();
    subtree_over(&|i| chunks.get(i).copied(), 0, padded)
}

/// Root of the subtree spanning `size` leaves starting at `start`, where
/// `get(i)` yields the i-th real chunk (absent chunks are zero).
pub(crate) fn subtree_over(
    get: &dyn Fn(usize) -> Option<[u8; 32]>,
    start: usize,
    size: usize,
) -> [u8; 32] {
    if get(start).is_none() {
        // Entirely inside the zero padding.
        return zero_hash(size.trailing_zeros() as usize);
    }
    if size == 1 {
        return get(start).unwrap_or([0u8; 32]);
    }
    let half = size / 2;
    let left = subtree_over(get, start, half);
    let right = subtree_over(get, start + half, half);
    sha256_pair(&left, &right)
}

/// Mix a length (or bit count) into a tree root — the list mixin.
pub fn mix_in_length(root: &[u8; 32], length: u64) -> [u8; 32] {
    let mut len_chunk = [0u8; 32];
    len_chunk[..8].copy_from_slice(&length.to_le_bytes());
    sha256_pair(root, &len_chunk)
}

/// Mix a union selector into the variant's root.
pub fn mix_in_selector(root: &[u8; 32], selector: u8) -> [u8; 32] {
    let mut sel_chunk = [0u8; 32];
    sel_chunk[0] = selector;
    sha256_pair(root, &sel_chunk)
}

/// Split raw bytes into right-padded 32-byte chunks.
pub(crate) fn byte_chunks(bytes: &[u8]) -> Vec<[u8; 32]> {
    bytes
        .chunks(32)
        .map(|c| {
            let mut chunk = [0u8; 32];
            chunk[..c.len()].copy_from_slice(c);
            chunk
        })
        .collect()
}

/// Standard SSZ hash-tree-root over a validated byte image.
pub fn hash_tree_root(ty: &'static SszType, bytes: &[u8]) -> Result<B256, SszError> {
    Ok(B256::from(root_of(ty, bytes)?))
}

pub(crate) fn root_of(ty: &'static SszType, bytes: &[u8]) -> Result<[u8; 32], SszError> {
    match ty {
        SszType::Uint(_) | SszType::Bool | SszType::Bytes(_) => {
            Ok(merkleize_chunks(&byte_chunks(bytes), ty.chunk_limit()))
        }
        SszType::Bitvector(_) => Ok(merkleize_chunks(&byte_chunks(bytes), ty.chunk_limit())),
        SszType::Bitlist(_) => {
            let bits = bitlist_len(bytes)?;
            let data = strip_delimiter(bytes, bits);
            let root = merkleize_chunks(&byte_chunks(&data), ty.chunk_limit());
            Ok(mix_in_length(&root, bits as u64))
        }
        SszType::Vector(elem, _) => {
            // Basic elements pack: the serialized image is the chunk image.
            if elem.basic_size().is_some() {
                Ok(merkleize_chunks(&byte_chunks(bytes), ty.chunk_limit()))
            } else {
                let (elem, spans) = element_spans(ty, bytes)?;
                let roots = span_roots(elem, bytes, &spans)?;
                Ok(merkleize_chunks(&roots, ty.chunk_limit()))
            }
        }
        SszType::List(elem, _) => {
            if let Some(size) = elem.basic_size() {
                let root = merkleize_chunks(&byte_chunks(bytes), ty.chunk_limit());
                Ok(mix_in_length(&root, (bytes.len() / size) as u64))
            } else {
                let (elem, spans) = element_spans(ty, bytes)?;
                let roots = span_roots(elem, bytes, &spans)?;
                let root = merkleize_chunks(&roots, ty.chunk_limit());
                Ok(mix_in_length(&root, spans.len() as u64))
            }
        }
        SszType::Container(fields) => {
            let spans = container_spans(fields, bytes)?;
            let mut roots = Vec::with_capacity(fields.len());
            for (f, (start, end)) in fields.iter().zip(spans) {
                roots.push(root_of(f.ty, &bytes[start..end])?);
            }
            Ok(merkleize_chunks(&roots, fields.len()))
        }
        SszType::Union(variants) => {
            if bytes.is_empty() {
                return Err(SszError::Truncated { need: 1, have: 0 });
            }
            let selector = bytes[0];
            let variant = variants
                .get(selector as usize)
                .ok_or(SszError::BadSelector { selector })?;
            let inner = match variant.ty {
                None => [0u8; 32],
                Some(inner_ty) => root_of(inner_ty, &bytes[1..])?,
            };
            Ok(mix_in_selector(&inner, selector))
        }
    }
}

fn span_roots(
    elem: &'static SszType,
    bytes: &[u8],
    spans: &[(usize, usize)],
) -> Result<Vec<[u8; 32]>, SszError> {
    spans
        .iter()
        .map(|&(start, end)| root_of(elem, &bytes[start..end]))
        .collect()
}

fn strip_delimiter(bytes: &[u8], bits: usize) -> Vec<u8> {
    let mut data = bytes.to_vec();
    // Drop the delimiter byte entirely when the payload ends on a byte
    // boundary, otherwise clear the delimiter bit in place.
    if bits % 8 == 0 {
        data.truncate(bits / 8);
    } else {
        data.truncate(bits / 8 + 1);
        let last = data.len() - 1;
        data[last] &= (1u8 << (bits % 8)) - 1;
    }
    data
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::hash::sha256_pair;
    use crate::ssz::encode::encode_uint;
    use crate::ssz::types::Field;

    static U64: SszType = SszType::Uint(8);
    static PAIR: SszType = SszType::Container(&[
        Field { name: "a", ty: &U64 },
        Field { name: "b", ty: &U64 },
    ]);

    #[test]
    fn uint_root_is_padded_leaf() {
        let root = hash_tree_root(&U64, &42u64.to_le_bytes()).unwrap();
        let mut expected = [0u8; 32];
        expected[0] = 42;
        assert_eq!(root.0, expected);
    }

    #[test]
    fn two_field_container_is_one_pair_hash() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&1u64.to_le_bytes());
        bytes.extend_from_slice(&2u64.to_le_bytes());
        let root = hash_tree_root(&PAIR, &bytes).unwrap();

        let a = byte_chunks(&1u64.to_le_bytes())[0];
        let b = byte_chunks(&2u64.to_le_bytes())[0];
        assert_eq!(root.0, sha256_pair(&a, &b));
    }

    #[test]
    fn empty_list_root_is_zero_tree_with_length() {
        static L: SszType = SszType::List(&U64, 16);
        // 16 u64 elements fit in 4 chunks.
        let expected = mix_in_length(&zero_hash(2), 0);
        assert_eq!(hash_tree_root(&L, &[]).unwrap().0, expected);
    }

    #[test]
    fn list_length_changes_root() {
        static L: SszType = SszType::List(&U64, 16);
        let one = encode_uint(7, 8);
        let r1 = hash_tree_root(&L, &one).unwrap();
        let mut two = one.clone();
        two.extend_from_slice(&encode_uint(0, 8));
        let r2 = hash_tree_root(&L, &two).unwrap();
        // Same leading chunk content, different length mixin.
        assert_ne!(r1, r2);
    }

    #[test]
    fn huge_limit_merkleizes_sparsely() {
        static TX_BYTES: SszType = SszType::List(&U8, 1073741824);
        static U8: SszType = SszType::Uint(1);
        // Must terminate fast despite a 2^25-chunk limit.
        let root = hash_tree_root(&TX_BYTES, &[0xFF; 100]).unwrap();
        assert_ne!(root, B256::ZERO);
    }

    #[test]
    fn union_none_root_mixes_selector_zero() {
        use crate::ssz::types::UnionVariant;
        static VARIANTS: &[UnionVariant] = &[UnionVariant { name: "none", ty: None }];
        static UN: SszType = SszType::Union(VARIANTS);
        let root = hash_tree_root(&UN, &[0]).unwrap();
        assert_eq!(root.0, mix_in_selector(&[0u8; 32], 0));
    }

    #[test]
    fn bitvector_root() {
        static BV: SszType = SszType::Bitvector(512);
        let bytes = [0xFFu8; 64];
        let chunks = byte_chunks(&bytes);
        assert_eq!(
            hash_tree_root(&BV, &bytes).unwrap().0,
            sha256_pair(&chunks[0], &chunks[1])
        );
    }
}
