use alloy_primitives::{B256, U256};

use super::types::{Field, SszType};
use super::SszError;

/// Zero-copy view over an SSZ-encoded value.
///
/// A view never outlives the bytes it points into; long-lived consumers copy
/// on insertion into caches. Construction validates the full structure, so
/// accessors on a validated view only re-check cheap local invariants.
#[derive(Clone, Copy)]
pub struct SszView<'a> {
    ty: &'static SszType,
    bytes: &'a [u8],
}

impl<'a> SszView<'a> {
    /// Decode `bytes` as `ty`, validating offsets, limits, and lengths
    /// recursively. Fails on truncation, out-of-range or overlapping
    /// variable regions, and over-limit lengths.
    pub fn new(ty: &'static SszType, bytes: &'a [u8]) -> Result<Self, SszError> {
        validate(ty, bytes)?;
        Ok(SszView { ty, bytes })
    }

    /// Wrap bytes that are already known valid (e.g. slices of a validated
    /// parent view).
    pub(crate) fn trusted(ty: &'static SszType, bytes: &'a [u8]) -> Self {
        SszView { ty, bytes }
    }

    pub fn ty(&self) -> &'static SszType {
        self.ty
    }

    pub fn as_bytes(&self) -> &'a [u8] {
        self.bytes
    }

    /// Child view for a container field.
    pub fn field(&self, name: &str) -> Result<SszView<'a>, SszError> {
        let SszType::Container(fields) = self.ty else {
            return Err(SszError::TypeMismatch("field access on non-container"));
        };
        let index = fields
            .iter()
            .position(|f| f.name == name)
            .ok_or_else(|| SszError::UnknownField(name.to_string()))?;
        let spans = container_spans(fields, self.bytes)?;
        let (start, end) = spans[index];
        Ok(SszView::trusted(fields[index].ty, &self.bytes[start..end]))
    }

    /// Child view for a list or vector element.
    pub fn at(&self, index: usize) -> Result<SszView<'a>, SszError> {
        let (elem, spans) = element_spans(self.ty, self.bytes)?;
        if index >= spans.len() {
            return Err(SszError::IndexOutOfBounds {
                index,
                len: spans.len(),
            });
        }
        let (start, end) = spans[index];
        Ok(SszView::trusted(elem, &self.bytes[start..end]))
    }

    /// Element count of a list or vector, bit count of a bitlist.
    pub fn len(&self) -> Result<usize, SszError> {
        match self.ty {
            SszType::Bitlist(_) => bitlist_len(self.bytes),
            SszType::Bitvector(bits) => Ok(*bits),
            _ => Ok(element_spans(self.ty, self.bytes)?.1.len()),
        }
    }

    pub fn is_empty(&self) -> Result<bool, SszError> {
        Ok(self.len()? == 0)
    }

    pub fn as_u64(&self) -> Result<u64, SszError> {
        match self.ty {
            SszType::Uint(w) if *w <= 8 => {
                let mut buf = [0u8; 8];
                buf[..self.bytes.len()].copy_from_slice(self.bytes);
                Ok(u64::from_le_bytes(buf))
            }
            _ => Err(SszError::TypeMismatch("not a uint64-compatible value")),
        }
    }

    pub fn as_u256(&self) -> Result<U256, SszError> {
        match self.ty {
            SszType::Uint(32) => Ok(U256::from_le_slice(self.bytes)),
            _ => Err(SszError::TypeMismatch("not a uint256")),
        }
    }

    pub fn as_b256(&self) -> Result<B256, SszError> {
        if self.bytes.len() != 32 {
            return Err(SszError::SizeMismatch {
                expected: 32,
                got: self.bytes.len(),
            });
        }
        Ok(B256::from_slice(self.bytes))
    }

    pub fn as_bool(&self) -> Result<bool, SszError> {
        match self.ty {
            SszType::Bool => Ok(self.bytes[0] == 1),
            _ => Err(SszError::TypeMismatch("not a bool")),
        }
    }

    /// Union selector byte.
    pub fn union_selector(&self) -> Result<u8, SszError> {
        match self.ty {
            SszType::Union(_) => Ok(self.bytes[0]),
            _ => Err(SszError::TypeMismatch("not a union")),
        }
    }

    /// Union payload view, `None` for the empty variant.
    pub fn union_value(&self) -> Result<Option<SszView<'a>>, SszError> {
        let SszType::Union(variants) = self.ty else {
            return Err(SszError::TypeMismatch("not a union"));
        };
        let selector = self.bytes[0];
        let variant = variants
            .get(selector as usize)
            .ok_or(SszError::BadSelector { selector })?;
        Ok(variant
            .ty
            .map(|ty| SszView::trusted(ty, &self.bytes[1..])))
    }

    pub fn hash_tree_root(&self) -> Result<B256, SszError> {
        super::merkle::hash_tree_root(self.ty, self.bytes)
    }
}

/// Byte spans of every container field, offsets fully validated.
pub(crate) fn container_spans(
    fields: &'static [Field],
    bytes: &[u8],
) -> Result<Vec<(usize, usize)>, SszError> {
    let mut fixed_len = 0usize;
    for f in fields {
        fixed_len += f.ty.fixed_size().unwrap_or(4);
    }
    if bytes.len() < fixed_len {
        return Err(SszError::Truncated {
            need: fixed_len,
            have: bytes.len(),
        });
    }

    // First pass: collect variable offsets in declaration order.
    let mut offsets = Vec::new();
    let mut cursor = 0usize;
    for f in fields {
        match f.ty.fixed_size() {
            Some(size) => cursor += size,
            None => {
                let off = read_offset(bytes, cursor)?;
                offsets.push(off);
                cursor += 4;
            }
        }
    }

    // Offsets must start exactly after the fixed region and never run
    // backwards; each region ends where the next one starts.
    for (i, &off) in offsets.iter().enumerate() {
        if off > bytes.len() {
            return Err(SszError::OffsetOutOfRange {
                offset: off,
                len: bytes.len(),
            });
        }
        if i == 0 && off != fixed_len {
            return Err(SszError::OverlappingOffsets { index: 0 });
        }
        if i > 0 && off < offsets[i - 1] {
            return Err(SszError::OverlappingOffsets { index: i });
        }
    }

    let mut spans = Vec::with_capacity(fields.len());
    let mut cursor = 0usize;
    let mut var_index = 0usize;
    for f in fields {
        match f.ty.fixed_size() {
            Some(size) => {
                spans.push((cursor, cursor + size));
                cursor += size;
            }
            None => {
                let start = offsets[var_index];
                let end = offsets
                    .get(var_index + 1)
                    .copied()
                    .unwrap_or(bytes.len());
                spans.push((start, end));
                cursor += 4;
                var_index += 1;
            }
        }
    }
    Ok(spans)
}

/// Byte spans of list/vector elements plus the element type.
pub(crate) fn element_spans(
    ty: &'static SszType,
    bytes: &[u8],
) -> Result<(&'static SszType, Vec<(usize, usize)>), SszError> {
    let (elem, count) = match ty {
        SszType::List(elem, limit) => match elem.fixed_size() {
            Some(size) => {
                if bytes.len() % size != 0 {
                    return Err(SszError::SizeMismatch {
                        expected: size,
                        got: bytes.len() % size,
                    });
                }
                let count = bytes.len() / size;
                if count > *limit {
                    return Err(SszError::LimitExceeded {
                        len: count,
                        limit: *limit,
                    });
                }
                return Ok((*elem, fixed_spans(count, size)));
            }
            None => {
                if bytes.is_empty() {
                    return Ok((*elem, Vec::new()));
                }
                let first = read_offset(bytes, 0)?;
                if first % 4 != 0 || first > bytes.len() {
                    return Err(SszError::OffsetOutOfRange {
                        offset: first,
                        len: bytes.len(),
                    });
                }
                let count = first / 4;
                if count > *limit {
                    return Err(SszError::LimitExceeded {
                        len: count,
                        limit: *limit,
                    });
                }
                (*elem, count)
            }
        },
        SszType::Vector(elem, n) => match elem.fixed_size() {
            Some(size) => {
                if bytes.len() != size * n {
                    return Err(SszError::SizeMismatch {
                        expected: size * n,
                        got: bytes.len(),
                    });
                }
                return Ok((*elem, fixed_spans(*n, size)));
            }
            None => (*elem, *n),
        },
        _ => return Err(SszError::TypeMismatch("not a list or vector")),
    };

    // Variable-size elements: offset table at the front.
    let table = count * 4;
    let mut offsets = Vec::with_capacity(count);
    for i in 0..count {
        offsets.push(read_offset(bytes, i * 4)?);
    }
    for (i, &off) in offsets.iter().enumerate() {
        if off > bytes.len() {
            return Err(SszError::OffsetOutOfRange {
                offset: off,
                len: bytes.len(),
            });
        }
        if (i == 0 && off != table) || (i > 0 && off < offsets[i - 1]) {
            return Err(SszError::OverlappingOffsets { index: i });
        }
    }
    let mut spans = Vec::with_capacity(count);
    for i in 0..count {
        let end = offsets.get(i + 1).copied().unwrap_or(bytes.len());
        spans.push((offsets[i], end));
    }
    Ok((elem, spans))
}

fn fixed_spans(count: usize, size: usize) -> Vec<(usize, usize)> {
    (0..count).map(|i| (i * size, (i + 1) * size)).collect()
}

fn read_offset(bytes: &[u8], at: usize) -> Result<usize, SszError> {
    if bytes.len() < at + 4 {
        return Err(SszError::Truncated {
            need: at + 4,
            have: bytes.len(),
        });
    }
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[at..at + 4]);
    Ok(u32::from_le_bytes(buf) as usize)
}

/// Bit length of a bitlist (position of the delimiter bit).
pub(crate) fn bitlist_len(bytes: &[u8]) -> Result<usize, SszError> {
    let last = *bytes.last().ok_or(SszError::BadBitlist)?;
    if last == 0 {
        return Err(SszError::BadBitlist);
    }
    let high = 7 - last.leading_zeros() as usize;
    Ok((bytes.len() - 1) * 8 + high)
}

/// Recursive structural validation.
fn validate(ty: &'static SszType, bytes: &[u8]) -> Result<(), SszError> {
    if let Some(size) = ty.fixed_size() {
        if bytes.len() != size {
            return Err(SszError::SizeMismatch {
                expected: size,
                got: bytes.len(),
            });
        }
    }
    match ty {
        SszType::Uint(_) | SszType::Bool | SszType::Bytes(_) => Ok(()),
        SszType::Bitvector(bits) => {
            // Unused high bits of the last byte must be zero.
            let spare = bits % 8;
            if spare != 0 && bytes[bytes.len() - 1] >> spare != 0 {
                return Err(SszError::BadBitlist);
            }
            Ok(())
        }
        SszType::Bitlist(limit) => {
            let len = bitlist_len(bytes)?;
            if len > *limit {
                return Err(SszError::LimitExceeded {
                    len,
                    limit: *limit,
                });
            }
            Ok(())
        }
        SszType::Container(fields) => {
            let spans = container_spans(fields, bytes)?;
            for (f, (start, end)) in fields.iter().zip(spans) {
                validate(f.ty, &bytes[start..end])?;
            }
            Ok(())
        }
        SszType::List(..) | SszType::Vector(..) => {
            let (elem, spans) = element_spans(ty, bytes)?;
            for (start, end) in spans {
                validate(elem, &bytes[start..end])?;
            }
            Ok(())
        }
        SszType::Union(variants) => {
            if bytes.is_empty() {
                return Err(SszError::Truncated { need: 1, have: 0 });
            }
            let selector = bytes[0];
            let variant = variants
                .get(selector as usize)
                .ok_or(SszError::BadSelector { selector })?;
            match variant.ty {
                None => {
                    if bytes.len() != 1 {
                        return Err(SszError::SizeMismatch {
                            expected: 1,
                            got: bytes.len(),
                        });
                    }
                    Ok(())
                }
                Some(inner) => validate(inner, &bytes[1..]),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ssz::encode;
    use crate::ssz::types::UnionVariant;

    static U64: SszType = SszType::Uint(8);
    static B32: SszType = SszType::Bytes(32);
    static BYTES_L: SszType = SszType::List(&U8, 1024);
    static U8: SszType = SszType::Uint(1);
    static PAIR: SszType = SszType::Container(&[
        Field { name: "slot", ty: &U64 },
        Field { name: "body", ty: &BYTES_L },
    ]);
    static ROOTS: SszType = SszType::Vector(&B32, 2);

    #[test]
    fn container_with_variable_tail() {
        let body = vec![0xAAu8; 5];
        let slot = 7u64.to_le_bytes();
        let encoded = encode::encode_container(&PAIR, &[&slot[..], &body[..]]).unwrap();
        let view = SszView::new(&PAIR, &encoded).unwrap();
        assert_eq!(view.field("slot").unwrap().as_u64().unwrap(), 7);
        assert_eq!(view.field("body").unwrap().as_bytes(), &body[..]);
    }

    #[test]
    fn rejects_bad_offset() {
        let slot = 7u64.to_le_bytes();
        let mut encoded = encode::encode_container(&PAIR, &[&slot[..], &[1u8, 2, 3][..]]).unwrap();
        // Point the offset past the end of the buffer.
        encoded[8] = 0xFF;
        assert!(SszView::new(&PAIR, &encoded).is_err());
    }

    #[test]
    fn rejects_truncated_vector() {
        assert!(SszView::new(&ROOTS, &[0u8; 63]).is_err());
        assert!(SszView::new(&ROOTS, &[0u8; 64]).is_ok());
    }

    #[test]
    fn fixed_list_respects_limit() {
        static SMALL: SszType = SszType::List(&U64, 2);
        let three = [0u8; 24];
        assert!(matches!(
            SszView::new(&SMALL, &three),
            Err(SszError::LimitExceeded { .. })
        ));
    }

    #[test]
    fn bitlist_length_via_delimiter() {
        // 0b0001_0110: bits 1,2 set, delimiter at bit 4 -> length 4.
        assert_eq!(bitlist_len(&[0b0001_0110]).unwrap(), 4);
        assert!(bitlist_len(&[0]).is_err());
    }

    #[test]
    fn union_selector_and_value() {
        static VARIANTS: &[UnionVariant] = &[
            UnionVariant { name: "none", ty: None },
            UnionVariant { name: "slot", ty: Some(&U64) },
        ];
        static UN: SszType = SszType::Union(VARIANTS);
        let none = encode::encode_union(0, None);
        let some = encode::encode_union(1, Some(&42u64.to_le_bytes()));
        assert!(SszView::new(&UN, &none).unwrap().union_value().unwrap().is_none());
        let v = SszView::new(&UN, &some).unwrap().union_value().unwrap().unwrap();
        assert_eq!(v.as_u64().unwrap(), 42);
    }
}
