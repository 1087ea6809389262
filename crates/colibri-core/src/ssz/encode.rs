use super::types::SszType;
use super::SszError;

/// Encode an unsigned integer at the given byte width (little-endian).
pub fn encode_uint(value: u64, width: usize) -> Vec<u8> {
    let mut out = vec![0u8; width];
    let le = value.to_le_bytes();
    let n = width.min(8);
    out[..n].copy_from_slice(&le[..n]);
    out
}

/// Assemble a container from already-encoded field payloads.
///
/// Fixed fields are validated against their declared size; variable fields
/// get a 4-byte offset in the fixed region and their payload appended to the
/// heap, in declaration order.
pub fn encode_container(ty: &'static SszType, parts: &[&[u8]]) -> Result<Vec<u8>, SszError> {
    let SszType::Container(fields) = ty else {
        return Err(SszError::TypeMismatch("encode_container on non-container"));
    };
    if fields.len() != parts.len() {
        return Err(SszError::SizeMismatch {
            expected: fields.len(),
            got: parts.len(),
        });
    }

    let mut fixed_len = 0usize;
    for f in fields.iter() {
        fixed_len += f.ty.fixed_size().unwrap_or(4);
    }

    let mut fixed = Vec::with_capacity(fixed_len);
    let mut heap: Vec<u8> = Vec::new();
    for (f, part) in fields.iter().zip(parts) {
        match f.ty.fixed_size() {
            Some(size) => {
                if part.len() != size {
                    return Err(SszError::SizeMismatch {
                        expected: size,
                        got: part.len(),
                    });
                }
                fixed.extend_from_slice(part);
            }
            None => {
                let offset = (fixed_len + heap.len()) as u32;
                fixed.extend_from_slice(&offset.to_le_bytes());
                heap.extend_from_slice(part);
            }
        }
    }
    fixed.extend_from_slice(&heap);
    Ok(fixed)
}

/// Assemble a list from already-encoded elements. Fixed-size elements are
/// concatenated; variable-size elements get an offset table.
pub fn encode_list(elem: &SszType, items: &[Vec<u8>]) -> Vec<u8> {
    match elem.fixed_size() {
        Some(_) => items.concat(),
        None => {
            let table = items.len() * 4;
            let mut out = Vec::with_capacity(table + items.iter().map(Vec::len).sum::<usize>());
            let mut offset = table;
            for item in items {
                out.extend_from_slice(&(offset as u32).to_le_bytes());
                offset += item.len();
            }
            for item in items {
                out.extend_from_slice(item);
            }
            out
        }
    }
}

/// Encode a union value: selector byte followed by the variant payload.
/// Selector 0 with no payload is the `None` variant.
pub fn encode_union(selector: u8, payload: Option<&[u8]>) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + payload.map_or(0, <[u8]>::len));
    out.push(selector);
    if let Some(p) = payload {
        out.extend_from_slice(p);
    }
    out
}
