use alloy_rlp::{Encodable, Header};

/// RLP encode an unsigned integer (big-endian, leading zeros stripped; zero
/// encodes as the empty string).
pub fn encode_uint(value: u64) -> Vec<u8> {
    let mut out = Vec::with_capacity(9);
    value.encode(&mut out);
    out
}

/// RLP encode a 256-bit big-endian quantity.
pub fn encode_u256(value: &[u8; 32]) -> Vec<u8> {
    let start = value.iter().position(|&b| b != 0).unwrap_or(32);
    encode_bytes(&value[start..])
}

/// RLP encode a byte string.
pub fn encode_bytes(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + 9);
    data.encode(&mut out);
    out
}

/// Wrap already-encoded items into an RLP list.
pub fn encode_list(items: &[Vec<u8>]) -> Vec<u8> {
    let payload_length: usize = items.iter().map(Vec::len).sum();
    let mut out = Vec::with_capacity(payload_length + 9);
    Header {
        list: true,
        payload_length,
    }
    .encode(&mut out);
    for item in items {
        out.extend_from_slice(item);
    }
    out
}

/// Decode an RLP list into its items.
///
/// String items are returned as their payload bytes; nested lists are
/// returned raw (header included) so callers can recurse. Rejects trailing
/// garbage and truncated input — this decoder sees adversarial proof bytes.
pub fn decode_list(data: &[u8]) -> Result<Vec<Vec<u8>>, String> {
    if data.is_empty() {
        return Err("empty RLP data".to_string());
    }

    let (payload, consumed) = decode_list_payload(data)?;
    if consumed != data.len() {
        return Err("trailing bytes after RLP list".to_string());
    }

    let mut items = Vec::new();
    let mut offset = 0;
    while offset < payload.len() {
        let (item, used) = decode_item(&payload[offset..])?;
        items.push(item);
        offset += used;
    }
    Ok(items)
}

/// Decode a byte-string item (rejects lists).
pub fn decode_bytes(data: &[u8]) -> Result<Vec<u8>, String> {
    if data.is_empty() {
        return Ok(vec![]);
    }
    let prefix = data[0];
    if prefix >= 0xC0 {
        return Err("expected bytes, got list".to_string());
    }
    let (item, used) = decode_item(data)?;
    if used != data.len() {
        return Err("trailing bytes after RLP string".to_string());
    }
    Ok(item)
}

/// Interpret big-endian bytes as u64 (empty = 0).
pub fn bytes_to_u64(bytes: &[u8]) -> Result<u64, String> {
    if bytes.len() > 8 {
        return Err(format!("quantity too wide for u64: {} bytes", bytes.len()));
    }
    if bytes.first() == Some(&0) && bytes.len() > 1 {
        return Err("quantity has leading zero".to_string());
    }
    let mut result: u64 = 0;
    for &b in bytes {
        result = (result << 8) | (b as u64);
    }
    Ok(result)
}

/// Interpret big-endian bytes as a 32-byte right-aligned quantity.
pub fn bytes_to_u256(bytes: &[u8]) -> Result<[u8; 32], String> {
    if bytes.len() > 32 {
        return Err(format!("quantity too wide for u256: {} bytes", bytes.len()));
    }
    let mut result = [0u8; 32];
    result[32 - bytes.len()..].copy_from_slice(bytes);
    Ok(result)
}

fn decode_list_payload(data: &[u8]) -> Result<(&[u8], usize), String> {
    let prefix = data[0];
    if prefix < 0xC0 {
        return Err("expected list prefix".to_string());
    }
    if prefix <= 0xF7 {
        let length = (prefix - 0xC0) as usize;
        if data.len() < 1 + length {
            return Err("short list: insufficient data".to_string());
        }
        Ok((&data[1..1 + length], 1 + length))
    } else {
        let len_bytes = (prefix - 0xF7) as usize;
        let length = read_length(data, len_bytes)?;
        let total = 1 + len_bytes + length;
        if data.len() < total {
            return Err("long list: insufficient data".to_string());
        }
        Ok((&data[1 + len_bytes..total], total))
    }
}

fn decode_item(data: &[u8]) -> Result<(Vec<u8>, usize), String> {
    if data.is_empty() {
        return Err("empty data in RLP item".to_string());
    }
    let prefix = data[0];

    if prefix <= 0x7F {
        Ok((vec![prefix], 1))
    } else if prefix <= 0xB7 {
        let length = (prefix - 0x80) as usize;
        if data.len() < 1 + length {
            return Err("short string: insufficient data".to_string());
        }
        if length == 1 && data[1] <= 0x7F {
            return Err("non-canonical single byte encoding".to_string());
        }
        Ok((data[1..1 + length].to_vec(), 1 + length))
    } else if prefix <= 0xBF {
        let len_bytes = (prefix - 0xB7) as usize;
        let length = read_length(data, len_bytes)?;
        if length <= 55 {
            return Err("non-canonical long string length".to_string());
        }
        let total = 1 + len_bytes + length;
        if data.len() < total {
            return Err("long string: insufficient data".to_string());
        }
        Ok((data[1 + len_bytes..total].to_vec(), total))
    } else {
        // Nested list: return raw, header included.
        let (_, total) = decode_list_payload(data)?;
        Ok((data[..total].to_vec(), total))
    }
}

fn read_length(data: &[u8], len_bytes: usize) -> Result<usize, String> {
    if len_bytes == 0 || len_bytes > 8 || data.len() < 1 + len_bytes {
        return Err("invalid length-of-length".to_string());
    }
    if data[1] == 0 {
        return Err("length has leading zero".to_string());
    }
    let mut length: usize = 0;
    for i in 0..len_bytes {
        length = length
            .checked_shl(8)
            .ok_or("length overflow")?
            | data[1 + i] as usize;
    }
    Ok(length)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_uint_vectors() {
        assert_eq!(encode_uint(0), vec![0x80]);
        assert_eq!(encode_uint(1), vec![0x01]);
        assert_eq!(encode_uint(127), vec![0x7F]);
        assert_eq!(encode_uint(128), vec![0x81, 0x80]);
        assert_eq!(encode_uint(256), vec![0x82, 0x01, 0x00]);
    }

    #[test]
    fn encode_decode_list_round_trip() {
        let items = vec![encode_uint(1), encode_bytes(b"abc"), encode_uint(0)];
        let encoded = encode_list(&items);
        let decoded = decode_list(&encoded).unwrap();
        assert_eq!(decoded, vec![vec![0x01], b"abc".to_vec(), vec![]]);
    }

    #[test]
    fn nested_list_returned_raw() {
        let inner = encode_list(&[encode_uint(7)]);
        let outer = encode_list(&[inner.clone()]);
        let items = decode_list(&outer).unwrap();
        assert_eq!(items, vec![inner]);
    }

    #[test]
    fn rejects_trailing_garbage() {
        let mut encoded = encode_list(&[encode_uint(1)]);
        encoded.push(0x00);
        assert!(decode_list(&encoded).is_err());
    }

    #[test]
    fn rejects_non_canonical_single_byte() {
        // 0x42 must encode as itself, not as 0x81 0x42.
        assert!(decode_bytes(&[0x81, 0x42]).is_err());
    }

    #[test]
    fn quantity_decoding() {
        assert_eq!(bytes_to_u64(&[]).unwrap(), 0);
        assert_eq!(bytes_to_u64(&[0x01, 0x00]).unwrap(), 256);
        assert!(bytes_to_u64(&[0x00, 0x01]).is_err());
        assert_eq!(bytes_to_u256(&[0x01]).unwrap()[31], 1);
        assert!(bytes_to_u256(&[0u8; 33]).is_err());
    }
}
