use alloy_primitives::{Address, B256, U256};
use serde_json::Value;

use crate::error::Error;

/// Parse a 0x-prefixed quantity (`"0x1a"`) into a u64.
pub fn quantity_u64(value: &Value) -> Result<u64, Error> {
    let s = as_hex_str(value)?;
    u64::from_str_radix(s, 16).map_err(|e| Error::decode(format!("quantity: {e}")))
}

/// Parse a 0x-prefixed quantity into a 256-bit value.
pub fn quantity_u256(value: &Value) -> Result<U256, Error> {
    let s = as_hex_str(value)?;
    U256::from_str_radix(s, 16).map_err(|e| Error::decode(format!("quantity: {e}")))
}

/// Parse a 20-byte 0x-hex address.
pub fn address(value: &Value) -> Result<Address, Error> {
    let bytes = bytes_exact(value, 20)?;
    Ok(Address::from_slice(&bytes))
}

/// Parse a 32-byte 0x-hex word (hashes, storage keys).
pub fn b256(value: &Value) -> Result<B256, Error> {
    let bytes = bytes_exact(value, 32)?;
    Ok(B256::from_slice(&bytes))
}

/// Parse arbitrary 0x-hex bytes.
pub fn bytes(value: &Value) -> Result<Vec<u8>, Error> {
    let s = as_hex_str(value)?;
    if s.len() % 2 != 0 {
        return Err(Error::decode("hex string with odd length"));
    }
    hex::decode(s).map_err(|e| Error::decode(format!("hex: {e}")))
}

fn bytes_exact(value: &Value, len: usize) -> Result<Vec<u8>, Error> {
    let bytes = bytes(value)?;
    if bytes.len() != len {
        return Err(Error::decode(format!(
            "expected {len} bytes, got {}",
            bytes.len()
        )));
    }
    Ok(bytes)
}

fn as_hex_str(value: &Value) -> Result<&str, Error> {
    let s = value
        .as_str()
        .ok_or_else(|| Error::decode("expected a 0x-hex string"))?;
    s.strip_prefix("0x")
        .ok_or_else(|| Error::decode("missing 0x prefix"))
}

/// Format a u64 as a minimal 0x-hex quantity (`26 -> "0x1a"`).
pub fn format_quantity(value: u64) -> String {
    format!("0x{value:x}")
}

/// Format a 256-bit quantity with leading zeros stripped.
pub fn format_quantity_u256(value: &U256) -> String {
    format!("0x{value:x}")
}

/// Format bytes as 0x-hex data.
pub fn format_bytes(data: &[u8]) -> String {
    format!("0x{}", hex::encode(data))
}

/// Format a 32-byte word, zero-padded (hashes keep their full width).
pub fn format_b256(value: &B256) -> String {
    format!("0x{}", hex::encode(value))
}

/// Format an address in plain lowercase hex.
pub fn format_address(value: &Address) -> String {
    format!("0x{}", hex::encode(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn quantity_round_trip() {
        assert_eq!(quantity_u64(&json!("0x1a")).unwrap(), 26);
        assert_eq!(format_quantity(26), "0x1a");
        assert_eq!(format_quantity(0), "0x0");
    }

    #[test]
    fn rejects_missing_prefix_and_wrong_width() {
        assert!(quantity_u64(&json!("1a")).is_err());
        assert!(address(&json!("0x1234")).is_err());
        assert!(b256(&json!(42)).is_err());
    }

    #[test]
    fn u256_parses_large_values() {
        let v = quantity_u256(&json!("0xde0b6b3a7640000")).unwrap();
        assert_eq!(format_quantity_u256(&v), "0xde0b6b3a7640000");
    }

    #[test]
    fn bytes_round_trip() {
        let b = bytes(&json!("0xdeadbeef")).unwrap();
        assert_eq!(format_bytes(&b), "0xdeadbeef");
    }
}
