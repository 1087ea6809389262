//! Execution-layer data codecs shared by both engines: typed transaction
//! decoding with sender recovery, receipt encoding/decoding for the
//! receipts trie, and `eth_getLogs` filter matching.
//!
//! The verifier reconstructs RPC-shaped JSON from raw proven bytes, so the
//! `from` field comes out of secp256k1 recovery, never out of the proof.

use alloy_primitives::{Address, B256, U256};
use k256::ecdsa::{RecoveryId, Signature as EcdsaSignature, VerifyingKey};
use serde_json::{json, Value};

use crate::error::Error;
use crate::primitives::hash::keccak256;
use crate::primitives::json as json_util;
use crate::primitives::rlp;

/// A decoded execution-layer transaction of any supported type
/// (legacy, EIP-2930, EIP-1559, EIP-4844).
#[derive(Debug, Clone)]
pub struct DecodedTx {
    pub tx_type: u8,
    pub hash: B256,
    pub from: Address,
    pub nonce: u64,
    pub gas: u64,
    pub to: Option<Address>,
    pub value: U256,
    pub input: Vec<u8>,
    pub gas_price: Option<U256>,
    pub max_fee_per_gas: Option<U256>,
    pub max_priority_fee_per_gas: Option<U256>,
    pub max_fee_per_blob_gas: Option<U256>,
    pub blob_versioned_hashes: Vec<B256>,
    pub chain_id: Option<u64>,
    pub access_list: Vec<(Address, Vec<B256>)>,
    pub y_parity: u8,
    pub r: U256,
    pub s: U256,
}

/// Decode a raw (network-encoded) transaction and recover its sender.
pub fn decode_transaction(raw: &[u8]) -> Result<DecodedTx, Error> {
    let first = *raw
        .first()
        .ok_or_else(|| Error::decode("empty transaction bytes"))?;
    let hash = B256::from(keccak256(raw));
    match first {
        0x01 => decode_eip2930(raw, hash),
        0x02 => decode_eip1559(raw, hash),
        0x03 => decode_eip4844(raw, hash),
        b if b >= 0xC0 => decode_legacy(raw, hash),
        other => Err(Error::decode(format!("unknown transaction type {other:#x}"))),
    }
}

fn decode_legacy(raw: &[u8], hash: B256) -> Result<DecodedTx, Error> {
    let items = rlp_items(raw, 9, "legacy transaction")?;
    let v = uint(&items[6])?;
    // EIP-155: v = chain_id * 2 + 35 + parity; pre-155: v = 27 + parity.
    let (chain_id, y_parity) = if v >= 35 {
        (Some((v - 35) / 2), ((v - 35) % 2) as u8)
    } else {
        (None, (v.saturating_sub(27)) as u8)
    };

    let mut unsigned: Vec<Vec<u8>> = items[..6].iter().map(|i| reencode(i)).collect();
    if let Some(id) = chain_id {
        unsigned.push(rlp::encode_uint(id));
        unsigned.push(rlp::encode_uint(0));
        unsigned.push(rlp::encode_uint(0));
    }
    let sighash = keccak256(&rlp::encode_list(&unsigned));
    let (r, s) = (quantity(&items[7])?, quantity(&items[8])?);
    let from = recover_signer(&sighash, &r, &s, y_parity)?;

    Ok(DecodedTx {
        tx_type: 0,
        hash,
        from,
        nonce: uint(&items[0])?,
        gas_price: Some(quantity(&items[1])?),
        gas: uint(&items[2])?,
        to: to_address(&items[3])?,
        value: quantity(&items[4])?,
        input: items[5].clone(),
        max_fee_per_gas: None,
        max_priority_fee_per_gas: None,
        max_fee_per_blob_gas: None,
        blob_versioned_hashes: Vec::new(),
        chain_id,
        access_list: Vec::new(),
        y_parity,
        r,
        s,
    })
}

fn decode_eip2930(raw: &[u8], hash: B256) -> Result<DecodedTx, Error> {
    let items = rlp_items(&raw[1..], 11, "eip-2930 transaction")?;
    let y_parity = uint(&items[8])? as u8;
    let sighash = typed_sighash(0x01, &items[..8]);
    let (r, s) = (quantity(&items[9])?, quantity(&items[10])?);
    let from = recover_signer(&sighash, &r, &s, y_parity)?;
    Ok(DecodedTx {
        tx_type: 1,
        hash,
        from,
        chain_id: Some(uint(&items[0])?),
        nonce: uint(&items[1])?,
        gas_price: Some(quantity(&items[2])?),
        gas: uint(&items[3])?,
        to: to_address(&items[4])?,
        value: quantity(&items[5])?,
        input: items[6].clone(),
        access_list: decode_access_list(&items[7])?,
        max_fee_per_gas: None,
        max_priority_fee_per_gas: None,
        max_fee_per_blob_gas: None,
        blob_versioned_hashes: Vec::new(),
        y_parity,
        r,
        s,
    })
}

fn decode_eip1559(raw: &[u8], hash: B256) -> Result<DecodedTx, Error> {
    let items = rlp_items(&raw[1..], 12, "eip-1559 transaction")?;
    let y_parity = uint(&items[9])? as u8;
    let sighash = typed_sighash(0x02, &items[..9]);
    let (r, s) = (quantity(&items[10])?, quantity(&items[11])?);
    let from = recover_signer(&sighash, &r, &s, y_parity)?;
    Ok(DecodedTx {
        tx_type: 2,
        hash,
        from,
        chain_id: Some(uint(&items[0])?),
        nonce: uint(&items[1])?,
        max_priority_fee_per_gas: Some(quantity(&items[2])?),
        max_fee_per_gas: Some(quantity(&items[3])?),
        gas: uint(&items[4])?,
        to: to_address(&items[5])?,
        value: quantity(&items[6])?,
        input: items[7].clone(),
        access_list: decode_access_list(&items[8])?,
        gas_price: None,
        max_fee_per_blob_gas: None,
        blob_versioned_hashes: Vec::new(),
        y_parity,
        r,
        s,
    })
}

fn decode_eip4844(raw: &[u8], hash: B256) -> Result<DecodedTx, Error> {
    let items = rlp_items(&raw[1..], 14, "eip-4844 transaction")?;
    let y_parity = uint(&items[11])? as u8;
    let sighash = typed_sighash(0x03, &items[..11]);
    let (r, s) = (quantity(&items[12])?, quantity(&items[13])?);
    let from = recover_signer(&sighash, &r, &s, y_parity)?;
    let blob_hashes = rlp::decode_list(&items[10])
        .map_err(|e| Error::decode(format!("blob hashes: {e}")))?
        .iter()
        .map(|h| {
            if h.len() == 32 {
                Ok(B256::from_slice(h))
            } else {
                Err(Error::decode("blob hash is not 32 bytes"))
            }
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(DecodedTx {
        tx_type: 3,
        hash,
        from,
        chain_id: Some(uint(&items[0])?),
        nonce: uint(&items[1])?,
        max_priority_fee_per_gas: Some(quantity(&items[2])?),
        max_fee_per_gas: Some(quantity(&items[3])?),
        gas: uint(&items[4])?,
        to: to_address(&items[5])?,
        value: quantity(&items[6])?,
        input: items[7].clone(),
        access_list: decode_access_list(&items[8])?,
        max_fee_per_blob_gas: Some(quantity(&items[9])?),
        blob_versioned_hashes: blob_hashes,
        gas_price: None,
        y_parity,
        r,
        s,
    })
}

impl DecodedTx {
    /// The effective price actually charged, given the block's base fee.
    pub fn effective_gas_price(&self, base_fee: &U256) -> U256 {
        match (&self.gas_price, &self.max_fee_per_gas) {
            (Some(price), _) => *price,
            (None, Some(max_fee)) => {
                let tip = self
                    .max_priority_fee_per_gas
                    .unwrap_or(U256::ZERO)
                    .min(max_fee.saturating_sub(*base_fee));
                base_fee.saturating_add(tip)
            }
            _ => U256::ZERO,
        }
    }

    /// The RPC object shape of `eth_getTransactionBy*`.
    pub fn to_rpc_json(
        &self,
        block_hash: &B256,
        block_number: u64,
        index: u64,
        base_fee: &U256,
    ) -> Value {
        let mut object = json!({
            "hash": json_util::format_b256(&self.hash),
            "type": json_util::format_quantity(self.tx_type as u64),
            "from": json_util::format_address(&self.from),
            "to": self.to.as_ref().map(json_util::format_address),
            "nonce": json_util::format_quantity(self.nonce),
            "gas": json_util::format_quantity(self.gas),
            "value": json_util::format_quantity_u256(&self.value),
            "input": json_util::format_bytes(&self.input),
            "blockHash": json_util::format_b256(block_hash),
            "blockNumber": json_util::format_quantity(block_number),
            "transactionIndex": json_util::format_quantity(index),
            "gasPrice": json_util::format_quantity_u256(&self.effective_gas_price(base_fee)),
            "v": json_util::format_quantity(self.y_parity as u64),
            "r": json_util::format_quantity_u256(&self.r),
            "s": json_util::format_quantity_u256(&self.s),
        });
        let map = object.as_object_mut().expect("object literal");
        if let Some(id) = self.chain_id {
            map.insert("chainId".into(), json!(json_util::format_quantity(id)));
        }
        if let Some(fee) = &self.max_fee_per_gas {
            map.insert(
                "maxFeePerGas".into(),
                json!(json_util::format_quantity_u256(fee)),
            );
        }
        if let Some(tip) = &self.max_priority_fee_per_gas {
            map.insert(
                "maxPriorityFeePerGas".into(),
                json!(json_util::format_quantity_u256(tip)),
            );
        }
        if self.tx_type >= 1 {
            let access_list: Vec<Value> = self
                .access_list
                .iter()
                .map(|(address, keys)| {
                    json!({
                        "address": json_util::format_address(address),
                        "storageKeys": keys.iter().map(json_util::format_b256).collect::<Vec<_>>(),
                    })
                })
                .collect();
            map.insert("accessList".into(), json!(access_list));
            map.insert(
                "yParity".into(),
                json!(json_util::format_quantity(self.y_parity as u64)),
            );
        }
        if let Some(blob_fee) = &self.max_fee_per_blob_gas {
            map.insert(
                "maxFeePerBlobGas".into(),
                json!(json_util::format_quantity_u256(blob_fee)),
            );
            map.insert(
                "blobVersionedHashes".into(),
                json!(self
                    .blob_versioned_hashes
                    .iter()
                    .map(json_util::format_b256)
                    .collect::<Vec<_>>()),
            );
        }
        object
    }
}

/// Recover the signing address from a 32-byte prehash and (r, s, parity).
pub fn recover_signer(
    prehash: &[u8; 32],
    r: &U256,
    s: &U256,
    y_parity: u8,
) -> Result<Address, Error> {
    let mut sig_bytes = [0u8; 64];
    sig_bytes[..32].copy_from_slice(&r.to_be_bytes::<32>());
    sig_bytes[32..].copy_from_slice(&s.to_be_bytes::<32>());
    let signature = EcdsaSignature::from_slice(&sig_bytes)
        .map_err(|e| Error::decode(format!("signature scalars: {e}")))?;
    let recovery = RecoveryId::try_from(y_parity)
        .map_err(|e| Error::decode(format!("recovery id: {e}")))?;
    let key = VerifyingKey::recover_from_prehash(prehash, &signature, recovery)
        .map_err(|e| Error::decode(format!("sender recovery: {e}")))?;
    let encoded = key.to_encoded_point(false);
    let digest = keccak256(&encoded.as_bytes()[1..]);
    Ok(Address::from_slice(&digest[12..]))
}

fn typed_sighash(tx_type: u8, unsigned_items: &[Vec<u8>]) -> [u8; 32] {
    let reencoded: Vec<Vec<u8>> = unsigned_items.iter().map(|i| reencode(i)).collect();
    let mut preimage = Vec::with_capacity(1 + 512);
    preimage.push(tx_type);
    preimage.extend_from_slice(&rlp::encode_list(&reencoded));
    keccak256(&preimage)
}

/// Items from `rlp::decode_list` carry nested lists raw, so re-encoding a
/// byte-string item needs the string header back.
fn reencode(item: &[u8]) -> Vec<u8> {
    if item.first().map(|b| *b >= 0xC0).unwrap_or(false) {
        item.to_vec()
    } else {
        rlp::encode_bytes(item)
    }
}

fn rlp_items(data: &[u8], expected: usize, what: &str) -> Result<Vec<Vec<u8>>, Error> {
    let items = rlp::decode_list(data).map_err(|e| Error::decode(format!("{what}: {e}")))?;
    if items.len() != expected {
        return Err(Error::decode(format!(
            "{what}: {} fields, expected {expected}",
            items.len()
        )));
    }
    Ok(items)
}

fn uint(item: &[u8]) -> Result<u64, Error> {
    rlp::bytes_to_u64(item).map_err(Error::DecodeFailed)
}

fn quantity(item: &[u8]) -> Result<U256, Error> {
    if item.len() > 32 {
        return Err(Error::decode("quantity wider than 256 bits"));
    }
    Ok(U256::from_be_slice(item))
}

fn to_address(item: &[u8]) -> Result<Option<Address>, Error> {
    match item.len() {
        0 => Ok(None),
        20 => Ok(Some(Address::from_slice(item))),
        n => Err(Error::decode(format!("to-address is {n} bytes"))),
    }
}

fn decode_access_list(item: &[u8]) -> Result<Vec<(Address, Vec<B256>)>, Error> {
    if item.is_empty() || item == [0xC0] {
        return Ok(Vec::new());
    }
    let entries = rlp::decode_list(item).map_err(|e| Error::decode(format!("access list: {e}")))?;
    let mut out = Vec::with_capacity(entries.len());
    for entry in entries {
        let fields =
            rlp::decode_list(&entry).map_err(|e| Error::decode(format!("access entry: {e}")))?;
        if fields.len() != 2 || fields[0].len() != 20 {
            return Err(Error::decode("malformed access list entry"));
        }
        let keys = rlp::decode_list(&fields[1])
            .map_err(|e| Error::decode(format!("access keys: {e}")))?
            .iter()
            .map(|k| {
                if k.len() == 32 {
                    Ok(B256::from_slice(k))
                } else {
                    Err(Error::decode("access key is not 32 bytes"))
                }
            })
            .collect::<Result<Vec<_>, _>>()?;
        out.push((Address::from_slice(&fields[0]), keys));
    }
    Ok(out)
}

// --- receipts ---

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedLog {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedReceipt {
    pub tx_type: u8,
    pub status: u8,
    pub cumulative_gas_used: u64,
    pub logs_bloom: Vec<u8>,
    pub logs: Vec<DecodedLog>,
}

/// Decode a receipt as stored in the receipts trie (typed envelope
/// included).
pub fn decode_receipt(bytes: &[u8]) -> Result<DecodedReceipt, Error> {
    let (tx_type, payload) = match bytes.first() {
        Some(&b) if b <= 0x7F => (b, &bytes[1..]),
        Some(_) => (0, bytes),
        None => return Err(Error::decode("empty receipt bytes")),
    };
    let items = rlp_items(payload, 4, "receipt")?;
    let status = match items[0].as_slice() {
        [] => 0,
        [b] => *b,
        _ => return Err(Error::decode("receipt status wider than one byte")),
    };
    if items[2].len() != 256 {
        return Err(Error::decode("receipt bloom is not 256 bytes"));
    }
    let log_items = rlp::decode_list(&items[3])
        .map_err(|e| Error::decode(format!("receipt logs: {e}")))?;
    let mut logs = Vec::with_capacity(log_items.len());
    for log in &log_items {
        let fields = rlp_items(log, 3, "log")?;
        if fields[0].len() != 20 {
            return Err(Error::decode("log address is not 20 bytes"));
        }
        let topics = rlp::decode_list(&fields[1])
            .map_err(|e| Error::decode(format!("log topics: {e}")))?
            .iter()
            .map(|t| {
                if t.len() == 32 {
                    Ok(B256::from_slice(t))
                } else {
                    Err(Error::decode("topic is not 32 bytes"))
                }
            })
            .collect::<Result<Vec<_>, _>>()?;
        logs.push(DecodedLog {
            address: Address::from_slice(&fields[0]),
            topics,
            data: fields[2].clone(),
        });
    }
    Ok(DecodedReceipt {
        tx_type,
        status,
        cumulative_gas_used: uint(&items[1])?,
        logs_bloom: items[2].clone(),
        logs,
    })
}

/// Re-encode an RPC receipt object into its canonical trie leaf bytes.
pub fn encode_receipt_from_json(receipt: &Value) -> Result<Vec<u8>, Error> {
    let tx_type = receipt
        .get("type")
        .map(json_util::quantity_u64)
        .transpose()?
        .unwrap_or(0);
    let status = receipt
        .get("status")
        .map(json_util::quantity_u64)
        .transpose()?
        .ok_or_else(|| Error::decode("receipt without status"))?;
    let cumulative = receipt
        .get("cumulativeGasUsed")
        .map(json_util::quantity_u64)
        .transpose()?
        .ok_or_else(|| Error::decode("receipt without cumulativeGasUsed"))?;
    let bloom = json_util::bytes(
        receipt
            .get("logsBloom")
            .ok_or_else(|| Error::decode("receipt without logsBloom"))?,
    )?;
    if bloom.len() != 256 {
        return Err(Error::decode("logsBloom is not 256 bytes"));
    }

    let logs_json = receipt
        .get("logs")
        .and_then(Value::as_array)
        .ok_or_else(|| Error::decode("receipt without logs"))?;
    let mut log_items = Vec::with_capacity(logs_json.len());
    for log in logs_json {
        let address = json_util::address(
            log.get("address")
                .ok_or_else(|| Error::decode("log without address"))?,
        )?;
        let topics_json = log
            .get("topics")
            .and_then(Value::as_array)
            .ok_or_else(|| Error::decode("log without topics"))?;
        let topic_items: Vec<Vec<u8>> = topics_json
            .iter()
            .map(|t| Ok(rlp::encode_bytes(json_util::b256(t)?.as_slice())))
            .collect::<Result<Vec<_>, Error>>()?;
        let data = json_util::bytes(
            log.get("data")
                .ok_or_else(|| Error::decode("log without data"))?,
        )?;
        log_items.push(rlp::encode_list(&[
            rlp::encode_bytes(address.as_slice()),
            rlp::encode_list(&topic_items),
            rlp::encode_bytes(&data),
        ]));
    }

    let payload = rlp::encode_list(&[
        rlp::encode_uint(status),
        rlp::encode_uint(cumulative),
        rlp::encode_bytes(&bloom),
        rlp::encode_list(&log_items),
    ]);
    if tx_type == 0 {
        Ok(payload)
    } else {
        let mut envelope = Vec::with_capacity(payload.len() + 1);
        envelope.push(tx_type as u8);
        envelope.extend_from_slice(&payload);
        Ok(envelope)
    }
}

/// `eth_getLogs` filter matching for one log entry.
pub fn log_matches(filter: &Value, address: &Address, topics: &[B256]) -> bool {
    if let Some(wanted) = filter.get("address") {
        let hit = match wanted {
            Value::String(_) => json_util::address(wanted)
                .map(|a| a == *address)
                .unwrap_or(false),
            Value::Array(list) => list.iter().any(|a| {
                json_util::address(a)
                    .map(|a| a == *address)
                    .unwrap_or(false)
            }),
            Value::Null => true,
            _ => false,
        };
        if !hit {
            return false;
        }
    }
    if let Some(Value::Array(wanted_topics)) = filter.get("topics") {
        for (position, wanted) in wanted_topics.iter().enumerate() {
            let actual = topics.get(position);
            let hit = match wanted {
                Value::Null => true,
                Value::String(_) => {
                    actual.is_some() && json_util::b256(wanted).ok().as_ref() == actual
                }
                Value::Array(options) => options.iter().any(|option| {
                    actual.is_some() && json_util::b256(option).ok().as_ref() == actual
                }),
                _ => false,
            };
            if !hit {
                return false;
            }
        }
    }
    true
}

/// The RPC object shape of a verified log.
pub fn log_to_json(
    log: &DecodedLog,
    block_hash: &B256,
    block_number: u64,
    tx_hash: &B256,
    tx_index: u64,
    log_index: u64,
) -> Value {
    json!({
        "address": json_util::format_address(&log.address),
        "topics": log.topics.iter().map(json_util::format_b256).collect::<Vec<_>>(),
        "data": json_util::format_bytes(&log.data),
        "blockHash": json_util::format_b256(block_hash),
        "blockNumber": json_util::format_quantity(block_number),
        "transactionHash": json_util::format_b256(tx_hash),
        "transactionIndex": json_util::format_quantity(tx_index),
        "logIndex": json_util::format_quantity(log_index),
        "removed": false,
    })
}
