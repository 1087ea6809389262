//! Account-family proofs: `eth_getBalance`, `eth_getCode`,
//! `eth_getStorageAt`, `eth_getProof`.
//!
//! The execution layer's own `eth_getProof` supplies the Merkle-Patricia
//! evidence; this builder pins it to a verified `stateRoot` by multiproving
//! the payload fields against the data block's body root.

use alloy_primitives::{Address, B256};
use serde_json::{json, Value};

use crate::chains::ChainSpec;
use crate::error::{Error, Exec};
use crate::primitives::json as json_util;
use crate::proof::{self, selector, sync_selector, ACCOUNT_PROOF, ACCOUNT_WITNESS, STORAGE_ENTRY};
use crate::request::RequestSpec;
use crate::ssz;

use super::beacon::{self, BlockSelector};
use super::{flags, sync, ProverCtx};

/// Payload fields every account proof pins to the body root.
pub const ACCOUNT_EXEC_FIELDS: [&str; 3] = ["state_root", "block_number", "block_hash"];

pub fn prove(ctx: &mut ProverCtx, spec: &'static ChainSpec) -> Exec<Vec<u8>> {
    let address = json_util::address(ctx.param(0)?)?;
    let (slots, block_index) = match ctx.method.as_str() {
        "eth_getStorageAt" => (vec![json_util::b256(ctx.param(1)?)?], 2),
        "eth_getProof" => {
            let list = ctx
                .param(1)?
                .as_array()
                .ok_or_else(|| Error::input("eth_getProof expects an array of storage keys"))?;
            let slots = list
                .iter()
                .map(json_util::b256)
                .collect::<Result<Vec<_>, _>>()?;
            (slots, 2)
        }
        _ => (Vec::new(), 1),
    };
    let selector_value = match ctx.param_opt(block_index) {
        Some(value) => BlockSelector::parse(value)?,
        None => BlockSelector::Latest,
    };

    let anchor = beacon::resolve(ctx, spec, &selector_value)?;
    let data_bytes = anchor.data_block.clone();
    let payload = beacon::payload_view(spec, &data_bytes)?;
    let state_root = payload.field("state_root")?.as_b256()?;
    let block_number = payload.field("block_number")?.as_u64()?;
    let block_hash = payload.field("block_hash")?.as_b256()?;
    let number_tag = json_util::format_quantity(block_number);

    let witness = fetch_account_witness(
        ctx,
        &address,
        &slots,
        &number_tag,
        ctx.flag(flags::INCLUDE_CODE),
    )?;

    let exec_witnesses =
        beacon::body_witnesses(spec, &data_bytes, &ACCOUNT_EXEC_FIELDS, &[])?;

    let data_json = claimed_data(ctx, &address, &slots, &number_tag)?;
    let sync_data = sync::sync_data_for(ctx, spec, spec.period(anchor.signature_slot))?;

    let proof_bytes = ssz::encode_container(
        &ACCOUNT_PROOF,
        &[
            &anchor.encode()?,
            state_root.as_slice(),
            &block_number.to_le_bytes(),
            block_hash.as_slice(),
            &proof::encode_b32_list(&exec_witnesses),
            &witness,
        ],
    )?;
    Ok(proof::build_proof_request(
        data_json.as_deref(),
        selector::ACCOUNT,
        &proof_bytes,
        sync_selector::SYNC_DATA,
        sync_data.as_deref(),
    )?)
}

/// Fetch `eth_getProof` (plus code when asked) and pack it as an
/// `ACCOUNT_WITNESS` container. Shared with the call prover, which runs one
/// per touched account.
pub fn fetch_account_witness(
    ctx: &mut ProverCtx,
    address: &Address,
    slots: &[B256],
    number_tag: &str,
    include_code: bool,
) -> Exec<Vec<u8>> {
    let slot_values: Vec<Value> = slots.iter().map(|s| json!(format!("{s}"))).collect();
    let response = ctx.requests.require_json(RequestSpec::eth_rpc(
        "eth_getProof",
        &json!([format!("{address}"), slot_values, number_tag]),
    ))?;

    let account_nodes = hex_node_list(response.get("accountProof"))?;
    let mut storage_entries = Vec::with_capacity(slots.len());
    let storage_proofs = response
        .get("storageProof")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    for slot in slots {
        let entry = storage_proofs
            .iter()
            .find(|p| {
                p.get("key")
                    .and_then(Value::as_str)
                    .map(|k| padded_key(k) == *slot)
                    .unwrap_or(false)
            })
            .ok_or_else(|| Error::FetchFailed(format!("eth_getProof omitted slot {slot}")))?;
        let nodes = hex_node_list(entry.get("proof"))?;
        storage_entries.push(ssz::encode_container(
            &STORAGE_ENTRY,
            &[slot.as_slice(), &proof::encode_bytes_list(&nodes)],
        )?);
    }

    let code = if include_code {
        let code_hex = ctx.requests.require_json(RequestSpec::eth_rpc(
            "eth_getCode",
            &json!([format!("{address}"), number_tag]),
        ))?;
        let bytes = json_util::bytes(&code_hex)?;
        ssz::encode_union(1, Some(&bytes))
    } else {
        ssz::encode_union(0, None)
    };

    Ok(ssz::encode_container(
        &ACCOUNT_WITNESS,
        &[
            address.as_slice(),
            &proof::encode_bytes_list(&account_nodes),
            &ssz::encode_list(&STORAGE_ENTRY, &storage_entries),
            &code,
        ],
    )?)
}

/// With `INCLUDE_DATA`, the untrusted node's own answer rides along for the
/// verifier to cross-check.
fn claimed_data(
    ctx: &mut ProverCtx,
    address: &Address,
    slots: &[B256],
    number_tag: &str,
) -> Exec<Option<Vec<u8>>> {
    if !ctx.flag(flags::INCLUDE_DATA) {
        return Ok(None);
    }
    let params = match ctx.method.as_str() {
        "eth_getStorageAt" => json!([format!("{address}"), format!("{}", slots[0]), number_tag]),
        "eth_getProof" => {
            let keys: Vec<Value> = slots.iter().map(|s| json!(format!("{s}"))).collect();
            json!([format!("{address}"), keys, number_tag])
        }
        _ => json!([format!("{address}"), number_tag]),
    };
    let method = ctx.method.clone();
    let answer = ctx
        .requests
        .require_json(RequestSpec::eth_rpc(&method, &params))?;
    let bytes = serde_json::to_vec(&answer)
        .map_err(|e| Error::decode(format!("claimed data: {e}")))?;
    Ok(Some(bytes))
}

fn hex_node_list(value: Option<&Value>) -> Result<Vec<Vec<u8>>, Error> {
    let list = value
        .and_then(Value::as_array)
        .ok_or_else(|| Error::decode("proof node list missing"))?;
    list.iter().map(json_util::bytes).collect()
}

/// Storage keys in `eth_getProof` replies may come back unpadded.
fn padded_key(hex_key: &str) -> B256 {
    let stripped = hex_key.strip_prefix("0x").unwrap_or(hex_key);
    let mut bytes = [0u8; 32];
    if let Ok(decoded) = hex::decode(format!(
        "{}{}",
        "0".repeat(64usize.saturating_sub(stripped.len())),
        stripped
    )) {
        if decoded.len() == 32 {
            bytes.copy_from_slice(&decoded);
        }
    }
    B256::from(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_keys_are_left_padded() {
        let key = padded_key("0x1");
        assert_eq!(key, B256::with_last_byte(1));
        let full = padded_key(&format!("0x{}", "22".repeat(32)));
        assert_eq!(full, B256::repeat_byte(0x22));
    }
}
