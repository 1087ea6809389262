//! Call proofs: `eth_call` and `eth_estimateGas`.
//!
//! `eth_createAccessList` enumerates the state the call touches; every
//! listed account (plus the callee and caller) is then proven with
//! `eth_getProof`, code included. The claimed result always rides in the
//! `data` union — without re-execution the verifier can only bind it to the
//! proven witness set.

use std::collections::BTreeMap;

use alloy_primitives::{Address, B256};
use serde_json::{json, Value};

use crate::chains::ChainSpec;
use crate::error::{Error, Exec};
use crate::primitives::json as json_util;
use crate::proof::{self, selector, sync_selector, ACCOUNT_WITNESS, CALL_PROOF};
use crate::request::RequestSpec;
use crate::ssz;

use super::account::{fetch_account_witness, ACCOUNT_EXEC_FIELDS};
use super::beacon::{self, BlockSelector};
use super::{sync, ProverCtx};

pub fn prove(ctx: &mut ProverCtx, spec: &'static ChainSpec) -> Exec<Vec<u8>> {
    let call = ctx.param(0)?.clone();
    if !call.is_object() {
        return Err(Error::input("call object must be a JSON object").into());
    }
    let selector_value = match ctx.param_opt(1) {
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

    // Which state does the call touch?
    let access = ctx.requests.require_json(RequestSpec::eth_rpc(
        "eth_createAccessList",
        &json!([call, number_tag]),
    ))?;
    let touched = touched_accounts(&call, &access)?;

    let mut witnesses = Vec::with_capacity(touched.len());
    for (address, slots) in &touched {
        witnesses.push(fetch_account_witness(ctx, address, slots, &number_tag, true)?);
    }

    // The claimed answer itself, from the untrusted node.
    let method = ctx.method.clone();
    let answer = ctx.requests.require_json(RequestSpec::eth_rpc(
        &method,
        &json!([call, number_tag]),
    ))?;
    let data_json =
        serde_json::to_vec(&answer).map_err(|e| Error::decode(format!("claimed data: {e}")))?;

    let exec_witnesses =
        beacon::body_witnesses(spec, &data_bytes, &ACCOUNT_EXEC_FIELDS, &[])?;
    let sync_data = sync::sync_data_for(ctx, spec, spec.period(anchor.signature_slot))?;

    let proof_bytes = ssz::encode_container(
        &CALL_PROOF,
        &[
            &anchor.encode()?,
            state_root.as_slice(),
            &block_number.to_le_bytes(),
            block_hash.as_slice(),
            &proof::encode_b32_list(&exec_witnesses),
            &ssz::encode_list(&ACCOUNT_WITNESS, &witnesses),
        ],
    )?;
    Ok(proof::build_proof_request(
        Some(&data_json),
        selector::CALL,
        &proof_bytes,
        sync_selector::SYNC_DATA,
        sync_data.as_deref(),
    )?)
}

/// Union of the access list with the call's own from/to, slots deduplicated
/// and ordered so the proof layout is deterministic.
fn touched_accounts(
    call: &Value,
    access_response: &Value,
) -> Result<Vec<(Address, Vec<B256>)>, Error> {
    let mut touched: BTreeMap<Address, Vec<B256>> = BTreeMap::new();
    for key in ["from", "to"] {
        if let Some(value) = call.get(key) {
            if !value.is_null() {
                touched.entry(json_util::address(value)?).or_default();
            }
        }
    }

    let entries = access_response
        .get("accessList")
        .and_then(Value::as_array)
        .ok_or_else(|| Error::decode("eth_createAccessList without accessList"))?;
    for entry in entries {
        let address = json_util::address(
            entry
                .get("address")
                .ok_or_else(|| Error::decode("access entry without address"))?,
        )?;
        let slots = touched.entry(address).or_default();
        if let Some(keys) = entry.get("storageKeys").and_then(Value::as_array) {
            for key in keys {
                let slot = json_util::b256(key)?;
                if !slots.contains(&slot) {
                    slots.push(slot);
                }
            }
        }
    }

    let mut ordered: Vec<(Address, Vec<B256>)> = touched.into_iter().collect();
    for (_, slots) in &mut ordered {
        slots.sort_unstable();
    }
    Ok(ordered)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn touched_accounts_merge_call_parties_with_access_list() {
        let call = json!({
            "from": format!("0x{}", "aa".repeat(20)),
            "to": format!("0x{}", "bb".repeat(20)),
            "data": "0x",
        });
        let access = json!({
            "accessList": [
                {"address": format!("0x{}", "bb".repeat(20)),
                 "storageKeys": [format!("0x{}", "02".repeat(32)), format!("0x{}", "01".repeat(32))]},
                {"address": format!("0x{}", "cc".repeat(20)), "storageKeys": []},
            ],
            "gasUsed": "0x5208",
        });
        let touched = touched_accounts(&call, &access).unwrap();
        assert_eq!(touched.len(), 3);
        let bb = touched
            .iter()
            .find(|(a, _)| *a == Address::repeat_byte(0xBB))
            .unwrap();
        // Slots deduplicated and sorted.
        assert_eq!(bb.1.len(), 2);
        assert!(bb.1[0] < bb.1[1]);
    }
}
