//! Block verification: the whole execution payload, pinned to the data
//! block's body root with a single branch, re-shaped into the RPC block
//! object; and the `eth_blockNumber` short form.

use alloy_primitives::B256;
use serde_json::{json, Value};

use crate::chains::ChainSpec;
use crate::error::{Error, Exec};
use crate::ethtx;
use crate::primitives::hash::keccak256;
use crate::primitives::{json as json_util, rlp};
use crate::ssz::{resolve_path, verify_single_proof, PathStep, SszView};
use crate::trie::PatriciaTrie;

use super::beacon::{u64_leaf, verify_anchor, verify_exec_fields};
use super::{enforce_claim, VerifierCtx};

/// keccak256 of RLP([]) — the `sha3Uncles` of every post-merge block.
const EMPTY_UNCLE_HASH: &str =
    "0x1dcc4de8dec75d7aab85b567b6ccd41ad312451b948a7413f0a142fd40d49347";

pub fn verify(
    ctx: &mut VerifierCtx,
    spec: &'static ChainSpec,
    view: &SszView<'_>,
    claimed: Option<Value>,
) -> Exec<Value> {
    let payload = view.field("execution_payload")?;
    let block_hash = payload.field("block_hash")?.as_b256()?;
    let block_number = payload.field("block_number")?.as_u64()?;

    let skip_signature = ctx.hash_is_trusted(&block_hash);
    let data_header = verify_anchor(ctx, spec, &view.field("anchor")?, skip_signature)?;

    // One branch from the payload subtree to the body root.
    let (fork, _) = spec.fork_at_slot(data_header.slot);
    let body = crate::beacon::body_descriptor(fork)?;
    let (payload_g, _) = resolve_path(body, &[PathStep::Field("execution_payload")])?;
    let witnesses_view = view.field("payload_witnesses")?;
    let mut witnesses = Vec::with_capacity(witnesses_view.len()?);
    for i in 0..witnesses_view.len()? {
        witnesses.push(witnesses_view.at(i)?.as_b256()?.0);
    }
    let payload_root = payload.hash_tree_root()?;
    if !verify_single_proof(
        &payload_root.0,
        payload_g,
        &witnesses,
        &data_header.body_root.0,
    ) {
        return Err(Error::proof(
            "execution payload does not recompute the body root",
        )
        .into());
    }

    // Bind to the request.
    match ctx.method() {
        "eth_getBlockByHash" => {
            let wanted = json_util::b256(ctx.arg(0)?)?;
            if block_hash != wanted {
                return Err(Error::IntegrityMismatch("wrong block proven".into()).into());
            }
        }
        "eth_getBlockByNumber" => {
            if let Ok(wanted) = json_util::quantity_u64(ctx.arg(0)?) {
                if block_number != wanted {
                    return Err(Error::IntegrityMismatch("wrong block proven".into()).into());
                }
            }
        }
        other => return Err(Error::input(format!("unexpected method {other}")).into()),
    }
    let hydrated = ctx
        .arg_opt(1)
        .and_then(Value::as_bool)
        .unwrap_or(false);

    let result = build_block_json(&payload, &data_header.parent_root, hydrated)?;
    enforce_claim(claimed.as_ref(), &result)?;
    Ok(result)
}

pub fn verify_block_number(
    ctx: &mut VerifierCtx,
    spec: &'static ChainSpec,
    view: &SszView<'_>,
    claimed: Option<Value>,
) -> Exec<Value> {
    let block_number = view.field("block_number")?.as_u64()?;
    let timestamp = view.field("timestamp")?.as_u64()?;

    let data_header = verify_anchor(ctx, spec, &view.field("anchor")?, false)?;
    verify_exec_fields(
        spec,
        &data_header,
        &[
            ("block_number", u64_leaf(block_number)),
            ("timestamp", u64_leaf(timestamp)),
        ],
        &[],
        &view.field("exec_witnesses")?,
    )?;

    let result = Value::String(json_util::format_quantity(block_number));
    enforce_claim(claimed.as_ref(), &result)?;
    Ok(result)
}

/// Reconstruct the RPC block object from the verified payload. The
/// transactions root is rebuilt by inserting every raw transaction into a
/// fresh Patricia trie.
fn build_block_json(
    payload: &SszView<'_>,
    parent_beacon_block_root: &B256,
    hydrated: bool,
) -> Result<Value, Error> {
    let block_hash = payload.field("block_hash")?.as_b256()?;
    let block_number = payload.field("block_number")?.as_u64()?;
    let base_fee = payload.field("base_fee_per_gas")?.as_u256()?;

    let transactions = payload.field("transactions")?;
    let mut tx_trie = PatriciaTrie::new();
    let mut tx_json = Vec::with_capacity(transactions.len()?);
    for i in 0..transactions.len()? {
        let raw = transactions.at(i)?.as_bytes();
        tx_trie.set(&rlp::encode_uint(i as u64), raw.to_vec());
        if hydrated {
            let decoded = ethtx::decode_transaction(raw)?;
            tx_json.push(decoded.to_rpc_json(&block_hash, block_number, i as u64, &base_fee));
        } else {
            tx_json.push(Value::String(json_util::format_bytes(&keccak256(raw))));
        }
    }

    let withdrawals_view = payload.field("withdrawals")?;
    let mut withdrawals = Vec::with_capacity(withdrawals_view.len()?);
    for i in 0..withdrawals_view.len()? {
        let w = withdrawals_view.at(i)?;
        withdrawals.push(json!({
            "index": json_util::format_quantity(w.field("index")?.as_u64()?),
            "validatorIndex": json_util::format_quantity(w.field("validator_index")?.as_u64()?),
            "address": format!("0x{}", hex::encode(w.field("address")?.as_bytes())),
            "amount": json_util::format_quantity(w.field("amount")?.as_u64()?),
        }));
    }

    Ok(json!({
        "hash": json_util::format_b256(&block_hash),
        "number": json_util::format_quantity(block_number),
        "parentHash": json_util::format_b256(&payload.field("parent_hash")?.as_b256()?),
        "stateRoot": json_util::format_b256(&payload.field("state_root")?.as_b256()?),
        "receiptsRoot": json_util::format_b256(&payload.field("receipts_root")?.as_b256()?),
        "transactionsRoot": format!("0x{}", hex::encode(tx_trie.root_hash())),
        "logsBloom": json_util::format_bytes(payload.field("logs_bloom")?.as_bytes()),
        "miner": format!("0x{}", hex::encode(payload.field("fee_recipient")?.as_bytes())),
        "mixHash": json_util::format_b256(&payload.field("prev_randao")?.as_b256()?),
        "gasLimit": json_util::format_quantity(payload.field("gas_limit")?.as_u64()?),
        "gasUsed": json_util::format_quantity(payload.field("gas_used")?.as_u64()?),
        "timestamp": json_util::format_quantity(payload.field("timestamp")?.as_u64()?),
        "extraData": json_util::format_bytes(payload.field("extra_data")?.as_bytes()),
        "baseFeePerGas": json_util::format_quantity_u256(&base_fee),
        "blobGasUsed": json_util::format_quantity(payload.field("blob_gas_used")?.as_u64()?),
        "excessBlobGas": json_util::format_quantity(payload.field("excess_blob_gas")?.as_u64()?),
        "parentBeaconBlockRoot": json_util::format_b256(parent_beacon_block_root),
        "sha3Uncles": EMPTY_UNCLE_HASH,
        "uncles": [],
        "difficulty": "0x0",
        "nonce": "0x0000000000000000",
        "transactions": tx_json,
        "withdrawals": withdrawals,
    }))
}
