//! Receipt proofs: `eth_getTransactionReceipt`.
//!
//! The whole block's receipts are re-encoded into a Patricia trie whose
//! root must reproduce the payload's `receiptsRoot`; the requested index's
//! node path travels in the proof. The trie is kept in the context cache
//! under the receipt-tree tag so log proofs over the same block reuse it.

use std::sync::Arc;

use alloy_primitives::B256;
use serde_json::{json, Value};

use crate::cache::CacheValue;
use crate::chains::ChainSpec;
use crate::error::{Error, Exec};
use crate::ethtx;
use crate::primitives::{json as json_util, rlp};
use crate::proof::{self, selector, sync_selector, RECEIPT_PROOF};
use crate::request::RequestSpec;
use crate::ssz;
use crate::trie::PatriciaTrie;

use super::beacon::{self, BlockSelector};
use super::{flags, sync, ProverCtx};

/// Payload fields a receipt proof pins alongside the transaction element.
pub const RECEIPT_EXEC_FIELDS: [&str; 4] = [
    "block_number",
    "block_hash",
    "receipts_root",
    "base_fee_per_gas",
];

pub fn prove(ctx: &mut ProverCtx, spec: &'static ChainSpec) -> Exec<Vec<u8>> {
    let tx_hash = json_util::b256(ctx.param(0)?)?;
    let tx = ctx.requests.require_json(RequestSpec::eth_rpc(
        "eth_getTransactionReceipt",
        &json!([format!("{tx_hash}")]),
    ))?;
    if tx.is_null() {
        return Err(Error::FetchFailed(format!("no receipt for {tx_hash}")).into());
    }
    let block_number = json_util::quantity_u64(
        tx.get("blockNumber")
            .ok_or_else(|| Error::decode("receipt without blockNumber"))?,
    )?;
    let tx_index = json_util::quantity_u64(
        tx.get("transactionIndex")
            .ok_or_else(|| Error::decode("receipt without transactionIndex"))?,
    )?;

    let anchor = beacon::resolve(ctx, spec, &BlockSelector::Number(block_number))?;
    let data_bytes = anchor.data_block.clone();
    let payload = beacon::payload_view(spec, &data_bytes)?;
    let block_hash = payload.field("block_hash")?.as_b256()?;
    let receipts_root = payload.field("receipts_root")?.as_b256()?;
    let base_fee = payload.field("base_fee_per_gas")?.as_u256()?;
    let raw_tx = payload
        .field("transactions")?
        .at(tx_index as usize)?
        .as_bytes()
        .to_vec();

    let trie = receipts_trie(ctx, block_number, &block_hash)?;
    if trie.root_hash() != receipts_root.0 {
        return Err(Error::FetchFailed(
            "retry: block receipts do not reproduce the receipts root".into(),
        )
        .into());
    }
    let receipt_nodes = trie.prove(&rlp::encode_uint(tx_index));
    let prev_receipt_nodes = if tx_index > 0 {
        trie.prove(&rlp::encode_uint(tx_index - 1))
    } else {
        Vec::new()
    };

    let exec_witnesses =
        beacon::body_witnesses(spec, &data_bytes, &RECEIPT_EXEC_FIELDS, &[tx_index])?;

    let data_json = if ctx.flag(flags::INCLUDE_DATA) {
        Some(serde_json::to_vec(&tx).map_err(|e| Error::decode(format!("claimed data: {e}")))?)
    } else {
        None
    };
    let sync_data = sync::sync_data_for(ctx, spec, spec.period(anchor.signature_slot))?;

    let proof_bytes = ssz::encode_container(
        &RECEIPT_PROOF,
        &[
            &anchor.encode()?,
            &block_number.to_le_bytes(),
            block_hash.as_slice(),
            receipts_root.as_slice(),
            &base_fee.to_le_bytes::<32>(),
            &tx_index.to_le_bytes(),
            &raw_tx,
            &proof::encode_b32_list(&exec_witnesses),
            &proof::encode_bytes_list(&receipt_nodes),
            &proof::encode_bytes_list(&prev_receipt_nodes),
        ],
    )?;
    Ok(proof::build_proof_request(
        data_json.as_deref(),
        selector::RECEIPT,
        &proof_bytes,
        sync_selector::SYNC_DATA,
        sync_data.as_deref(),
    )?)
}

/// Fetch the block's receipts and build (or reuse) their trie. Tagged
/// "worker": construction over a full block is the expensive half of a
/// receipt proof.
pub(crate) fn receipts_trie(
    ctx: &mut ProverCtx,
    block_number: u64,
    block_hash: &B256,
) -> Exec<Arc<PatriciaTrie>> {
    let cache_key = format!("RT/{block_hash}");
    if let Some(trie) = ctx.cache.get_trie(&cache_key) {
        return Ok(trie);
    }

    let receipts = ctx.requests.require_json(RequestSpec::eth_rpc(
        "eth_getBlockReceipts",
        &json!([json_util::format_quantity(block_number)]),
    ))?;
    let list = receipts
        .as_array()
        .ok_or_else(|| Error::decode("eth_getBlockReceipts did not return an array"))?;

    let mut trie = PatriciaTrie::new();
    for (index, receipt) in list.iter().enumerate() {
        let encoded = ethtx::encode_receipt_from_json(receipt)?;
        trie.set(&rlp::encode_uint(index as u64), encoded);
    }
    let trie = Arc::new(trie);
    ctx.cache
        .set(cache_key, CacheValue::Trie(trie.clone()), 0);
    Ok(trie)
}

/// Raw block receipts, for log filtering.
pub(crate) fn block_receipts(ctx: &mut ProverCtx, block_number: u64) -> Exec<Vec<Value>> {
    let receipts = ctx.requests.require_json(RequestSpec::eth_rpc(
        "eth_getBlockReceipts",
        &json!([json_util::format_quantity(block_number)]),
    ))?;
    receipts
        .as_array()
        .cloned()
        .ok_or_else(|| Error::decode("eth_getBlockReceipts did not return an array").into())
}
