//! Log proofs: `eth_getLogs`, batched per block.
//!
//! Every block in the filter range contributes one anchored group: its
//! matching receipts with their Patricia paths, plus the raw transactions
//! whose hashes the result objects carry. Blocks without matches are
//! skipped entirely — the verifier re-applies the filter to what is proven.

use serde_json::Value;

use crate::chains::ChainSpec;
use crate::error::{Error, Exec};
use crate::ethtx;
use crate::primitives::{json as json_util, rlp};
use crate::proof::{self, selector, sync_selector, LOGS_BLOCK, LOGS_PROOF, LOGS_RECEIPT};
use crate::ssz;

use super::beacon::{self, BlockSelector};
use super::{receipt, sync, ProverCtx};

/// Hard cap on blocks per `eth_getLogs` proof.
const MAX_RANGE: u64 = 256;

/// Payload fields pinned for each log block.
pub const LOGS_EXEC_FIELDS: [&str; 3] = ["block_number", "block_hash", "receipts_root"];

pub fn prove(ctx: &mut ProverCtx, spec: &'static ChainSpec) -> Exec<Vec<u8>> {
    let filter = ctx.param(0)?.clone();
    if !filter.is_object() {
        return Err(Error::input("eth_getLogs expects a filter object").into());
    }
    let (from, to) = block_range(ctx, &filter)?;
    if to < from {
        return Err(Error::input("toBlock before fromBlock").into());
    }
    if to - from + 1 > MAX_RANGE {
        return Err(Error::input(format!(
            "filter spans {} blocks, maximum is {MAX_RANGE}",
            to - from + 1
        ))
        .into());
    }

    let mut blocks = Vec::new();
    let mut signature_period = 0;
    for number in from..=to {
        let receipts = receipt::block_receipts(ctx, number)?;
        let matching = matching_indices(&filter, &receipts)?;
        if matching.is_empty() {
            continue;
        }

        let anchor = beacon::resolve(ctx, spec, &BlockSelector::Number(number))?;
        signature_period = signature_period.max(spec.period(anchor.signature_slot));
        let data_bytes = anchor.data_block.clone();
        let payload = beacon::payload_view(spec, &data_bytes)?;
        let block_hash = payload.field("block_hash")?.as_b256()?;
        let receipts_root = payload.field("receipts_root")?.as_b256()?;

        let trie = receipt::receipts_trie(ctx, number, &block_hash)?;
        if trie.root_hash() != receipts_root.0 {
            return Err(Error::FetchFailed(
                "retry: block receipts do not reproduce the receipts root".into(),
            )
            .into());
        }

        let transactions = payload.field("transactions")?;
        let mut receipt_items = Vec::with_capacity(matching.len());
        for &index in &matching {
            let raw_tx = transactions.at(index as usize)?.as_bytes().to_vec();
            let nodes = trie.prove(&rlp::encode_uint(index));
            receipt_items.push(ssz::encode_container(
                &LOGS_RECEIPT,
                &[
                    &index.to_le_bytes(),
                    &raw_tx,
                    &proof::encode_bytes_list(&nodes),
                ],
            )?);
        }

        let exec_witnesses =
            beacon::body_witnesses(spec, &data_bytes, &LOGS_EXEC_FIELDS, &matching)?;
        blocks.push(ssz::encode_container(
            &LOGS_BLOCK,
            &[
                &anchor.encode()?,
                &number.to_le_bytes(),
                block_hash.as_slice(),
                receipts_root.as_slice(),
                &proof::encode_b32_list(&exec_witnesses),
                &ssz::encode_list(&LOGS_RECEIPT, &receipt_items),
            ],
        )?);
    }

    let sync_data = if signature_period > 0 {
        sync::sync_data_for(ctx, spec, signature_period)?
    } else {
        None
    };

    let proof_bytes = ssz::encode_container(
        &LOGS_PROOF,
        &[&ssz::encode_list(&LOGS_BLOCK, &blocks)],
    )?;
    Ok(proof::build_proof_request(
        None,
        selector::LOGS,
        &proof_bytes,
        sync_selector::SYNC_DATA,
        sync_data.as_deref(),
    )?)
}

/// Resolve the filter's block range; `blockHash` wins over from/to.
fn block_range(ctx: &mut ProverCtx, filter: &Value) -> Exec<(u64, u64)> {
    if let Some(hash_value) = filter.get("blockHash") {
        let exec = beacon::fetch_exec_block(ctx, hash_value)?;
        let number = json_util::quantity_u64(
            exec.get("number")
                .ok_or_else(|| Error::decode("execution block without number"))?,
        )?;
        return Ok((number, number));
    }
    let from = filter
        .get("fromBlock")
        .map(json_util::quantity_u64)
        .transpose()?
        .ok_or_else(|| Error::input("filter without fromBlock"))?;
    let to = filter
        .get("toBlock")
        .map(json_util::quantity_u64)
        .transpose()?
        .ok_or_else(|| Error::input("filter without toBlock"))?;
    Ok((from, to))
}

/// Transaction indices whose receipts carry at least one matching log.
fn matching_indices(filter: &Value, receipts: &[Value]) -> Result<Vec<u64>, Error> {
    let mut indices = Vec::new();
    for receipt in receipts {
        let index = json_util::quantity_u64(
            receipt
                .get("transactionIndex")
                .ok_or_else(|| Error::decode("receipt without transactionIndex"))?,
        )?;
        let encoded = ethtx::encode_receipt_from_json(receipt)?;
        let decoded = ethtx::decode_receipt(&encoded)?;
        let hit = decoded
            .logs
            .iter()
            .any(|log| ethtx::log_matches(filter, &log.address, &log.topics));
        if hit {
            indices.push(index);
        }
    }
    indices.sort_unstable();
    Ok(indices)
}
