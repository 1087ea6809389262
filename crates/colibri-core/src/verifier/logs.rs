//! Log verification: per-block anchored receipt groups, re-filtered
//! locally. Only logs whose receipts verify against a proven receiptsRoot
//! make it into the result.

use serde_json::Value;

use crate::chains::ChainSpec;
use crate::error::{Error, Exec};
use crate::ethtx;
use crate::primitives::json as json_util;
use crate::ssz::SszView;

use super::beacon::{tx_leaf, u64_leaf, verify_anchor, verify_exec_fields};
use super::receipt::receipt_at;
use super::{enforce_claim, node_list, VerifierCtx};

pub fn verify(
    ctx: &mut VerifierCtx,
    spec: &'static ChainSpec,
    view: &SszView<'_>,
    claimed: Option<Value>,
) -> Exec<Value> {
    let filter = ctx.arg(0)?.clone();
    let blocks = view.field("blocks")?;

    let mut logs = Vec::new();
    for b in 0..blocks.len()? {
        let block = blocks.at(b)?;
        let block_number = block.field("block_number")?.as_u64()?;
        let block_hash = block.field("block_hash")?.as_b256()?;
        let receipts_root = block.field("receipts_root")?.as_b256()?;

        if !in_range(&filter, block_number)? {
            return Err(Error::IntegrityMismatch(format!(
                "proof includes block {block_number} outside the filter range"
            ))
            .into());
        }
        if let Some(hash_value) = filter.get("blockHash") {
            let wanted = json_util::b256(hash_value)?;
            if block_hash != wanted {
                return Err(Error::IntegrityMismatch(
                    "proof covers a different block than the filter's blockHash".into(),
                )
                .into());
            }
        }

        let skip_signature = ctx.hash_is_trusted(&block_hash);
        let data_header = verify_anchor(ctx, spec, &block.field("anchor")?, skip_signature)?;

        let receipts = block.field("receipts")?;
        let mut payload_leaves = vec![
            ("block_number", u64_leaf(block_number)),
            ("block_hash", block_hash),
            ("receipts_root", receipts_root),
        ];
        let mut tx_leaves = Vec::with_capacity(receipts.len()?);
        for r in 0..receipts.len()? {
            let entry = receipts.at(r)?;
            let index = entry.field("tx_index")?.as_u64()?;
            tx_leaves.push((index, tx_leaf(entry.field("raw_tx")?.as_bytes())?));
        }
        payload_leaves.dedup();
        verify_exec_fields(
            spec,
            &data_header,
            &payload_leaves,
            &tx_leaves,
            &block.field("exec_witnesses")?,
        )?;

        for r in 0..receipts.len()? {
            let entry = receipts.at(r)?;
            let index = entry.field("tx_index")?.as_u64()?;
            let raw_tx = entry.field("raw_tx")?.as_bytes().to_vec();
            let tx = ethtx::decode_transaction(&raw_tx)?;
            let receipt = receipt_at(
                &receipts_root,
                index,
                &node_list(&entry.field("receipt_nodes")?)?,
            )?;
            for (position, log) in receipt.logs.iter().enumerate() {
                if ethtx::log_matches(&filter, &log.address, &log.topics) {
                    logs.push(ethtx::log_to_json(
                        log,
                        &block_hash,
                        block_number,
                        &tx.hash,
                        index,
                        position as u64,
                    ));
                }
            }
        }
    }

    let result = Value::Array(logs);
    enforce_claim(claimed.as_ref(), &result)?;
    Ok(result)
}

fn in_range(filter: &Value, block_number: u64) -> Result<bool, Error> {
    if filter.get("blockHash").is_some() {
        // A hash-scoped filter has exactly one legal block; the anchored
        // block hash itself was checked against the proof.
        return Ok(true);
    }
    let from = filter
        .get("fromBlock")
        .map(json_util::quantity_u64)
        .transpose()?
        .unwrap_or(0);
    let to = filter
        .get("toBlock")
        .map(json_util::quantity_u64)
        .transpose()?
        .unwrap_or(u64::MAX);
    Ok(block_number >= from && block_number <= to)
}
