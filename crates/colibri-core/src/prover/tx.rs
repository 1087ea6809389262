//! Transaction proofs: `eth_getTransactionByHash` and the
//! by-block-and-index variants.
//!
//! The raw transaction is taken from the beacon block's own payload and
//! multiproven as `transactions[i]` together with the block fields the RPC
//! object echoes back.

use serde_json::json;

use crate::chains::ChainSpec;
use crate::error::{Error, Exec};
use crate::ethtx;
use crate::primitives::json as json_util;
use crate::proof::{self, selector, sync_selector, TRANSACTION_PROOF};
use crate::request::RequestSpec;
use crate::ssz;

use super::beacon::{self, BlockSelector};
use super::{flags, sync, ProverCtx};

/// Payload fields a transaction proof pins alongside `transactions[i]`.
pub const TX_EXEC_FIELDS: [&str; 3] = ["block_number", "block_hash", "base_fee_per_gas"];

pub fn prove(ctx: &mut ProverCtx, spec: &'static ChainSpec) -> Exec<Vec<u8>> {
    let (selector_value, tx_index) = locate(ctx)?;

    let anchor = beacon::resolve(ctx, spec, &selector_value)?;
    let data_bytes = anchor.data_block.clone();
    let payload = beacon::payload_view(spec, &data_bytes)?;
    let transactions = payload.field("transactions")?;
    if tx_index as usize >= transactions.len()? {
        return Err(Error::input(format!(
            "transaction index {tx_index} out of range ({} in block)",
            transactions.len()?
        ))
        .into());
    }
    let raw_tx = transactions.at(tx_index as usize)?.as_bytes().to_vec();

    // Sanity: a by-hash lookup must land on the hash it asked for.
    if ctx.method == "eth_getTransactionByHash" {
        let wanted = json_util::b256(ctx.param(0)?)?;
        let decoded = ethtx::decode_transaction(&raw_tx)?;
        if decoded.hash != wanted {
            return Err(Error::FetchFailed(format!(
                "retry: node mapped {wanted} to a different transaction"
            ))
            .into());
        }
    }

    let block_number = payload.field("block_number")?.as_u64()?;
    let block_hash = payload.field("block_hash")?.as_b256()?;
    let base_fee = payload.field("base_fee_per_gas")?.as_u256()?;

    let exec_witnesses =
        beacon::body_witnesses(spec, &data_bytes, &TX_EXEC_FIELDS, &[tx_index])?;

    let data_json = if ctx.flag(flags::INCLUDE_DATA) {
        let method = ctx.method.clone();
        let params = ctx.params.clone();
        let answer = ctx
            .requests
            .require_json(RequestSpec::eth_rpc(&method, &params))?;
        Some(serde_json::to_vec(&answer).map_err(|e| Error::decode(format!("claimed data: {e}")))?)
    } else {
        None
    };
    let sync_data = sync::sync_data_for(ctx, spec, spec.period(anchor.signature_slot))?;

    let proof_bytes = ssz::encode_container(
        &TRANSACTION_PROOF,
        &[
            &anchor.encode()?,
            &block_number.to_le_bytes(),
            block_hash.as_slice(),
            &base_fee.to_le_bytes::<32>(),
            &tx_index.to_le_bytes(),
            &raw_tx,
            &proof::encode_b32_list(&exec_witnesses),
        ],
    )?;
    Ok(proof::build_proof_request(
        data_json.as_deref(),
        selector::TRANSACTION,
        &proof_bytes,
        sync_selector::SYNC_DATA,
        sync_data.as_deref(),
    )?)
}

/// Map the method's parameter shape to (block selector, tx index).
fn locate(ctx: &mut ProverCtx) -> Exec<(BlockSelector, u64)> {
    match ctx.method.as_str() {
        "eth_getTransactionByHash" => {
            let hash = json_util::b256(ctx.param(0)?)?;
            let tx = ctx.requests.require_json(RequestSpec::eth_rpc(
                "eth_getTransactionByHash",
                &json!([format!("{hash}")]),
            ))?;
            if tx.is_null() {
                return Err(Error::FetchFailed(format!("transaction {hash} not found")).into());
            }
            let number = json_util::quantity_u64(
                tx.get("blockNumber")
                    .ok_or_else(|| Error::input("transaction is pending, not provable"))?,
            )?;
            let index = json_util::quantity_u64(
                tx.get("transactionIndex")
                    .ok_or_else(|| Error::decode("transaction without index"))?,
            )?;
            Ok((BlockSelector::Number(number), index))
        }
        _ => {
            let selector_value = BlockSelector::parse(ctx.param(0)?)?;
            let index = json_util::quantity_u64(ctx.param(1)?)?;
            Ok((selector_value, index))
        }
    }
}
