//! Receipt verification: Patricia walk to the receipt leaf, plus the
//! sibling walk to index-1 that anchors this receipt's own gas use.

use alloy_primitives::{Address, B256};
use serde_json::{json, Value};

use crate::chains::ChainSpec;
use crate::error::{Error, Exec};
use crate::ethtx::{self, DecodedReceipt, DecodedTx};
use crate::primitives::hash::keccak256;
use crate::primitives::{json as json_util, rlp};
use crate::ssz::SszView;
use crate::trie;

use super::beacon::{tx_leaf, u256_leaf, u64_leaf, verify_anchor, verify_exec_fields};
use super::{enforce_claim, node_list, VerifierCtx};

pub fn verify(
    ctx: &mut VerifierCtx,
    spec: &'static ChainSpec,
    view: &SszView<'_>,
    claimed: Option<Value>,
) -> Exec<Value> {
    let block_number = view.field("block_number")?.as_u64()?;
    let block_hash = view.field("block_hash")?.as_b256()?;
    let receipts_root = view.field("receipts_root")?.as_b256()?;
    let base_fee = view.field("base_fee_per_gas")?.as_u256()?;
    let tx_index = view.field("tx_index")?.as_u64()?;
    let raw_tx = view.field("raw_tx")?.as_bytes().to_vec();

    let skip_signature = ctx.hash_is_trusted(&block_hash);
    let data_header = verify_anchor(ctx, spec, &view.field("anchor")?, skip_signature)?;
    verify_exec_fields(
        spec,
        &data_header,
        &[
            ("block_number", u64_leaf(block_number)),
            ("block_hash", block_hash),
            ("receipts_root", receipts_root),
            ("base_fee_per_gas", u256_leaf(&base_fee)),
        ],
        &[(tx_index, tx_leaf(&raw_tx)?)],
        &view.field("exec_witnesses")?,
    )?;

    let receipt = receipt_at(&receipts_root, tx_index, &node_list(&view.field("receipt_nodes")?)?)?;
    let gas_used = match tx_index {
        0 => receipt.cumulative_gas_used,
        _ => {
            let previous = receipt_at(
                &receipts_root,
                tx_index - 1,
                &node_list(&view.field("prev_receipt_nodes")?)?,
            )?;
            receipt
                .cumulative_gas_used
                .checked_sub(previous.cumulative_gas_used)
                .ok_or_else(|| Error::proof("cumulative gas runs backwards"))?
        }
    };

    let decoded = ethtx::decode_transaction(&raw_tx)?;
    let wanted = json_util::b256(ctx.arg(0)?)?;
    if decoded.hash != wanted {
        return Err(Error::IntegrityMismatch(format!(
            "proof covers {}, request was for {wanted}",
            decoded.hash
        ))
        .into());
    }

    let result = receipt_to_json(
        &receipt,
        &decoded,
        &block_hash,
        block_number,
        tx_index,
        gas_used,
        &base_fee,
    );
    enforce_claim(claimed.as_ref(), &result)?;
    Ok(result)
}

/// Walk the receipts trie to the leaf at `index` and decode it.
pub(crate) fn receipt_at(
    receipts_root: &B256,
    index: u64,
    nodes: &[Vec<u8>],
) -> Result<DecodedReceipt, Error> {
    let key = rlp::encode_uint(index);
    let leaf = trie::verify_proof(&receipts_root.0, &key, nodes)?
        .ok_or_else(|| Error::proof(format!("no receipt at index {index}")))?;
    ethtx::decode_receipt(&leaf)
}

/// The RPC receipt object, rebuilt from verified pieces only.
pub(crate) fn receipt_to_json(
    receipt: &DecodedReceipt,
    tx: &DecodedTx,
    block_hash: &B256,
    block_number: u64,
    tx_index: u64,
    gas_used: u64,
    base_fee: &alloy_primitives::U256,
) -> Value {
    let logs: Vec<Value> = receipt
        .logs
        .iter()
        .enumerate()
        .map(|(i, log)| {
            ethtx::log_to_json(log, block_hash, block_number, &tx.hash, tx_index, i as u64)
        })
        .collect();
    let contract_address = match tx.to {
        Some(_) => Value::Null,
        None => Value::String(json_util::format_address(&created_address(tx))),
    };
    json!({
        "transactionHash": json_util::format_b256(&tx.hash),
        "transactionIndex": json_util::format_quantity(tx_index),
        "blockHash": json_util::format_b256(block_hash),
        "blockNumber": json_util::format_quantity(block_number),
        "from": json_util::format_address(&tx.from),
        "to": tx.to.as_ref().map(json_util::format_address),
        "contractAddress": contract_address,
        "cumulativeGasUsed": json_util::format_quantity(receipt.cumulative_gas_used),
        "gasUsed": json_util::format_quantity(gas_used),
        "effectiveGasPrice": json_util::format_quantity_u256(&tx.effective_gas_price(base_fee)),
        "status": json_util::format_quantity(receipt.status as u64),
        "type": json_util::format_quantity(receipt.tx_type as u64),
        "logsBloom": json_util::format_bytes(&receipt.logs_bloom),
        "logs": logs,
    })
}

/// CREATE address: keccak(rlp([sender, nonce]))[12..].
fn created_address(tx: &DecodedTx) -> Address {
    let encoded = rlp::encode_list(&[
        rlp::encode_bytes(tx.from.as_slice()),
        rlp::encode_uint(tx.nonce),
    ]);
    Address::from_slice(&keccak256(&encoded)[12..])
}
