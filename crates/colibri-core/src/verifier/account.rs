//! Account-family verification: walk the Merkle-Patricia evidence down from
//! a stateRoot that has itself been pinned to the signed beacon block.

use alloy_primitives::{Address, B256, U256};
use serde_json::{json, Value};

use crate::chains::ChainSpec;
use crate::error::{Error, Exec};
use crate::primitives::hash::keccak256;
use crate::primitives::{json as json_util, rlp};
use crate::ssz::SszView;
use crate::trie;

use super::beacon::{u64_leaf, verify_anchor, verify_exec_fields};
use super::{enforce_claim, node_list, VerifierCtx};

/// keccak256 of empty bytes — the code hash of every EOA.
pub const EMPTY_CODE_HASH: [u8; 32] = [
    0xc5, 0xd2, 0x46, 0x01, 0x86, 0xf7, 0x23, 0x3c, 0x92, 0x7e, 0x7d, 0xb2, 0xdc, 0xc7, 0x03,
    0xc0, 0xe5, 0x00, 0xb6, 0x53, 0xca, 0x82, 0x27, 0x3b, 0x7b, 0xfa, 0xd8, 0x04, 0x5d, 0x85,
    0xa4, 0x70,
];

/// A decoded state-trie account leaf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountInfo {
    pub nonce: u64,
    pub balance: U256,
    pub storage_root: B256,
    pub code_hash: B256,
}

impl AccountInfo {
    /// The canonical non-existent account.
    pub fn empty() -> Self {
        AccountInfo {
            nonce: 0,
            balance: U256::ZERO,
            storage_root: B256::from(trie::EMPTY_ROOT),
            code_hash: B256::from(EMPTY_CODE_HASH),
        }
    }
}

pub fn verify(
    ctx: &mut VerifierCtx,
    spec: &'static ChainSpec,
    view: &SszView<'_>,
    claimed: Option<Value>,
) -> Exec<Value> {
    let state_root = view.field("state_root")?.as_b256()?;
    let block_number = view.field("block_number")?.as_u64()?;
    let block_hash = view.field("block_hash")?.as_b256()?;

    let skip_signature = ctx.hash_is_trusted(&block_hash);
    let data_header = verify_anchor(ctx, spec, &view.field("anchor")?, skip_signature)?;
    verify_exec_fields(
        spec,
        &data_header,
        &[
            ("state_root", state_root),
            ("block_number", u64_leaf(block_number)),
            ("block_hash", block_hash),
        ],
        &[],
        &view.field("exec_witnesses")?,
    )?;

    let witness = view.field("account")?;
    let address = Address::from_slice(witness.field("address")?.as_bytes());
    let requested = json_util::address(ctx.arg(0)?)?;
    if requested != address {
        return Err(Error::IntegrityMismatch(format!(
            "proof is for {address}, request was for {requested}"
        ))
        .into());
    }

    let account = verify_account_leaf(&state_root, &address, &witness)?;

    let result = match ctx.method() {
        "eth_getBalance" => Value::String(json_util::format_quantity_u256(&account.balance)),
        "eth_getCode" => match code_bytes(&witness)? {
            Some(code) => {
                if B256::from(keccak256(&code)) != account.code_hash {
                    return Err(Error::IntegrityMismatch(
                        "code preimage does not hash to the proven code hash".into(),
                    )
                    .into());
                }
                Value::String(json_util::format_bytes(&code))
            }
            // Proof built without INCLUDE_CODE: only the hash is pinned.
            None => Value::String(json_util::format_b256(&account.code_hash)),
        },
        "eth_getStorageAt" => {
            let slot = json_util::b256(ctx.arg(1)?)?;
            let value = verify_storage_leaf(&witness, &account, &slot)?;
            Value::String(json_util::format_b256(&value))
        }
        "eth_getProof" => {
            build_proof_result(ctx.arg(1)?, &witness, &address, &account)?
        }
        other => return Err(Error::input(format!("unexpected method {other}")).into()),
    };

    enforce_claim(claimed.as_ref(), &result)?;
    Ok(result)
}

/// Walk the account path and decode the leaf; an absent key is the empty
/// account (a valid proof of non-existence).
pub fn verify_account_leaf(
    state_root: &B256,
    address: &Address,
    witness: &SszView<'_>,
) -> Result<AccountInfo, Error> {
    let nodes = node_list(&witness.field("account_nodes")?)?;
    let key = keccak256(address.as_slice());
    match trie::verify_proof(&state_root.0, &key, &nodes)? {
        None => Ok(AccountInfo::empty()),
        Some(leaf) => decode_account(&leaf),
    }
}

/// Walk one storage slot under the account's storage root; absence is the
/// zero word.
pub fn verify_storage_leaf(
    witness: &SszView<'_>,
    account: &AccountInfo,
    slot: &B256,
) -> Result<B256, Error> {
    let storage = witness.field("storage")?;
    for i in 0..storage.len()? {
        let entry = storage.at(i)?;
        if entry.field("key")?.as_b256()? != *slot {
            continue;
        }
        let nodes = node_list(&entry.field("nodes")?)?;
        if nodes.is_empty() && account.storage_root == B256::from(trie::EMPTY_ROOT) {
            return Ok(B256::ZERO);
        }
        let key = keccak256(slot.as_slice());
        return match trie::verify_proof(&account.storage_root.0, &key, &nodes)? {
            None => Ok(B256::ZERO),
            Some(leaf) => {
                let raw = rlp::decode_bytes(&leaf).map_err(Error::DecodeFailed)?;
                let padded = rlp::bytes_to_u256(&raw).map_err(Error::DecodeFailed)?;
                Ok(B256::from(padded))
            }
        };
    }
    Err(Error::proof(format!("no storage proof for slot {slot}")))
}

fn code_bytes(witness: &SszView<'_>) -> Result<Option<Vec<u8>>, Error> {
    Ok(witness
        .field("code")?
        .union_value()?
        .map(|code| code.as_bytes().to_vec()))
}

fn decode_account(leaf: &[u8]) -> Result<AccountInfo, Error> {
    let items = rlp::decode_list(leaf).map_err(|e| Error::decode(format!("account RLP: {e}")))?;
    if items.len() != 4 {
        return Err(Error::decode(format!(
            "account leaf has {} fields, expected 4",
            items.len()
        )));
    }
    let storage_root = match items[2].len() {
        32 => B256::from_slice(&items[2]),
        0 => B256::from(trie::EMPTY_ROOT),
        n => return Err(Error::decode(format!("storage root is {n} bytes"))),
    };
    let code_hash = match items[3].len() {
        32 => B256::from_slice(&items[3]),
        0 => B256::from(EMPTY_CODE_HASH),
        n => return Err(Error::decode(format!("code hash is {n} bytes"))),
    };
    Ok(AccountInfo {
        nonce: rlp::bytes_to_u64(&items[0]).map_err(Error::DecodeFailed)?,
        balance: U256::from_be_slice(&items[1]),
        storage_root,
        code_hash,
    })
}

/// Rebuild the `eth_getProof` response shape from verified pieces.
fn build_proof_result(
    slots_arg: &Value,
    witness: &SszView<'_>,
    address: &Address,
    account: &AccountInfo,
) -> Result<Value, Error> {
    let account_nodes = node_list(&witness.field("account_nodes")?)?;
    let slots = slots_arg
        .as_array()
        .ok_or_else(|| Error::input("eth_getProof expects an array of storage keys"))?;

    let mut storage_proofs = Vec::with_capacity(slots.len());
    for slot_value in slots {
        let slot = json_util::b256(slot_value)?;
        let value = verify_storage_leaf(witness, account, &slot)?;
        let storage = witness.field("storage")?;
        let mut nodes_hex: Vec<String> = Vec::new();
        for i in 0..storage.len()? {
            let entry = storage.at(i)?;
            if entry.field("key")?.as_b256()? == slot {
                for node in node_list(&entry.field("nodes")?)? {
                    nodes_hex.push(json_util::format_bytes(&node));
                }
            }
        }
        storage_proofs.push(json!({
            "key": json_util::format_b256(&slot),
            "value": json_util::format_quantity_u256(&U256::from_be_bytes(value.0)),
            "proof": nodes_hex,
        }));
    }

    Ok(json!({
        "address": json_util::format_address(address),
        "accountProof": account_nodes
            .iter()
            .map(|n| json_util::format_bytes(n))
            .collect::<Vec<_>>(),
        "balance": json_util::format_quantity_u256(&account.balance),
        "nonce": json_util::format_quantity(account.nonce),
        "codeHash": json_util::format_b256(&account.code_hash),
        "storageHash": json_util::format_b256(&account.storage_root),
        "storageProof": storage_proofs,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_account_constants_line_up() {
        let account = AccountInfo::empty();
        assert_eq!(account.code_hash.0, keccak256(&[]));
        assert_eq!(account.storage_root.0, trie::EMPTY_ROOT);
    }

    #[test]
    fn account_rlp_decoding() {
        let leaf = rlp::encode_list(&[
            rlp::encode_uint(7),
            rlp::encode_bytes(&[0xDE, 0xAD]),
            rlp::encode_bytes(&[0x11; 32]),
            rlp::encode_bytes(&[0x22; 32]),
        ]);
        let account = decode_account(&leaf).unwrap();
        assert_eq!(account.nonce, 7);
        assert_eq!(account.balance, U256::from(0xdeadu64));
        assert_eq!(account.storage_root, B256::repeat_byte(0x11));
        assert_eq!(account.code_hash, B256::repeat_byte(0x22));
    }
}
