//! Witness verification: recover each attestation's signer and check it
//! against the caller's expected witness set.

use alloy_primitives::{Address, U256};
use serde_json::{json, Value};

use crate::chains::ChainSpec;
use crate::error::{Error, Exec};
use crate::ethtx::recover_signer;
use crate::primitives::json as json_util;
use crate::prover::witness::witness_digest;
use crate::ssz::SszView;

use super::{enforce_claim, VerifierCtx};

pub fn verify(
    ctx: &mut VerifierCtx,
    spec: &'static ChainSpec,
    view: &SszView<'_>,
    claimed: Option<Value>,
) -> Exec<Value> {
    let block_hash = view.field("block_hash")?.as_b256()?;
    let block_number = view.field("block_number")?.as_u64()?;
    let timestamp = view.field("timestamp")?.as_u64()?;

    let expected = expected_signers(ctx)?;
    let digest = witness_digest(spec.chain_id, block_number, &block_hash.0, timestamp);

    let attestations = view.field("attestations")?;
    if attestations.is_empty()? {
        return Err(Error::SignatureInvalid("no witness attestations".into()).into());
    }
    let mut signers = Vec::with_capacity(attestations.len()?);
    for i in 0..attestations.len()? {
        let attestation = attestations.at(i)?;
        let claimed_signer =
            Address::from_slice(attestation.field("signer")?.as_bytes());
        let sig = attestation.field("signature")?.as_bytes();
        let r = U256::from_be_slice(&sig[..32]);
        let s = U256::from_be_slice(&sig[32..64]);
        let recovered = recover_signer(&digest, &r, &s, sig[64])
            .map_err(|e| Error::SignatureInvalid(e.to_string()))?;
        if recovered != claimed_signer {
            return Err(Error::SignatureInvalid(format!(
                "attestation {i} recovers to {recovered}, not {claimed_signer}"
            ))
            .into());
        }
        if !expected.contains(&recovered) {
            return Err(Error::SignatureInvalid(format!(
                "{recovered} is not an accepted witness"
            ))
            .into());
        }
        signers.push(recovered);
    }

    let result = json!({
        "blockHash": json_util::format_b256(&block_hash),
        "blockNumber": json_util::format_quantity(block_number),
        "timestamp": json_util::format_quantity(timestamp),
        "signers": signers
            .iter()
            .map(json_util::format_address)
            .collect::<Vec<_>>(),
    });
    enforce_claim(claimed.as_ref(), &result)?;
    Ok(result)
}

/// `c4_witness` args: `[block_selector, [accepted signer addresses]]`.
fn expected_signers(ctx: &VerifierCtx) -> Result<Vec<Address>, Error> {
    let list = ctx
        .arg(1)?
        .as_array()
        .ok_or_else(|| Error::input("c4_witness expects an array of accepted signers"))?;
    if list.is_empty() {
        return Err(Error::input("accepted signer list is empty"));
    }
    list.iter().map(json_util::address).collect()
}
