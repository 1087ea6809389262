//! Witness proofs: `c4_witness`, the signer mode.
//!
//! Instead of a Merkle chain, the prover attests to the fetched block
//! fields with a plain secp256k1 signature over
//! `keccak(chain_id ‖ block_number ‖ block_hash ‖ timestamp)`. The
//! verifier recovers the signer and checks it against the caller's
//! expected witness set — a weaker, social trust model for chains or hosts
//! without beacon access.

use k256::ecdsa::SigningKey;

use crate::chains::ChainSpec;
use crate::config;
use crate::error::{Error, Exec};
use crate::primitives::hash::keccak256;
use crate::proof::{self, selector, sync_selector, WITNESS_PROOF, WITNESS_SIGNATURE};
use crate::ssz;

use super::beacon::{self, BlockSelector};
use super::ProverCtx;

pub fn prove(ctx: &mut ProverCtx, spec: &'static ChainSpec) -> Exec<Vec<u8>> {
    let selector_value = match ctx.param_opt(0) {
        Some(value) => BlockSelector::parse(value)?,
        None => BlockSelector::Latest,
    };
    let Some(secret) = config::witness_signer() else {
        return Err(Error::input("no witness signer installed in this process").into());
    };
    let key = SigningKey::from_slice(secret)
        .map_err(|e| Error::input(format!("witness signer key: {e}")))?;

    let anchor = beacon::resolve(ctx, spec, &selector_value)?;
    let data_bytes = anchor.data_block.clone();
    let payload = beacon::payload_view(spec, &data_bytes)?;
    let block_number = payload.field("block_number")?.as_u64()?;
    let block_hash = payload.field("block_hash")?.as_b256()?;
    let timestamp = payload.field("timestamp")?.as_u64()?;

    let digest = witness_digest(spec.chain_id, block_number, &block_hash.0, timestamp);
    let (signature, recovery) = key
        .sign_prehash_recoverable(&digest)
        .map_err(|e| Error::input(format!("witness signing: {e}")))?;
    let mut sig_bytes = [0u8; 65];
    sig_bytes[..64].copy_from_slice(&signature.to_bytes());
    sig_bytes[64] = recovery.to_byte();

    let signer = {
        let encoded = key.verifying_key().to_encoded_point(false);
        let digest = keccak256(&encoded.as_bytes()[1..]);
        let mut address = [0u8; 20];
        address.copy_from_slice(&digest[12..]);
        address
    };

    let attestation =
        ssz::encode_container(&WITNESS_SIGNATURE, &[&signer, &sig_bytes])?;
    let proof_bytes = ssz::encode_container(
        &WITNESS_PROOF,
        &[
            block_hash.as_slice(),
            &block_number.to_le_bytes(),
            &timestamp.to_le_bytes(),
            &ssz::encode_list(&WITNESS_SIGNATURE, &[attestation]),
        ],
    )?;
    Ok(proof::build_proof_request(
        None,
        selector::WITNESS,
        &proof_bytes,
        sync_selector::NONE,
        None,
    )?)
}

/// The signed preimage: all fields big-endian, fixed width.
pub fn witness_digest(
    chain_id: u64,
    block_number: u64,
    block_hash: &[u8; 32],
    timestamp: u64,
) -> [u8; 32] {
    let mut preimage = Vec::with_capacity(56);
    preimage.extend_from_slice(&chain_id.to_be_bytes());
    preimage.extend_from_slice(&block_number.to_be_bytes());
    preimage.extend_from_slice(block_hash);
    preimage.extend_from_slice(&timestamp.to_be_bytes());
    keccak256(&preimage)
}
