//! Sync-data assembly: the `getSyncData` method and the `INCLUDE_SYNC`
//! attachment shared by every other proof builder.
//!
//! Light-client objects come off the wire fork-tagged by shape: the Deneb
//! and Electra layouts differ in branch depth, so structural validation
//! classifies them without any side channel.

use serde_json::Value;

use crate::beacon::{LIGHT_CLIENT_BOOTSTRAP_DENEB, LIGHT_CLIENT_BOOTSTRAP_ELECTRA,
    LIGHT_CLIENT_UPDATE_DENEB, LIGHT_CLIENT_UPDATE_ELECTRA};
use crate::chains::ChainSpec;
use crate::config;
use crate::error::{Error, Exec};
use crate::proof::{self, fork_selector, selector, sync_selector, SYNC_DATA, UPDATE_ENVELOPE};
use crate::request::RequestSpec;
use crate::ssz::{self, SszView};
use crate::sync::SyncStore;

use super::{flags, ProverCtx};

/// Most updates one proof will carry.
const MAX_UPDATES: u64 = 64;

/// `getSyncData`: an empty proof variant whose payload is entirely
/// `sync_data` — consecutive updates from `params[0]` for `params[1]`
/// periods (default 2).
pub fn prove(ctx: &mut ProverCtx, _spec: &'static ChainSpec) -> Exec<Vec<u8>> {
    let start = period_param(ctx.param(0)?)?;
    let count = match ctx.param_opt(1) {
        Some(value) => period_param(value)?,
        None => 2,
    };
    if count == 0 || count > MAX_UPDATES {
        return Err(Error::input(format!("update count {count} out of range")).into());
    }

    let mut updates = Vec::with_capacity(count as usize);
    for period in start..start + count {
        updates.push(fetch_update_envelope(ctx, period)?);
    }
    let sync_data = encode_sync_data(None, &updates)?;
    let proof_bytes = ssz::encode_container(&proof::SYNC_PROOF, &[])?;
    Ok(proof::build_proof_request(
        None,
        selector::SYNC,
        &proof_bytes,
        sync_selector::SYNC_DATA,
        Some(&sync_data),
    )?)
}

/// Sync data for a proof whose aggregate is signed in `signature_period`,
/// or `None` when the flags say the verifier needs nothing.
///
/// With a shared chain store the batch starts at the verifier's recorded
/// coverage; otherwise it starts with a bootstrap of the configured trusted
/// checkpoint.
pub fn sync_data_for(
    ctx: &mut ProverCtx,
    spec: &'static ChainSpec,
    signature_period: u64,
) -> Exec<Option<Vec<u8>>> {
    if !ctx.flag(flags::INCLUDE_SYNC) {
        return Ok(None);
    }

    let stored_period = if ctx.flag(flags::CHAIN_STORE_AVAILABLE) {
        SyncStore::load(spec.chain_id).state().max_period()
    } else {
        None
    };

    let (bootstrap, start_period) = match stored_period {
        Some(period) => (None, period),
        None => {
            let Some(checkpoint) = config::trusted_checkpoint(spec.chain_id) else {
                return Err(Error::input(
                    "INCLUDE_SYNC without chain store requires a trusted checkpoint",
                )
                .into());
            };
            let root = alloy_primitives::B256::from(checkpoint);
            let (envelope, period) = fetch_bootstrap_envelope(ctx, spec, &root)?;
            (Some(envelope), period)
        }
    };

    if start_period >= signature_period && bootstrap.is_none() {
        return Ok(None);
    }
    if signature_period.saturating_sub(start_period) > MAX_UPDATES {
        return Err(Error::SyncGap(format!(
            "cannot bridge {} periods in one proof",
            signature_period - start_period
        ))
        .into());
    }

    let mut updates = Vec::new();
    for period in start_period..signature_period {
        updates.push(fetch_update_envelope(ctx, period)?);
    }
    Ok(Some(encode_sync_data(bootstrap.as_deref(), &updates)?))
}

fn period_param(value: &Value) -> Result<u64, Error> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .ok_or_else(|| Error::input("period must be a non-negative integer")),
        Value::String(_) => crate::primitives::json::quantity_u64(value),
        _ => Err(Error::input("period must be a number or 0x-hex string")),
    }
}

/// One update, fork-enveloped. `start_period=p` yields the update signed by
/// committee `p`, introducing committee `p+1`.
fn fetch_update_envelope(ctx: &mut ProverCtx, period: u64) -> Exec<Vec<u8>> {
    let bytes = ctx.requests.require(RequestSpec::beacon_ssz(format!(
        "eth/v1/beacon/light_client/updates?start_period={period}&count=1"
    )))?;
    let fork = classify_update(&bytes).ok_or_else(|| {
        Error::decode(format!("light client update for period {period} fits no known layout"))
    })?;
    Ok(ssz::encode_union(fork, Some(&bytes)))
}

fn fetch_bootstrap_envelope(
    ctx: &mut ProverCtx,
    spec: &ChainSpec,
    root: &alloy_primitives::B256,
) -> Exec<(Vec<u8>, u64)> {
    let bytes = ctx.requests.require(RequestSpec::beacon_ssz(format!(
        "eth/v1/beacon/light_client/bootstrap/{root}"
    )))?;
    let (fork, slot) = classify_bootstrap(&bytes)
        .ok_or_else(|| Error::decode("bootstrap fits no known layout"))?;
    Ok((ssz::encode_union(fork, Some(&bytes)), spec.period(slot)))
}

/// Structural fork classification: exactly one layout validates.
pub fn classify_update(bytes: &[u8]) -> Option<u8> {
    if SszView::new(&LIGHT_CLIENT_UPDATE_ELECTRA, bytes).is_ok() {
        return Some(fork_selector::ELECTRA);
    }
    if SszView::new(&LIGHT_CLIENT_UPDATE_DENEB, bytes).is_ok() {
        return Some(fork_selector::DENEB);
    }
    None
}

fn classify_bootstrap(bytes: &[u8]) -> Option<(u8, u64)> {
    if let Ok(view) = SszView::new(&LIGHT_CLIENT_BOOTSTRAP_ELECTRA, bytes) {
        let slot = view.field("header").ok()?.field("beacon").ok()?.field("slot").ok()?;
        return Some((fork_selector::ELECTRA, slot.as_u64().ok()?));
    }
    if let Ok(view) = SszView::new(&LIGHT_CLIENT_BOOTSTRAP_DENEB, bytes) {
        let slot = view.field("header").ok()?.field("beacon").ok()?.field("slot").ok()?;
        return Some((fork_selector::DENEB, slot.as_u64().ok()?));
    }
    None
}

fn encode_sync_data(bootstrap: Option<&[u8]>, updates: &[Vec<u8>]) -> Result<Vec<u8>, Error> {
    let bootstrap_bytes = match bootstrap {
        Some(envelope) => envelope.to_vec(),
        None => ssz::encode_union(0, None),
    };
    let updates_bytes = ssz::encode_list(&UPDATE_ENVELOPE, updates);
    Ok(ssz::encode_container(
        &SYNC_DATA,
        &[&bootstrap_bytes, &updates_bytes],
    )?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn period_param_accepts_numbers_and_hex() {
        assert_eq!(period_param(&json!(900)).unwrap(), 900);
        assert_eq!(period_param(&json!("0x384")).unwrap(), 900);
        assert!(period_param(&json!(-1)).is_err());
        assert!(period_param(&json!([])).is_err());
    }

    #[test]
    fn garbage_update_bytes_classify_as_none() {
        assert_eq!(classify_update(&[0u8; 40]), None);
    }
}
