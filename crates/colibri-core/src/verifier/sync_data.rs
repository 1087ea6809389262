//! Consuming the proof's `sync_data` union: an optional bootstrap and a
//! period-ordered update chain, each link signed by the committee the
//! previous one installed.

use crate::beacon::{
    LIGHT_CLIENT_BOOTSTRAP_DENEB, LIGHT_CLIENT_BOOTSTRAP_ELECTRA, LIGHT_CLIENT_UPDATE_DENEB,
    LIGHT_CLIENT_UPDATE_ELECTRA,
};
use crate::chains::ChainSpec;
use crate::error::{Error, Exec};
use crate::proof::fork_selector;
use crate::ssz::{SszType, SszView};
use crate::sync::{apply_bootstrap, apply_update, SyncState};

use super::VerifierCtx;

/// Apply bootstrap and updates from a `SYNC_DATA` view, in order.
pub fn consume(
    ctx: &mut VerifierCtx,
    spec: &'static ChainSpec,
    sync_view: &SszView<'_>,
) -> Exec<()> {
    if let Some(bootstrap) = sync_view.field("bootstrap")?.union_value()? {
        match ctx.store.state().clone() {
            SyncState::Checkpoint(root) => {
                apply_bootstrap(spec, &mut ctx.store, root, &bootstrap)?;
            }
            SyncState::Empty => {
                return Err(Error::SyncGap(
                    "proof carries a bootstrap but no checkpoint is trusted".into(),
                )
                .into());
            }
            // Already past bootstrap; the provided one is redundant.
            SyncState::Periods(_) => {}
        }
    }

    let updates = sync_view.field("updates")?;
    let mut previous_period = 0u64;
    for i in 0..updates.len()? {
        let Some(update) = updates.at(i)?.union_value()? else {
            return Err(Error::decode("empty update envelope").into());
        };
        let covered = apply_update(spec, &mut ctx.store, &update)?;
        if covered < previous_period {
            return Err(Error::proof("updates out of period order").into());
        }
        previous_period = covered;
    }
    Ok(())
}

/// Descriptor for a self-fetched update, classified by shape.
pub fn classify_update(bytes: &[u8]) -> Result<(&'static SszType, u8), Error> {
    if SszView::new(&LIGHT_CLIENT_UPDATE_ELECTRA, bytes).is_ok() {
        return Ok((&LIGHT_CLIENT_UPDATE_ELECTRA, fork_selector::ELECTRA));
    }
    if SszView::new(&LIGHT_CLIENT_UPDATE_DENEB, bytes).is_ok() {
        return Ok((&LIGHT_CLIENT_UPDATE_DENEB, fork_selector::DENEB));
    }
    Err(Error::decode("light client update fits no known layout"))
}

/// Descriptor for a self-fetched bootstrap, classified by shape.
pub fn classify_bootstrap(bytes: &[u8]) -> Result<(&'static SszType, u8), Error> {
    if SszView::new(&LIGHT_CLIENT_BOOTSTRAP_ELECTRA, bytes).is_ok() {
        return Ok((&LIGHT_CLIENT_BOOTSTRAP_ELECTRA, fork_selector::ELECTRA));
    }
    if SszView::new(&LIGHT_CLIENT_BOOTSTRAP_DENEB, bytes).is_ok() {
        return Ok((&LIGHT_CLIENT_BOOTSTRAP_DENEB, fork_selector::DENEB));
    }
    Err(Error::decode("light client bootstrap fits no known layout"))
}
