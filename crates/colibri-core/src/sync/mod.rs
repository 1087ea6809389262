//! Sync-committee trust: BLS aggregate verification, the persisted sync
//! state, and the bootstrap/update ratchet that extends committee coverage
//! from a trusted checkpoint to the present.

pub mod committee;
pub mod state;
pub mod updates;

pub use committee::{
    verify_sync_aggregate, SyncCommittee, MIN_SYNC_COMMITTEE_PARTICIPANTS, SYNC_COMMITTEE_SIZE,
};
pub use state::{SyncState, SyncStore};
pub use updates::{apply_bootstrap, apply_update};
