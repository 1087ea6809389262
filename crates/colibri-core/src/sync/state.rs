use std::collections::HashMap;
use std::sync::Arc;

use alloy_primitives::B256;

use crate::config;
use crate::error::Error;

use super::committee::SyncCommittee;

/// The verifier's persisted trust anchor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncState {
    /// Nothing trusted yet.
    Empty,
    /// A single trusted block root; a bootstrap fetch activates it.
    Checkpoint(B256),
    /// Periods whose sync committee is known and has been checked,
    /// ascending.
    Periods(Vec<u64>),
}

impl SyncState {
    /// Compact byte serialization: a tag byte, then the payload.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            SyncState::Empty => vec![0],
            SyncState::Checkpoint(root) => {
                let mut out = Vec::with_capacity(33);
                out.push(1);
                out.extend_from_slice(root.as_slice());
                out
            }
            SyncState::Periods(periods) => {
                let mut out = Vec::with_capacity(5 + periods.len() * 8);
                out.push(2);
                out.extend_from_slice(&(periods.len() as u32).to_le_bytes());
                for p in periods {
                    out.extend_from_slice(&p.to_le_bytes());
                }
                out
            }
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        match bytes.first() {
            Some(0) => Ok(SyncState::Empty),
            Some(1) => {
                if bytes.len() != 33 {
                    return Err(Error::decode("checkpoint state must be 33 bytes"));
                }
                Ok(SyncState::Checkpoint(B256::from_slice(&bytes[1..])))
            }
            Some(2) => {
                if bytes.len() < 5 {
                    return Err(Error::decode("truncated period list"));
                }
                let mut count_buf = [0u8; 4];
                count_buf.copy_from_slice(&bytes[1..5]);
                let count = u32::from_le_bytes(count_buf) as usize;
                if bytes.len() != 5 + count * 8 {
                    return Err(Error::decode("period list length mismatch"));
                }
                let mut periods = Vec::with_capacity(count);
                for chunk in bytes[5..].chunks_exact(8) {
                    let mut buf = [0u8; 8];
                    buf.copy_from_slice(chunk);
                    periods.push(u64::from_le_bytes(buf));
                }
                Ok(SyncState::Periods(periods))
            }
            _ => Err(Error::decode("unknown sync state tag")),
        }
    }

    pub fn max_period(&self) -> Option<u64> {
        match self {
            SyncState::Periods(periods) => periods.last().copied(),
            _ => None,
        }
    }

    pub fn knows_period(&self, period: u64) -> bool {
        matches!(self, SyncState::Periods(periods) if periods.binary_search(&period).is_ok())
    }
}

/// A chain's sync state plus its committees, backed by the storage plugin
/// when one is installed and purely in-memory otherwise.
pub struct SyncStore {
    chain_id: u64,
    state: SyncState,
    committees: HashMap<u64, Arc<SyncCommittee>>,
}

impl SyncStore {
    /// Load the persisted state for a chain, falling back to the process
    /// trusted-checkpoint map, then to `Empty`.
    pub fn load(chain_id: u64) -> Self {
        let state = config::storage()
            .and_then(|s| s.get(&state_key(chain_id)))
            .and_then(|bytes| SyncState::from_bytes(&bytes).ok())
            .or_else(|| config::trusted_checkpoint(chain_id).map(|r| SyncState::Checkpoint(r.into())))
            .unwrap_or(SyncState::Empty);
        SyncStore {
            chain_id,
            state,
            committees: HashMap::new(),
        }
    }

    pub fn state(&self) -> &SyncState {
        &self.state
    }

    pub fn set_checkpoint(&mut self, root: B256) {
        self.state = SyncState::Checkpoint(root);
        self.persist_state();
    }

    /// Committee active during `period`, from memory or storage.
    pub fn committee(&mut self, period: u64) -> Option<Arc<SyncCommittee>> {
        if let Some(committee) = self.committees.get(&period) {
            return Some(committee.clone());
        }
        let bytes = config::storage()?.get(&committee_key(self.chain_id, period))?;
        let committee = Arc::new(SyncCommittee::from_ssz(&bytes).ok()?);
        self.committees.insert(period, committee.clone());
        Some(committee)
    }

    /// Record a checked committee for `period` and mark the period known.
    /// Retention is bounded by the storage plugin's `max_sync_states`.
    pub fn put_committee(&mut self, period: u64, committee: Arc<SyncCommittee>) {
        if let Some(storage) = config::storage() {
            storage.set(&committee_key(self.chain_id, period), &committee.to_ssz());
        }
        self.committees.insert(period, committee);

        let mut periods = match &self.state {
            SyncState::Periods(p) => p.clone(),
            _ => Vec::new(),
        };
        if let Err(at) = periods.binary_search(&period) {
            periods.insert(at, period);
        }
        let keep = config::storage()
            .map(|s| s.max_sync_states() as usize)
            .unwrap_or(usize::MAX)
            .max(1);
        while periods.len() > keep {
            let dropped = periods.remove(0);
            self.committees.remove(&dropped);
            if let Some(storage) = config::storage() {
                storage.del(&committee_key(self.chain_id, dropped));
            }
            log::debug!("chain {}: dropped committee for period {dropped}", self.chain_id);
        }
        self.state = SyncState::Periods(periods);
        self.persist_state();
    }

    fn persist_state(&self) {
        if let Some(storage) = config::storage() {
            storage.set(&state_key(self.chain_id), &self.state.to_bytes());
        }
    }
}

fn state_key(chain_id: u64) -> String {
    format!("state/{chain_id}")
}

fn committee_key(chain_id: u64, period: u64) -> String {
    format!("period/{chain_id}/{period}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_serialization_round_trip() {
        for state in [
            SyncState::Empty,
            SyncState::Checkpoint(B256::repeat_byte(0xEE)),
            SyncState::Periods(vec![900, 901, 905]),
        ] {
            let bytes = state.to_bytes();
            assert_eq!(SyncState::from_bytes(&bytes).unwrap(), state);
        }
    }

    #[test]
    fn malformed_state_bytes_rejected() {
        assert!(SyncState::from_bytes(&[]).is_err());
        assert!(SyncState::from_bytes(&[9]).is_err());
        assert!(SyncState::from_bytes(&[1, 0, 0]).is_err());
        assert!(SyncState::from_bytes(&[2, 2, 0, 0, 0, 1]).is_err());
    }

    #[test]
    fn period_queries() {
        let state = SyncState::Periods(vec![10, 11, 12]);
        assert!(state.knows_period(11));
        assert!(!state.knows_period(13));
        assert_eq!(state.max_period(), Some(12));
        assert_eq!(SyncState::Empty.max_period(), None);
    }

    #[test]
    fn in_memory_store_tracks_periods() {
        // No storage plugin installed in unit tests: the store still works,
        // just without persistence or retention limits.
        let mut store = SyncStore {
            chain_id: 999_000_001,
            state: SyncState::Empty,
            committees: HashMap::new(),
        };
        let committee = Arc::new(SyncCommittee {
            pubkeys: vec![[0u8; 48]; 512],
            aggregate_pubkey: [0u8; 48],
        });
        store.put_committee(700, committee.clone());
        store.put_committee(701, committee.clone());
        assert_eq!(
            store.state(),
            &SyncState::Periods(vec![700, 701])
        );
        assert!(store.committee(700).is_some());
        assert!(store.committee(699).is_none());
    }
}
