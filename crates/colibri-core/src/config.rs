//! Process-wide hooks, installed once by the host at startup.
//!
//! Reads are lock-free after installation; writes are the host's problem to
//! serialize. The core never touches the network or the filesystem itself —
//! everything durable goes through the storage plugin.

use std::collections::HashMap;
use std::sync::Mutex;

use once_cell::sync::{Lazy, OnceCell};

/// External key/value plugin used to persist sync states and long-lived
/// caches. Keys are namespaced by the core (`state/<chain_id>`, one-byte
/// tag prefixes for caches).
pub trait Storage: Send + Sync {
    fn get(&self, key: &str) -> Option<Vec<u8>>;
    fn set(&self, key: &str, value: &[u8]);
    fn del(&self, key: &str);

    /// Upper bound on retained sync-committee states per chain.
    fn max_sync_states(&self) -> u32 {
        3
    }
}

/// In-memory storage for hosts and tests without persistence.
#[derive(Default)]
pub struct MemoryStorage {
    data: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        MemoryStorage::default()
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.data.lock().unwrap().get(key).cloned()
    }

    fn set(&self, key: &str, value: &[u8]) {
        self.data
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_vec());
    }

    fn del(&self, key: &str) {
        self.data.lock().unwrap().remove(key);
    }
}

/// Contract: run `body(i)` for every `i` in `[begin, end)` and return only
/// after all invocations completed. Implementations may serialize.
pub type ParallelFor = fn(begin: usize, end: usize, body: &(dyn Fn(usize) + Sync));

static STORAGE: OnceCell<Box<dyn Storage>> = OnceCell::new();
static PARALLEL_FOR: OnceCell<ParallelFor> = OnceCell::new();
static WITNESS_SIGNER: OnceCell<[u8; 32]> = OnceCell::new();
static TRUSTED_CHECKPOINTS: Lazy<Mutex<HashMap<u64, [u8; 32]>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// Install the storage plugin. Returns `false` if one was already set.
pub fn install_storage(storage: Box<dyn Storage>) -> bool {
    STORAGE.set(storage).is_ok()
}

pub fn storage() -> Option<&'static dyn Storage> {
    STORAGE.get().map(|b| b.as_ref())
}

/// Install a worker-pool hook for the operations tagged as offloadable
/// (BLS aggregation over large committees, Patricia construction).
pub fn install_parallel_for(hook: ParallelFor) -> bool {
    PARALLEL_FOR.set(hook).is_ok()
}

/// Run `body` over the index range, through the host hook when one is
/// installed, serially otherwise.
pub fn parallel_for(begin: usize, end: usize, body: &(dyn Fn(usize) + Sync)) {
    match PARALLEL_FOR.get() {
        Some(hook) => hook(begin, end, body),
        None => {
            for i in begin..end {
                body(i);
            }
        }
    }
}

/// Install the secp256k1 secret used by the `c4_witness` signer mode.
pub fn install_witness_signer(secret: [u8; 32]) -> bool {
    WITNESS_SIGNER.set(secret).is_ok()
}

pub fn witness_signer() -> Option<&'static [u8; 32]> {
    WITNESS_SIGNER.get()
}

/// Record the trusted checkpoint for a chain (single-writer by contract).
pub fn set_trusted_checkpoint(chain_id: u64, block_root: [u8; 32]) {
    TRUSTED_CHECKPOINTS
        .lock()
        .unwrap()
        .insert(chain_id, block_root);
}

pub fn trusted_checkpoint(chain_id: u64) -> Option<[u8; 32]> {
    TRUSTED_CHECKPOINTS.lock().unwrap().get(&chain_id).copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn memory_storage_round_trip() {
        let storage = MemoryStorage::new();
        storage.set("state/1", b"abc");
        assert_eq!(storage.get("state/1"), Some(b"abc".to_vec()));
        storage.del("state/1");
        assert_eq!(storage.get("state/1"), None);
    }

    #[test]
    fn parallel_for_falls_back_to_serial() {
        let counter = AtomicUsize::new(0);
        parallel_for(0, 10, &|_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(counter.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn trusted_checkpoints_per_chain() {
        set_trusted_checkpoint(777, [0x42; 32]);
        assert_eq!(trusted_checkpoint(777), Some([0x42; 32]));
        assert_eq!(trusted_checkpoint(778), None);
    }
}
