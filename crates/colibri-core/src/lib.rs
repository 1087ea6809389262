//! # Colibri Core
//!
//! A stateless Ethereum light client core: callable from any host runtime,
//! it **proves** JSON-RPC answers from untrusted execution and beacon
//! endpoints into compact SSZ artifacts, and **verifies** those artifacts
//! against a trusted beacon-chain checkpoint — without holding chain state
//! and without performing any network I/O of its own.
//!
//! ## Trust model
//!
//! - **Sync committee verification** (`sync` module): one BLS12-381
//!   aggregate check per proof, against Ethereum's 512-member committee.
//!   Trust extends from a single checkpoint through verified light-client
//!   updates, one period at a time.
//!
//! - **Merkle verification** (`ssz`, `trie` modules): SSZ multiproofs by
//!   generalized index bind execution payload fields to the signed beacon
//!   block; hex-nibble Patricia walks bind accounts, storage, receipts, and
//!   logs to those fields. Zero trust assumptions beyond the committee.
//!
//! ## Execution model
//!
//! Contexts are cooperative state machines: `execute` either finishes,
//! fails, or suspends with a batch of [`request::DataRequest`]s keyed by
//! content fingerprint. The host fetches however it likes, calls
//! `set_response`/`set_error`, and re-enters; completed work short-circuits
//! through the fingerprint cache, so re-entry is cheap and idempotent.

pub mod api;
pub mod beacon;
pub mod cache;
pub mod chains;
pub mod config;
pub mod error;
pub mod ethtx;
pub mod primitives;
pub mod proof;
pub mod prover;
pub mod request;
pub mod ssz;
pub mod sync;
pub mod trie;
pub mod verifier;

pub use api::{
    create_prover, create_verifier, destroy_prover, destroy_verifier, execute_prover,
    execute_verifier, get_proof, method_support, MethodSupport, Status,
};
pub use chains::{ChainSpec, ForkId};
pub use config::{
    install_parallel_for, install_storage, install_witness_signer, set_trusted_checkpoint,
    MemoryStorage, Storage,
};
pub use error::{Error, Exec, Interrupt};
pub use prover::{flags, ProverCtx};
pub use verifier::{TrustedHint, VerifierCtx};
