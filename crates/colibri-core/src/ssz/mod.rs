//! Descriptor-driven SSZ engine.
//!
//! Consensus-layer objects are described by static [`SszType`] descriptors
//! rather than derive macros: the prover and verifier walk *paths* through
//! fork-selected layouts at runtime, resolve them to generalized indices, and
//! build or check Merkle proofs against them. Views are zero-copy over the
//! backing bytes; nothing here allocates for fixed-size reads.

mod encode;
mod gindex;
mod merkle;
mod proof;
mod types;
mod view;

pub use encode::{encode_container, encode_list, encode_uint, encode_union};
pub use gindex::{gindex_add, gindex_depth, resolve_path, PathStep};
pub use merkle::{hash_tree_root, merkleize_chunks, mix_in_length, mix_in_selector, zero_hash};
pub use proof::{
    create_multi_proof, create_proof, multi_proof_witness_indices, subtree_hash,
    verify_multi_proof, verify_single_proof, MultiProof,
};
pub use types::{Field, SszType, UnionVariant};
pub use view::SszView;

use thiserror::Error;

/// Errors raised while decoding, traversing, or proving SSZ values.
/// Adversarial input must land here — the engine never panics on bad bytes.
#[derive(Debug, Error)]
pub enum SszError {
    #[error("truncated input: need {need} bytes, have {have}")]
    Truncated { need: usize, have: usize },

    #[error("offset out of range: {offset} (payload is {len} bytes)")]
    OffsetOutOfRange { offset: usize, len: usize },

    #[error("variable offsets overlap or run backwards at field {index}")]
    OverlappingOffsets { index: usize },

    #[error("length {len} exceeds declared limit {limit}")]
    LimitExceeded { len: usize, limit: usize },

    #[error("fixed-size mismatch: expected {expected} bytes, got {got}")]
    SizeMismatch { expected: usize, got: usize },

    #[error("no field named {0}")]
    UnknownField(String),

    #[error("index {index} out of bounds (length {len})")]
    IndexOutOfBounds { index: usize, len: usize },

    #[error("union selector {selector} has no variant")]
    BadSelector { selector: u8 },

    #[error("invalid bitlist: missing delimiter bit")]
    BadBitlist,

    #[error("type mismatch: {0}")]
    TypeMismatch(&'static str),

    #[error("generalized index {0} does not address this tree")]
    BadGindex(u64),
}

impl From<SszError> for crate::error::Error {
    fn from(e: SszError) -> Self {
        crate::error::Error::DecodeFailed(e.to_string())
    }
}
