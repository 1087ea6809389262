use thiserror::Error;

/// Top-level error surfaced by prover and verifier contexts.
///
/// Every variant is terminal for its context except retry handling, which the
/// request table resolves internally by re-enqueueing the offending request
/// with its originating node excluded. Once the exclusion mask is exhausted
/// the failure surfaces as [`Error::FetchFailed`].
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed method, parameter shape, unsupported chain id, or a proof
    /// whose protocol version is incompatible.
    #[error("invalid input: {0}")]
    InputInvalid(String),

    /// A pending data request resolved with `set_error`.
    #[error("fetch failed: {0}")]
    FetchFailed(String),

    /// SSZ, JSON, or RLP decoding failed — truncation, out-of-range offsets,
    /// limits exceeded.
    #[error("decode failed: {0}")]
    DecodeFailed(String),

    /// A Merkle branch does not recompute the claimed root, or a Patricia
    /// node hash does not match the child reference that named it.
    #[error("proof invalid: {0}")]
    ProofInvalid(String),

    /// The BLS aggregate check failed, or the committee bitmask is empty or
    /// below the participation quorum.
    #[error("signature invalid: {0}")]
    SignatureInvalid(String),

    /// The verifier cannot reach the attested period from its current sync
    /// state with the provided sync data.
    #[error("sync gap: {0}")]
    SyncGap(String),

    /// The claimed result does not match what the proof establishes.
    #[error("integrity mismatch: {0}")]
    IntegrityMismatch(String),
}

impl Error {
    pub fn input(msg: impl Into<String>) -> Self {
        Error::InputInvalid(msg.into())
    }

    pub fn decode(msg: impl Into<String>) -> Self {
        Error::DecodeFailed(msg.into())
    }

    pub fn proof(msg: impl Into<String>) -> Self {
        Error::ProofInvalid(msg.into())
    }
}

/// Why `execute` returned without a value.
///
/// `Pending` is a first-class suspension, not a failure: the context has
/// registered data requests and must be re-entered once the host fulfils
/// them. All fallible core code returns [`Exec`] so that `?` propagates both
/// suspensions and errors to the context driver.
#[derive(Debug)]
pub enum Interrupt {
    /// At least one data request is outstanding; re-enter after fulfilment.
    Pending,
    /// Terminal failure; the context holds the message until destroyed.
    Failure(Error),
}

pub type Exec<T> = Result<T, Interrupt>;

impl From<Error> for Interrupt {
    fn from(e: Error) -> Self {
        Interrupt::Failure(e)
    }
}

impl From<crate::ssz::SszError> for Interrupt {
    fn from(e: crate::ssz::SszError) -> Self {
        Interrupt::Failure(e.into())
    }
}

impl From<crate::trie::TrieError> for Interrupt {
    fn from(e: crate::trie::TrieError) -> Self {
        Interrupt::Failure(e.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_messages_carry_kind_prefix() {
        assert!(Error::input("bad params").to_string().starts_with("invalid input"));
        assert!(Error::proof("root mismatch").to_string().starts_with("proof invalid"));
        assert!(Error::SyncGap("period 900".into()).to_string().starts_with("sync gap"));
    }

    #[test]
    fn interrupt_from_error_is_failure() {
        let it: Interrupt = Error::decode("short buffer").into();
        assert!(matches!(it, Interrupt::Failure(Error::DecodeFailed(_))));
    }
}
