use thiserror::Error;

/// Structural problems found by `validate_basic`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("height must be positive")]
    ZeroHeight,
    #[error("chain id is empty")]
    EmptyChainId,
    #[error("no proposer address")]
    NoProposerAddress,
    #[error("{field} must be empty or 32 bytes, got {len}")]
    InvalidHashLength { field: &'static str, len: usize },
    #[error("signature {index} has length {len}, expected 64")]
    InvalidSignatureLength { index: usize, len: usize },
    #[error("validator set is empty")]
    EmptyValidatorSet,
    #[error("validator {index}: {reason}")]
    InvalidValidator { index: usize, reason: String },
    #[error("proposer is not a member of the validator set")]
    ProposerNotInSet,
    #[error("aggregator set hash in signed header and hash of validator set do not match")]
    AggregatorSetHashMismatch,
    #[error("expected exactly one signature, got {0}")]
    WrongSignatureCount(usize),
    #[error("invalid proposer public key")]
    InvalidPublicKey,
    #[error("signature verification failed")]
    SignatureVerificationFailed,
    #[error("data hash in header does not match block data")]
    DataHashMismatch,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerifyReason {
    #[error("basic validation failed: {0}")]
    ValidateBasic(#[from] ValidationError),
    #[error("height {untrusted} is not above trusted height {trusted}")]
    HeightNotIncreasing { trusted: u64, untrusted: u64 },
    #[error("new header has time before old header time")]
    TimeBeforeTrusted,
    #[error("new header has time from future")]
    TimeFromFuture,
    #[error("last header hash mismatch: expected {expected}, got {actual}")]
    LastHeaderHashMismatch { expected: String, actual: String },
    #[error("last commit hash mismatch: expected {expected}, got {actual}")]
    LastCommitHashMismatch { expected: String, actual: String },
}

/// Every rejection of an untrusted header is reported through this envelope.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("header verification failed at height {height}: {reason}")]
pub struct VerifyError {
    pub height: u64,
    #[source]
    pub reason: VerifyReason,
}

impl VerifyError {
    pub fn new(height: u64, reason: impl Into<VerifyReason>) -> Self {
        Self {
            height,
            reason: reason.into(),
        }
    }

    pub fn is_validate_basic(&self) -> bool {
        matches!(self.reason, VerifyReason::ValidateBasic(_))
    }

    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self.reason {
            VerifyReason::ValidateBasic(_) => "validate_basic",
            VerifyReason::HeightNotIncreasing { .. } => "height",
            VerifyReason::TimeBeforeTrusted | VerifyReason::TimeFromFuture => "time",
            VerifyReason::LastHeaderHashMismatch { .. } => "last_header_hash",
            VerifyReason::LastCommitHashMismatch { .. } => "last_commit_hash",
        }
    }
}
