use crate::commit::Commit;
use crate::error::{ValidationError, VerifyError, VerifyReason};
use crate::header::Header;
use crate::types::Hash;
use crate::validator::ValidatorSet;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier};
use prost::Message;
use std::time::SystemTime;

/// A header together with the producer's commit and, unless the rollup is
/// based, the validator set that authorized it.
#[derive(Clone, PartialEq, Eq, Message)]
pub struct SignedHeader {
    #[prost(message, required, tag = "1")]
    pub header: Header,
    #[prost(message, required, tag = "2")]
    pub commit: Commit,
    #[prost(message, optional, tag = "3")]
    pub validators: Option<ValidatorSet>,
}

impl SignedHeader {
    pub fn new(header: Header, commit: Commit, validators: Option<ValidatorSet>) -> Self {
        Self {
            header,
            commit,
            validators,
        }
    }

    /// Signs the canonical encoding of `header` with `key`.
    pub fn sign(header: Header, key: &SigningKey, validators: Option<ValidatorSet>) -> Self {
        let signature = key.sign(&header.canonical_bytes());
        Self::new(
            header,
            Commit::new(vec![signature.to_bytes().to_vec()]),
            validators,
        )
    }

    pub fn height(&self) -> u64 {
        self.header.height
    }

    pub fn hash(&self) -> Hash {
        self.header.hash()
    }

    pub fn chain_id(&self) -> &str {
        &self.header.chain_id
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.encode_to_vec()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, prost::DecodeError> {
        Self::decode(bytes)
    }

    pub fn validate_basic(&self) -> Result<(), ValidationError> {
        self.header.validate_basic()?;
        self.commit.validate_basic()?;

        // Based rollups: no validator set, no signature checks.
        let Some(validators) = &self.validators else {
            return Ok(());
        };

        validators.validate_basic()?;
        if !validators.hash().matches(&self.header.aggregators_hash) {
            return Err(ValidationError::AggregatorSetHashMismatch);
        }
        if self.commit.signatures.len() != 1 {
            return Err(ValidationError::WrongSignatureCount(self.commit.signatures.len()));
        }

        let proposer = validators
            .proposer()
            .ok_or(ValidationError::EmptyValidatorSet)?;
        let key = proposer.verifying_key()?;
        let signature = Signature::from_slice(&self.commit.signatures[0])
            .map_err(|_| ValidationError::SignatureVerificationFailed)?;
        key.verify(&self.header.canonical_bytes(), &signature)
            .map_err(|_| ValidationError::SignatureVerificationFailed)
    }

    /// Verifies `untrusted` against this header, which is trusted.
    pub fn verify(&self, untrusted: &SignedHeader) -> Result<(), VerifyError> {
        self.verify_at(untrusted, SystemTime::now())
    }

    pub fn verify_at(&self, untrusted: &SignedHeader, now: SystemTime) -> Result<(), VerifyError> {
        let height = untrusted.height();

        untrusted
            .validate_basic()
            .map_err(|err| VerifyError::new(height, err))?;
        self.header
            .verify_continuity(&untrusted.header, now)
            .map_err(|reason| VerifyError::new(height, reason))?;

        // Known gap: a header more than one above the trusted one is accepted
        // without hash linkage. Nothing here ties it to our chain; the store
        // only appends adjacent headers, so linkage is checked again as the
        // skipped range is filled in.
        if height > self.height() + 1 {
            return Ok(());
        }

        let expected = self.hash();
        if !expected.matches(&untrusted.header.last_header_hash) {
            return Err(VerifyError::new(
                height,
                VerifyReason::LastHeaderHashMismatch {
                    expected: expected.to_string(),
                    actual: hex::encode(&untrusted.header.last_header_hash),
                },
            ));
        }

        let expected = self
            .commit
            .commit_hash(&self.header, &untrusted.header.proposer_address);
        if !expected.matches(&untrusted.header.last_commit_hash) {
            return Err(VerifyError::new(
                height,
                VerifyReason::LastCommitHashMismatch {
                    expected: expected.to_string(),
                    actual: hex::encode(&untrusted.header.last_commit_hash),
                },
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{TestProposer, TEST_CHAIN_ID};
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn pair() -> (TestProposer, SignedHeader, SignedHeader) {
        let proposer = TestProposer::new(1);
        let trusted = proposer.first_header(TEST_CHAIN_ID, 1);
        let candidate = proposer.next_header(&trusted);
        (proposer, trusted, candidate)
    }

    fn reason(result: Result<(), VerifyError>) -> VerifyReason {
        result.unwrap_err().reason
    }

    #[test]
    fn accepts_adjacent_linked_header() {
        let (_, trusted, candidate) = pair();
        assert_eq!(candidate.validate_basic(), Ok(()));
        assert_eq!(trusted.verify(&candidate), Ok(()));
    }

    #[test]
    fn decodes_what_it_encodes() {
        let (_, _, candidate) = pair();
        assert_eq!(SignedHeader::from_bytes(&candidate.to_bytes()).unwrap(), candidate);
    }

    #[test]
    fn rejects_broken_last_header_hash() {
        let (proposer, trusted, mut candidate) = pair();
        candidate.header.last_header_hash = vec![0xaa; 32];
        let candidate = proposer.resign(&candidate);

        assert!(matches!(
            reason(trusted.verify(&candidate)),
            VerifyReason::LastHeaderHashMismatch { .. }
        ));
    }

    #[test]
    fn rejects_broken_last_commit_hash() {
        let (proposer, trusted, mut candidate) = pair();
        candidate.header.last_commit_hash = vec![0xbb; 32];
        let candidate = proposer.resign(&candidate);

        assert!(matches!(
            reason(trusted.verify(&candidate)),
            VerifyReason::LastCommitHashMismatch { .. }
        ));
    }

    #[rstest]
    #[case::same_height(0)]
    #[case::lower_height(1)]
    fn rejects_height_at_or_below_trusted(#[case] below: u64) {
        let proposer = TestProposer::new(1);
        let chain = proposer.chain(TEST_CHAIN_ID, 1, 3);
        let trusted = &chain[2];
        let candidate = &chain[2 - below as usize];

        let err = trusted.verify(candidate).unwrap_err();
        assert_eq!(
            err.reason,
            VerifyReason::HeightNotIncreasing {
                trusted: 3,
                untrusted: 3 - below
            }
        );
        assert_eq!(err.kind(), "height");
    }

    #[test]
    fn skips_linkage_for_non_adjacent_header() {
        let proposer = TestProposer::new(1);
        let chain = proposer.chain(TEST_CHAIN_ID, 1, 6);
        let mut far = chain[5].clone();
        far.header.last_header_hash = vec![0xcc; 32];
        far.header.last_commit_hash = vec![0xdd; 32];
        let far = proposer.resign(&far);

        assert_eq!(chain[0].verify(&far), Ok(()));
        assert!(chain[4].verify(&far).is_err());
    }

    #[test]
    fn non_adjacent_header_still_needs_basic_validity() {
        let proposer = TestProposer::new(1);
        let chain = proposer.chain(TEST_CHAIN_ID, 1, 4);
        let mut far = chain[3].clone();
        far.header.app_hash = vec![1; 32];

        assert_eq!(
            reason(chain[0].verify(&far)),
            VerifyReason::ValidateBasic(ValidationError::SignatureVerificationFailed)
        );
    }

    #[test]
    fn rejects_signature_from_another_key() {
        let (_, trusted, candidate) = pair();
        let forged = SignedHeader::sign(
            candidate.header.clone(),
            TestProposer::new(2).key(),
            candidate.validators.clone(),
        );

        assert_eq!(
            reason(trusted.verify(&forged)),
            VerifyReason::ValidateBasic(ValidationError::SignatureVerificationFailed)
        );
    }

    #[test]
    fn requires_exactly_one_signature() {
        let (_, _, mut candidate) = pair();
        let signature = candidate.commit.signatures[0].clone();
        candidate.commit.signatures.push(signature);
        assert_eq!(
            candidate.validate_basic(),
            Err(ValidationError::WrongSignatureCount(2))
        );

        candidate.commit.signatures.clear();
        assert_eq!(
            candidate.validate_basic(),
            Err(ValidationError::WrongSignatureCount(0))
        );
    }

    #[test]
    fn rejects_validator_set_not_matching_recorded_hash() {
        let (_, _, mut candidate) = pair();
        candidate.validators = Some(TestProposer::new(3).validators().clone());
        assert_eq!(
            candidate.validate_basic(),
            Err(ValidationError::AggregatorSetHashMismatch)
        );
    }

    #[test]
    fn rejects_missing_proposer_address() {
        let (proposer, trusted, mut candidate) = pair();
        candidate.header.proposer_address.clear();
        let candidate = proposer.resign(&candidate);

        assert_eq!(
            reason(trusted.verify(&candidate)),
            VerifyReason::ValidateBasic(ValidationError::NoProposerAddress)
        );
    }

    #[test]
    fn based_rollup_skips_signature_checks_but_not_linkage() {
        let (_, trusted, candidate) = pair();
        let mut based = candidate.clone();
        based.validators = None;
        based.commit.signatures.clear();
        assert_eq!(trusted.verify(&based), Ok(()));

        based.header.last_header_hash = vec![0xee; 32];
        assert!(matches!(
            reason(trusted.verify(&based)),
            VerifyReason::LastHeaderHashMismatch { .. }
        ));
    }
}
