use crate::error::{ValidationError, VerifyReason};
use crate::signed_header::SignedHeader;
use crate::types::{Hash, HASH_LENGTH};
use prost::Message;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// How far into the future an untrusted header's time may be.
pub const MAX_CLOCK_DRIFT: Duration = Duration::from_secs(10);

/// Rollup block header. `time` is unix time in nanoseconds.
#[derive(Clone, PartialEq, Eq, Message)]
pub struct Header {
    #[prost(uint64, tag = "1")]
    pub height: u64,
    #[prost(string, tag = "2")]
    pub chain_id: String,
    #[prost(uint64, tag = "3")]
    pub time: u64,
    #[prost(bytes = "vec", tag = "4")]
    pub last_header_hash: Vec<u8>,
    #[prost(bytes = "vec", tag = "5")]
    pub last_commit_hash: Vec<u8>,
    #[prost(bytes = "vec", tag = "6")]
    pub data_hash: Vec<u8>,
    #[prost(bytes = "vec", tag = "7")]
    pub app_hash: Vec<u8>,
    /// Hash of the validator set that authorized this header.
    #[prost(bytes = "vec", tag = "8")]
    pub aggregators_hash: Vec<u8>,
    #[prost(bytes = "vec", tag = "9")]
    pub proposer_address: Vec<u8>,
}

impl Header {
    /// Header of the block following `parent`, linked to it by hash.
    ///
    /// Time, data hash and aggregators hash are left for the caller to fill in.
    pub fn child_of(parent: &SignedHeader, proposer_address: &[u8]) -> Self {
        Header {
            height: parent.height() + 1,
            chain_id: parent.header.chain_id.clone(),
            time: parent.header.time,
            last_header_hash: parent.hash().to_vec(),
            last_commit_hash: parent
                .commit
                .commit_hash(&parent.header, proposer_address)
                .to_vec(),
            app_hash: parent.header.app_hash.clone(),
            proposer_address: proposer_address.to_vec(),
            ..Default::default()
        }
    }

    /// Canonical byte encoding; this is what gets hashed and signed.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        self.encode_to_vec()
    }

    pub fn hash(&self) -> Hash {
        Hash::digest(&self.canonical_bytes())
    }

    pub fn timestamp(&self) -> SystemTime {
        UNIX_EPOCH + Duration::from_nanos(self.time)
    }

    pub fn validate_basic(&self) -> Result<(), ValidationError> {
        if self.height == 0 {
            return Err(ValidationError::ZeroHeight);
        }
        if self.chain_id.is_empty() {
            return Err(ValidationError::EmptyChainId);
        }
        if self.proposer_address.is_empty() {
            return Err(ValidationError::NoProposerAddress);
        }

        let hashes = [
            ("last_header_hash", &self.last_header_hash),
            ("last_commit_hash", &self.last_commit_hash),
            ("data_hash", &self.data_hash),
            ("app_hash", &self.app_hash),
            ("aggregators_hash", &self.aggregators_hash),
        ];
        for (field, value) in hashes {
            if !value.is_empty() && value.len() != HASH_LENGTH {
                return Err(ValidationError::InvalidHashLength {
                    field,
                    len: value.len(),
                });
            }
        }

        Ok(())
    }

    /// Checks that `untrusted` may follow `self`: a greater height and a time
    /// between ours and `now + MAX_CLOCK_DRIFT`.
    pub fn verify_continuity(&self, untrusted: &Header, now: SystemTime) -> Result<(), VerifyReason> {
        if untrusted.height <= self.height {
            return Err(VerifyReason::HeightNotIncreasing {
                trusted: self.height,
                untrusted: untrusted.height,
            });
        }
        if untrusted.time < self.time {
            return Err(VerifyReason::TimeBeforeTrusted);
        }
        if untrusted.timestamp() > now + MAX_CLOCK_DRIFT {
            return Err(VerifyReason::TimeFromFuture);
        }
        Ok(())
    }
}

pub fn unix_nanos(time: SystemTime) -> u64 {
    let nanos = time
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    u64::try_from(nanos).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn header(height: u64, time: u64) -> Header {
        Header {
            height,
            chain_id: "test-chain".into(),
            time,
            proposer_address: vec![1; 20],
            ..Default::default()
        }
    }

    #[test]
    fn hash_changes_with_any_field() {
        let a = header(1, 100);
        let mut b = a.clone();
        b.app_hash = vec![7; 32];

        assert_eq!(a.hash(), a.clone().hash());
        assert_ne!(a.hash(), b.hash());
    }

    #[rstest]
    #[case::zero_height(header(0, 1), ValidationError::ZeroHeight)]
    #[case::empty_chain(Header { chain_id: String::new(), ..header(1, 1) }, ValidationError::EmptyChainId)]
    #[case::no_proposer(Header { proposer_address: vec![], ..header(1, 1) }, ValidationError::NoProposerAddress)]
    #[case::short_hash(
        Header { data_hash: vec![0; 5], ..header(1, 1) },
        ValidationError::InvalidHashLength { field: "data_hash", len: 5 }
    )]
    fn validate_basic_rejects(#[case] header: Header, #[case] expected: ValidationError) {
        assert_eq!(header.validate_basic(), Err(expected));
    }

    #[test]
    fn continuity_requires_greater_height() {
        let now = UNIX_EPOCH + Duration::from_secs(1_000);
        let trusted = header(5, 1_000);

        assert_eq!(
            trusted.verify_continuity(&header(5, 2_000), now),
            Err(VerifyReason::HeightNotIncreasing { trusted: 5, untrusted: 5 })
        );
        assert_eq!(
            trusted.verify_continuity(&header(4, 2_000), now),
            Err(VerifyReason::HeightNotIncreasing { trusted: 5, untrusted: 4 })
        );
        assert_eq!(trusted.verify_continuity(&header(6, 2_000), now), Ok(()));
    }

    #[test]
    fn continuity_bounds_time() {
        let now = UNIX_EPOCH + Duration::from_secs(100);
        let trusted = header(1, Duration::from_secs(50).as_nanos() as u64);

        let earlier = header(2, Duration::from_secs(49).as_nanos() as u64);
        assert_eq!(
            trusted.verify_continuity(&earlier, now),
            Err(VerifyReason::TimeBeforeTrusted)
        );

        let at_drift_limit = header(2, Duration::from_secs(110).as_nanos() as u64);
        assert_eq!(trusted.verify_continuity(&at_drift_limit, now), Ok(()));

        let too_far = header(2, Duration::from_secs(111).as_nanos() as u64);
        assert_eq!(
            trusted.verify_continuity(&too_far, now),
            Err(VerifyReason::TimeFromFuture)
        );
    }
}
