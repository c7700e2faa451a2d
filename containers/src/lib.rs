pub mod block;
pub mod commit;
pub mod config;
pub mod error;
pub mod header;
pub mod serde_helpers;
pub mod signed_header;
pub mod types;
pub mod validator;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use block::{Block, Data};
pub use commit::Commit;
pub use config::GenesisDoc;
pub use error::{ValidationError, VerifyError, VerifyReason};
pub use header::{Header, MAX_CLOCK_DRIFT};
pub use signed_header::SignedHeader;
pub use types::{Hash, NamespaceId};
pub use validator::{Validator, ValidatorSet};
pub use ed25519_dalek;
pub use prost;
