/// Header sync constants.
use std::time::Duration;

use crate::req_resp::MAX_REQUEST_HEADERS;

/// Most headers the syncer asks a peer for in one range request.
pub const MAX_HEADERS_PER_REQUEST: u64 = MAX_REQUEST_HEADERS;

/// Block time used when none is configured.
pub const DEFAULT_BLOCK_TIME: Duration = Duration::from_secs(1);
