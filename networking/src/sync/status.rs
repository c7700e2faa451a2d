use tokio::sync::Mutex;

/// Tracks whether the syncer has been started.
///
/// The flag is only reachable through [`SyncerStatus::start_once`], so
/// concurrent callers race on the lock and exactly one of them runs the start.
#[derive(Debug, Default)]
pub struct SyncerStatus {
    started: Mutex<bool>,
}

impl SyncerStatus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `start` unless a previous call already succeeded.
    ///
    /// Returns `Ok(true)` if this call started the syncer and `Ok(false)` if it
    /// was already running. A failed `start` leaves the flag unset.
    pub async fn start_once<F, E>(&self, start: F) -> Result<bool, E>
    where
        F: FnOnce() -> Result<(), E>,
    {
        let mut started = self.started.lock().await;
        if *started {
            return Ok(false);
        }
        start()?;
        *started = true;
        Ok(true)
    }

    pub async fn is_started(&self) -> bool {
        *self.started.lock().await
    }
}
