/// Catch-up syncer state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncState {
    /// Not started, or the last catch-up stopped short of its target.
    #[default]
    Idle,

    /// Fetching and appending headers to reach a newer head.
    Syncing,

    /// The store head matches the highest header seen from the network.
    Synced,
}

impl SyncState {
    pub fn can_transition_to(&self, target: SyncState) -> bool {
        match self {
            SyncState::Idle => matches!(target, SyncState::Syncing | SyncState::Synced),
            SyncState::Syncing => matches!(target, SyncState::Synced | SyncState::Idle),
            SyncState::Synced => matches!(target, SyncState::Syncing | SyncState::Idle),
        }
    }
}

/// Lifecycle of the header sync service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ServiceState {
    #[default]
    Created,
    Starting,
    /// The store was empty at startup and is waiting for its first header.
    Bootstrapping,
    Running,
    Failed,
    Stopped,
}

impl ServiceState {
    pub fn can_transition_to(&self, target: ServiceState) -> bool {
        match self {
            ServiceState::Created => matches!(target, ServiceState::Starting | ServiceState::Stopped),
            ServiceState::Starting => matches!(
                target,
                ServiceState::Bootstrapping | ServiceState::Running | ServiceState::Failed | ServiceState::Stopped
            ),
            ServiceState::Bootstrapping => matches!(
                target,
                ServiceState::Running | ServiceState::Failed | ServiceState::Stopped
            ),
            ServiceState::Running | ServiceState::Failed => matches!(target, ServiceState::Stopped),
            ServiceState::Stopped => false,
        }
    }
}
