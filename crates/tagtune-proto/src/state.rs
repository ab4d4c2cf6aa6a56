use crate::protocol::DaemonState;
use tokio::sync::RwLock;

/// Shared, read-mostly snapshot of the daemon state.  Only the core writes;
/// socket clients read.
#[derive(Default)]
pub struct StateManager {
    state: RwLock<DaemonState>,
}

impl StateManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get_state(&self) -> DaemonState {
        self.state.read().await.clone()
    }

    /// Replace the snapshot, bumping `rev`.  Returns the new revision.
    pub async fn publish(&self, mut next: DaemonState) -> u64 {
        let mut state = self.state.write().await;
        next.rev = state.rev + 1;
        *state = next;
        state.rev
    }
}
