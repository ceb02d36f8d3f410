use crate::domain::models::{
    ConnectionSnapshot, IdeKind, Mood, ScrollTarget, SyncState, SyncStatePatch,
};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::sync_api_client::SyncApi;
use std::sync::Arc;
use tracing::{debug, warn};

/// Edge-triggered callbacks fired by the dashboard pollers. Every method defaults to a no-op.
pub trait SyncListener {
    fn on_state_applied(&mut self, _state: &SyncState) {}

    fn on_mood_changed(&mut self, _mood: Mood) {}

    fn on_timer_started(&mut self, _state: &SyncState) {}

    fn on_timer_stopped(&mut self, _state: &SyncState) {}

    fn on_scroll_requested(&mut self, _target: ScrollTarget) {}

    fn on_connectivity_changed(&mut self, _online: bool) {}

    fn on_connection_changed(&mut self, _snapshot: &ConnectionSnapshot) {}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Applied(SyncState),
    /// The record was not newer than the last applied one.
    Discarded { last_updated: i64 },
    Failed,
}

pub struct DashboardSyncClient<A: SyncApi> {
    api: Arc<A>,
    current: Option<SyncState>,
    last_applied: Option<i64>,
    previous_mood: Option<Mood>,
    previous_running: bool,
    online: bool,
}

impl<A: SyncApi> DashboardSyncClient<A> {
    pub fn new(api: Arc<A>) -> Self {
        Self {
            api,
            current: None,
            last_applied: None,
            previous_mood: None,
            previous_running: false,
            online: false,
        }
    }

    pub fn current(&self) -> Option<&SyncState> {
        self.current.as_ref()
    }

    pub fn is_online(&self) -> bool {
        self.online
    }

    fn set_online(&mut self, online: bool, listener: &mut dyn SyncListener) {
        if self.online != online {
            self.online = online;
            listener.on_connectivity_changed(online);
        }
    }

    pub async fn poll_once(&mut self, listener: &mut dyn SyncListener) -> PollOutcome {
        match self.api.fetch_state().await {
            Ok(state) => {
                self.set_online(true, listener);
                self.apply(state, listener).await
            }
            Err(error) => {
                debug!(event = "sync_poll_failed", error = %error);
                self.set_online(false, listener);
                PollOutcome::Failed
            }
        }
    }

    /// Applies a fetched record if it is strictly newer than the last applied one and fires the
    /// callbacks for whatever changed.
    pub async fn apply(
        &mut self,
        state: SyncState,
        listener: &mut dyn SyncListener,
    ) -> PollOutcome {
        if let Some(last_applied) = self.last_applied {
            if state.last_updated <= last_applied {
                return PollOutcome::Discarded {
                    last_updated: state.last_updated,
                };
            }
        }

        self.last_applied = Some(state.last_updated);
        self.current = Some(state.clone());
        listener.on_state_applied(&state);

        if self.previous_mood != Some(state.current_mood) {
            listener.on_mood_changed(state.current_mood);
        }
        if state.is_running != self.previous_running {
            if state.is_running {
                listener.on_timer_started(&state);
            } else {
                listener.on_timer_stopped(&state);
            }
        }
        self.previous_mood = Some(state.current_mood);
        self.previous_running = state.is_running;

        if let Some(target) = state.scroll_to {
            listener.on_scroll_requested(target);
            if let Err(error) = self.update_state(&SyncStatePatch::clear_scroll()).await {
                warn!(event = "scroll_clear_failed", target = target.as_str(), error = %error);
            }
        }

        PollOutcome::Applied(state)
    }

    /// Posts a partial update and adopts the server's merged record as the new baseline without
    /// firing callbacks.
    pub async fn update_state(&mut self, patch: &SyncStatePatch) -> Result<SyncState, InfraError> {
        let merged = self.api.update_state(patch).await?;
        let newer = self
            .last_applied
            .map(|last_applied| merged.last_updated > last_applied)
            .unwrap_or(true);
        if newer {
            self.last_applied = Some(merged.last_updated);
            self.previous_mood = Some(merged.current_mood);
            self.previous_running = merged.is_running;
            self.current = Some(merged.clone());
        }
        Ok(merged)
    }
}

/// Watches the liveness record and reports when the connected editor appears, changes or goes
/// away.
pub struct ConnectionMonitor<A: SyncApi> {
    api: Arc<A>,
    last_seen: Option<(bool, Option<IdeKind>)>,
    snapshot: Option<ConnectionSnapshot>,
}

impl<A: SyncApi> ConnectionMonitor<A> {
    pub fn new(api: Arc<A>) -> Self {
        Self {
            api,
            last_seen: None,
            snapshot: None,
        }
    }

    pub fn snapshot(&self) -> Option<&ConnectionSnapshot> {
        self.snapshot.as_ref()
    }

    pub async fn poll_once(
        &mut self,
        listener: &mut dyn SyncListener,
    ) -> Option<ConnectionSnapshot> {
        let snapshot = match self.api.fetch_connection().await {
            Ok(snapshot) => snapshot,
            Err(error) => {
                debug!(event = "connection_poll_failed", error = %error);
                return None;
            }
        };

        let seen = (snapshot.state.is_connected, snapshot.state.connected_ide);
        if self.last_seen != Some(seen) {
            self.last_seen = Some(seen);
            listener.on_connection_changed(&snapshot);
        }
        self.snapshot = Some(snapshot.clone());
        Some(snapshot)
    }
}
