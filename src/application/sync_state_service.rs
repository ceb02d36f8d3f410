use crate::domain::models::{SyncState, SyncStatePatch};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::sync_state_repository::SyncStateRepository;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, warn};

pub type NowProvider = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Write stamps are strictly increasing even when the wall clock stalls or steps back.
pub fn next_stamp(now_ms: i64, previous_ms: i64) -> i64 {
    now_ms.max(previous_ms.saturating_add(1))
}

/// Read, merge-write and reset over the shared timer/mood record. Every write is a
/// read-modify-write without isolation: two writers racing on the record can lose each other's
/// unrelated fields.
pub struct SyncStateService {
    repository: SyncStateRepository,
    now_provider: NowProvider,
}

impl SyncStateService {
    pub fn new(repository: SyncStateRepository) -> Self {
        Self {
            repository,
            now_provider: Arc::new(Utc::now),
        }
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    fn now_ms(&self) -> i64 {
        (self.now_provider)().timestamp_millis()
    }

    async fn load_current(&self) -> Option<SyncState> {
        match self.repository.load().await {
            Ok(state) => state,
            Err(error) => {
                warn!(event = "sync_state_read_failed", error = %error);
                None
            }
        }
    }

    /// Never fails: an absent record is created with defaults (persisted best effort) and an
    /// unreadable one is replaced by defaults in the response.
    pub async fn get(&self) -> SyncState {
        match self.repository.load().await {
            Ok(Some(state)) => state,
            Ok(None) => {
                let state = SyncState::defaults(self.now_ms());
                if let Err(error) = self.repository.save(&state).await {
                    warn!(event = "sync_state_default_persist_failed", error = %error);
                }
                state
            }
            Err(error) => {
                warn!(event = "sync_state_read_failed", error = %error);
                SyncState::defaults(self.now_ms())
            }
        }
    }

    pub async fn merge(&self, patch: &SyncStatePatch) -> Result<SyncState, InfraError> {
        patch.validate().map_err(InfraError::InvalidRequest)?;

        // Only an absent or undecodable record is replaced. Other read failures abort the merge.
        let mut state = match self.repository.load().await {
            Ok(state) => state,
            Err(error) if error.is_corrupt_record() => {
                warn!(event = "sync_state_corrupt", error = %error);
                None
            }
            Err(error) => return Err(error),
        }
        .unwrap_or_else(|| SyncState::defaults(0));
        patch.apply_to(&mut state);

        let stamp = next_stamp(self.now_ms(), state.last_updated);
        state.last_updated = stamp;
        if patch.is_agent_originated() {
            state.last_mcp_update = stamp;
        }

        self.repository.save(&state).await?;
        debug!(
            event = "sync_state_merged",
            source = patch.source.as_deref().unwrap_or("dashboard"),
            last_updated = stamp,
            is_running = state.is_running,
            mode = %state.mode
        );
        Ok(state)
    }

    pub async fn reset(&self) -> Result<SyncState, InfraError> {
        let previous = self
            .load_current()
            .await
            .map(|state| state.last_updated)
            .unwrap_or(0);
        let state = SyncState::defaults(next_stamp(self.now_ms(), previous));
        self.repository.save(&state).await?;
        debug!(event = "sync_state_reset", last_updated = state.last_updated);
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::test_support::{ManualClock, OutageStore, memory_store_handle};
    use crate::domain::models::{Mood, ScrollTarget, TimerMode};
    use crate::infrastructure::kv_store::{KeyValueStore, SYNC_STATE_KEY, StoreHandle};
    use proptest::prelude::*;
    use serde_json::json;

    const T: i64 = 1_760_000_000_000;

    fn service(clock: &ManualClock) -> (Arc<dyn KeyValueStore>, SyncStateService) {
        let (store, handle) = memory_store_handle();
        let service = SyncStateService::new(SyncStateRepository::new(handle))
            .with_now_provider(clock.provider());
        (store, service)
    }

    #[tokio::test]
    async fn store_outage_rejects_merge_without_overwriting() {
        let clock = ManualClock::new(T);
        let store = Arc::new(OutageStore::default());
        let handle = Arc::new(StoreHandle::with_store(store.clone()));
        let service = SyncStateService::new(SyncStateRepository::new(handle))
            .with_now_provider(clock.provider());
        let before = service
            .merge(&SyncStatePatch {
                current_mood: Some(Mood::Calm),
                sessions_completed: Some(3),
                ..SyncStatePatch::default()
            })
            .await
            .expect("seed merge");

        store.fail_reads(true);
        clock.advance(100);
        let result = service
            .merge(&SyncStatePatch {
                current_mood: Some(Mood::Energetic),
                ..SyncStatePatch::default()
            })
            .await;
        assert!(matches!(result, Err(InfraError::Store(_))));
        assert_eq!(service.get().await, SyncState::defaults(T + 100));

        store.fail_reads(false);
        assert_eq!(service.get().await, before);
    }

    #[tokio::test]
    async fn corrupt_record_is_replaced_by_merge() {
        let clock = ManualClock::new(T);
        let (store, service) = service(&clock);
        store
            .set(SYNC_STATE_KEY, &json!({ "mode": "siesta" }), None)
            .await
            .expect("seed");

        let merged = service
            .merge(&SyncStatePatch {
                current_mood: Some(Mood::Creative),
                ..SyncStatePatch::default()
            })
            .await
            .expect("merge");
        assert_eq!(merged.current_mood, Mood::Creative);
        assert_eq!(service.get().await, merged);
    }

    #[tokio::test]
    async fn get_creates_and_persists_default_record() {
        let clock = ManualClock::new(T);
        let (store, service) = service(&clock);

        let first = service.get().await;
        assert_eq!(first, SyncState::defaults(T));
        assert!(store.get(SYNC_STATE_KEY).await.expect("get").is_some());

        clock.advance(5_000);
        assert_eq!(service.get().await.last_updated, T);
    }

    #[tokio::test]
    async fn malformed_record_falls_back_to_defaults() {
        let clock = ManualClock::new(T);
        let (store, service) = service(&clock);
        store
            .set(SYNC_STATE_KEY, &json!({ "mode": "siesta" }), None)
            .await
            .expect("seed");

        assert_eq!(service.get().await, SyncState::defaults(T));
    }

    #[tokio::test]
    async fn empty_merge_only_bumps_last_updated() {
        let clock = ManualClock::new(T);
        let (_, service) = service(&clock);
        let before = service
            .merge(&SyncStatePatch {
                current_mood: Some(Mood::Calm),
                ..SyncStatePatch::default()
            })
            .await
            .expect("seed merge");

        clock.advance(250);
        let after = service.merge(&SyncStatePatch::default()).await.expect("merge");

        assert_eq!(after.last_updated, T + 250);
        let mut expected = before;
        expected.last_updated = after.last_updated;
        assert_eq!(after, expected);
    }

    #[tokio::test]
    async fn agent_merge_stamps_last_mcp_update_and_peer_merge_preserves_it() {
        let clock = ManualClock::new(T);
        let (_, service) = service(&clock);

        let agent = service
            .merge(
                &SyncStatePatch {
                    is_running: Some(true),
                    ..SyncStatePatch::default()
                }
                .with_source("mcp"),
            )
            .await
            .expect("agent merge");
        assert_eq!(agent.last_mcp_update, agent.last_updated);
        assert!(agent.is_agent_update());

        clock.advance(10);
        let peer = service
            .merge(&SyncStatePatch {
                mode: Some(TimerMode::ShortBreak),
                ..SyncStatePatch::default()
            })
            .await
            .expect("peer merge");
        assert_eq!(peer.last_mcp_update, agent.last_updated);
        assert!(peer.last_updated > peer.last_mcp_update);
        assert!(!peer.is_agent_update());
        assert!(peer.is_running);
    }

    #[tokio::test]
    async fn stamps_increase_when_the_clock_stalls() {
        let clock = ManualClock::new(T);
        let (_, service) = service(&clock);
        let first = service.merge(&SyncStatePatch::default()).await.expect("first");
        let second = service.merge(&SyncStatePatch::default()).await.expect("second");
        clock.set(T - 60_000);
        let third = service.merge(&SyncStatePatch::default()).await.expect("third");

        assert_eq!(second.last_updated, first.last_updated + 1);
        assert_eq!(third.last_updated, second.last_updated + 1);
    }

    #[tokio::test]
    async fn scroll_request_is_set_and_cleared() {
        let clock = ManualClock::new(T);
        let (_, service) = service(&clock);
        let requested = service
            .merge(&SyncStatePatch {
                scroll_to: Some(Some(ScrollTarget::Music)),
                ..SyncStatePatch::default()
            })
            .await
            .expect("request scroll");
        assert_eq!(requested.scroll_to, Some(ScrollTarget::Music));

        let cleared = service
            .merge(&SyncStatePatch::clear_scroll())
            .await
            .expect("clear scroll");
        assert_eq!(cleared.scroll_to, None);
    }

    #[tokio::test]
    async fn out_of_bounds_merge_is_rejected_without_writing() {
        let clock = ManualClock::new(T);
        let (store, service) = service(&clock);
        let result = service
            .merge(&SyncStatePatch {
                focus_duration: Some(10),
                ..SyncStatePatch::default()
            })
            .await;
        assert!(matches!(result, Err(InfraError::InvalidRequest(_))));
        assert!(store.get(SYNC_STATE_KEY).await.expect("get").is_none());
    }

    #[tokio::test]
    async fn reset_writes_defaults_with_a_fresh_stamp() {
        let clock = ManualClock::new(T);
        let (_, service) = service(&clock);
        service
            .merge(
                &SyncStatePatch {
                    sessions_completed: Some(7),
                    ..SyncStatePatch::default()
                }
                .with_source("mcp"),
            )
            .await
            .expect("merge");

        let reset = service.reset().await.expect("reset");
        assert_eq!(reset, SyncState::defaults(T + 1));
        assert_eq!(service.get().await, reset);
    }

    proptest! {
        #[test]
        fn last_mcp_update_never_exceeds_last_updated(
            writes in proptest::collection::vec((any::<bool>(), 0i64..3), 1..40)
        ) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .build()
                .expect("runtime");
            runtime.block_on(async {
                let clock = ManualClock::new(T);
                let (_, service) = service(&clock);
                let mut previous_stamp = 0;
                for (from_agent, advance) in writes {
                    clock.advance(advance);
                    let patch = if from_agent {
                        SyncStatePatch::default().with_source("mcp")
                    } else {
                        SyncStatePatch::default()
                    };
                    let state = service.merge(&patch).await.expect("merge");
                    assert!(state.last_updated > previous_stamp);
                    assert!(state.last_mcp_update <= state.last_updated);
                    assert_eq!(state.is_agent_update(), from_agent);
                    previous_stamp = state.last_updated;
                }
            });
        }
    }
}
