use crate::application::sync_state_service::NowProvider;
use crate::domain::api::ConnectionActionResponse;
use crate::domain::liveness::{self, HeartbeatOutcome, LivenessClock};
use crate::domain::models::{
    ConnectionAction, ConnectionHistory, ConnectionSnapshot, ConnectionState, IdeKind,
};
use crate::infrastructure::connection_repository::ConnectionRepository;
use crate::infrastructure::error::InfraError;
use chrono::Utc;
use chrono_tz::Tz;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const DISCONNECTED_BY_USER_REASON: &str = "disconnected by user";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionOutcome {
    Applied {
        snapshot: ConnectionSnapshot,
        /// Final session length, reported by disconnect only.
        session_duration: Option<u64>,
    },
    Ignored {
        reason: String,
    },
}

impl From<ConnectionOutcome> for ConnectionActionResponse {
    fn from(outcome: ConnectionOutcome) -> Self {
        match outcome {
            ConnectionOutcome::Applied {
                snapshot,
                session_duration,
            } => Self {
                success: true,
                state: Some(snapshot.state),
                history: Some(snapshot.history),
                session_duration,
                ..Self::default()
            },
            ConnectionOutcome::Ignored { reason } => Self {
                success: false,
                ignored: true,
                reason: Some(reason),
                ..Self::default()
            },
        }
    }
}

/// Connect/heartbeat/disconnect over the live connection record and its history. Staleness is
/// only detected when the record is read; nothing sweeps in the background.
pub struct ConnectionService {
    repository: ConnectionRepository,
    timezone: Tz,
    now_provider: NowProvider,
}

impl ConnectionService {
    pub fn new(repository: ConnectionRepository, timezone: Tz) -> Self {
        Self {
            repository,
            timezone,
            now_provider: Arc::new(Utc::now),
        }
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    fn clock(&self) -> LivenessClock {
        LivenessClock::new((self.now_provider)().timestamp_millis(), self.timezone)
    }

    async fn load_snapshot(&self) -> ConnectionSnapshot {
        let state = match self.repository.load_state().await {
            Ok(state) => state.unwrap_or_default(),
            Err(error) => {
                warn!(event = "connection_state_read_failed", error = %error);
                ConnectionState::default()
            }
        };
        let history = match self.repository.load_history().await {
            Ok(history) => history.unwrap_or_default(),
            Err(error) => {
                warn!(event = "connection_history_read_failed", error = %error);
                ConnectionHistory::default()
            }
        };
        ConnectionSnapshot { state, history }
    }

    /// Read side of an action. An unreadable store aborts the action so defaults are never
    /// written over the real records; only a record that no longer decodes is replaced.
    async fn load_for_write(&self) -> Result<ConnectionSnapshot, InfraError> {
        let state = match self.repository.load_state().await {
            Ok(state) => state,
            Err(error) if error.is_corrupt_record() => {
                warn!(event = "connection_state_corrupt", error = %error);
                None
            }
            Err(error) => return Err(error),
        };
        let history = match self.repository.load_history().await {
            Ok(history) => history,
            Err(error) if error.is_corrupt_record() => {
                warn!(event = "connection_history_corrupt", error = %error);
                None
            }
            Err(error) => return Err(error),
        };
        Ok(ConnectionSnapshot {
            state: state.unwrap_or_default(),
            history: history.unwrap_or_default(),
        })
    }

    pub async fn snapshot(&self) -> ConnectionSnapshot {
        let clock = self.clock();
        let mut snapshot = self.load_snapshot().await;

        if liveness::expire_if_stale(&mut snapshot.state, clock.now_ms) {
            info!(
                event = "ide_connection_stale",
                ide = snapshot.state.connected_ide.map(IdeKind::as_str).unwrap_or("none"),
                last_heartbeat = snapshot.state.last_heartbeat.unwrap_or_default()
            );
            if let Err(error) = self.repository.save_state(&snapshot.state).await {
                warn!(event = "connection_state_persist_failed", error = %error);
            }
        }
        liveness::refresh_rollups(&mut snapshot.history, clock.today);
        snapshot
    }

    pub async fn apply(
        &self,
        action: ConnectionAction,
        ide: Option<IdeKind>,
    ) -> Result<ConnectionOutcome, InfraError> {
        let mut snapshot = self.load_for_write().await?;
        let clock = self.clock();
        let ConnectionSnapshot { state, history } = &mut snapshot;

        let session_duration = match action {
            ConnectionAction::Connect => {
                let ide = ide.unwrap_or(IdeKind::Unknown);
                liveness::connect(state, history, ide, clock);
                info!(
                    event = "ide_connected",
                    ide = ide.as_str(),
                    sessions = history.sessions_count
                );
                None
            }
            ConnectionAction::Heartbeat => match liveness::heartbeat(state, history, ide, clock) {
                HeartbeatOutcome::Ignored => {
                    debug!(event = "heartbeat_ignored", reason = DISCONNECTED_BY_USER_REASON);
                    return Ok(ConnectionOutcome::Ignored {
                        reason: DISCONNECTED_BY_USER_REASON.to_string(),
                    });
                }
                HeartbeatOutcome::Reconnected => {
                    info!(
                        event = "ide_reconnected",
                        ide = state.connected_ide.map(IdeKind::as_str).unwrap_or("unknown")
                    );
                    None
                }
                HeartbeatOutcome::Extended { credited_seconds } => {
                    debug!(
                        event = "heartbeat",
                        credited_seconds,
                        session_seconds = state.current_session_duration
                    );
                    None
                }
            },
            ConnectionAction::Disconnect => {
                let duration = liveness::disconnect(state, clock);
                liveness::refresh_rollups(history, clock.today);
                info!(event = "ide_disconnected", session_seconds = duration);
                Some(duration)
            }
        };

        self.repository.save(&snapshot).await?;
        Ok(ConnectionOutcome::Applied {
            snapshot,
            session_duration,
        })
    }

    pub async fn reset(&self) -> Result<ConnectionSnapshot, InfraError> {
        let snapshot = ConnectionSnapshot::default();
        self.repository.save(&snapshot).await?;
        info!(event = "ide_connection_reset");
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::test_support::{ManualClock, OutageStore, memory_store_handle};
    use crate::domain::liveness::day_key;
    use crate::infrastructure::kv_store::{
        CONNECTION_HISTORY_KEY, CONNECTION_STATE_KEY, KeyValueStore, StoreHandle,
    };
    use serde_json::json;

    const T: i64 = 1_760_000_000_000;

    fn service(clock: &ManualClock) -> (Arc<dyn KeyValueStore>, ConnectionService) {
        let (store, handle) = memory_store_handle();
        let service = ConnectionService::new(ConnectionRepository::new(handle), chrono_tz::UTC)
            .with_now_provider(clock.provider());
        (store, service)
    }

    fn outage_service(clock: &ManualClock) -> (Arc<OutageStore>, ConnectionService) {
        let store = Arc::new(OutageStore::default());
        let handle = Arc::new(StoreHandle::with_store(store.clone()));
        let service = ConnectionService::new(ConnectionRepository::new(handle), chrono_tz::UTC)
            .with_now_provider(clock.provider());
        (store, service)
    }

    fn applied(outcome: ConnectionOutcome) -> (ConnectionSnapshot, Option<u64>) {
        match outcome {
            ConnectionOutcome::Applied {
                snapshot,
                session_duration,
            } => (snapshot, session_duration),
            other => panic!("expected applied outcome, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn connect_then_heartbeat_scenario() {
        let clock = ManualClock::new(T);
        let (_, service) = service(&clock);

        let (connected, _) = applied(
            service
                .apply(ConnectionAction::Connect, Some(IdeKind::Cursor))
                .await
                .expect("connect"),
        );
        assert!(connected.state.is_connected);
        assert_eq!(connected.state.connected_ide, Some(IdeKind::Cursor));
        assert_eq!(connected.state.session_start_time, Some(T));
        let today_before = connected.history.today_connection_time;

        clock.advance(10_000);
        let (beat, _) = applied(
            service
                .apply(ConnectionAction::Heartbeat, None)
                .await
                .expect("heartbeat"),
        );
        assert_eq!(beat.state.current_session_duration, 10);
        assert_eq!(beat.history.today_connection_time, today_before + 10);
    }

    #[tokio::test]
    async fn stale_connection_is_expired_durably_on_read() {
        let clock = ManualClock::new(T);
        let (_, service) = service(&clock);
        service
            .apply(ConnectionAction::Connect, Some(IdeKind::Vscode))
            .await
            .expect("connect");

        clock.advance(31_000);
        assert!(!service.snapshot().await.state.is_connected);
        clock.set(T);
        assert!(!service.snapshot().await.state.is_connected);
    }

    #[tokio::test]
    async fn heartbeat_after_disconnect_is_ignored() {
        let clock = ManualClock::new(T);
        let (_, service) = service(&clock);
        service
            .apply(ConnectionAction::Connect, Some(IdeKind::Cursor))
            .await
            .expect("connect");
        clock.advance(42_500);
        let (disconnected, duration) = applied(
            service
                .apply(ConnectionAction::Disconnect, Some(IdeKind::Cursor))
                .await
                .expect("disconnect"),
        );
        assert_eq!(duration, Some(42));
        assert!(disconnected.state.disconnected_by_user);

        clock.advance(1_000);
        let outcome = service
            .apply(ConnectionAction::Heartbeat, Some(IdeKind::Cursor))
            .await
            .expect("heartbeat");
        assert_eq!(
            outcome,
            ConnectionOutcome::Ignored {
                reason: DISCONNECTED_BY_USER_REASON.to_string()
            }
        );
        assert!(!service.snapshot().await.state.is_connected);

        let (reconnected, _) = applied(
            service
                .apply(ConnectionAction::Connect, Some(IdeKind::Cursor))
                .await
                .expect("reconnect"),
        );
        assert!(reconnected.state.is_connected);
        assert_eq!(reconnected.history.sessions_count, 2);
    }

    #[tokio::test]
    async fn first_heartbeat_opens_a_session() {
        let clock = ManualClock::new(T);
        let (_, service) = service(&clock);
        let (snapshot, _) = applied(
            service
                .apply(ConnectionAction::Heartbeat, Some(IdeKind::Intellij))
                .await
                .expect("heartbeat"),
        );
        assert!(snapshot.state.is_connected);
        assert_eq!(snapshot.state.connected_ide, Some(IdeKind::Intellij));
        assert_eq!(snapshot.history.sessions_count, 1);
    }

    #[tokio::test]
    async fn connect_without_ide_records_unknown() {
        let clock = ManualClock::new(T);
        let (_, service) = service(&clock);
        let (snapshot, _) = applied(
            service
                .apply(ConnectionAction::Connect, None)
                .await
                .expect("connect"),
        );
        assert_eq!(snapshot.state.connected_ide, Some(IdeKind::Unknown));
    }

    #[tokio::test]
    async fn read_recomputes_week_rollup() {
        let clock = ManualClock::new(T);
        let (store, service) = service(&clock);
        let today = LivenessClock::new(T, chrono_tz::UTC).today;
        let mut daily = serde_json::Map::new();
        daily.insert(day_key(today), json!(100));
        store
            .set(
                CONNECTION_HISTORY_KEY,
                &json!({ "dailyHistory": daily, "weekConnectionTime": 9999 }),
                None,
            )
            .await
            .expect("seed");

        let snapshot = service.snapshot().await;
        assert_eq!(snapshot.history.week_connection_time, 100);
        assert_eq!(snapshot.history.today_connection_time, 100);
    }

    #[tokio::test]
    async fn reset_clears_state_and_history() {
        let clock = ManualClock::new(T);
        let (store, service) = service(&clock);
        service
            .apply(ConnectionAction::Connect, Some(IdeKind::Cursor))
            .await
            .expect("connect");
        let snapshot = service.reset().await.expect("reset");
        assert_eq!(snapshot, ConnectionSnapshot::default());
        assert_eq!(
            store.get(CONNECTION_STATE_KEY).await.expect("get"),
            Some(serde_json::to_value(ConnectionState::default()).expect("serialize"))
        );
        assert_eq!(service.snapshot().await.history.sessions_count, 0);
    }

    #[test]
    fn ignored_outcome_maps_to_ignored_body() {
        let body = ConnectionActionResponse::from(ConnectionOutcome::Ignored {
            reason: DISCONNECTED_BY_USER_REASON.to_string(),
        });
        assert!(!body.success);
        assert!(body.ignored);
        assert!(body.state.is_none());
    }

    #[tokio::test]
    async fn store_outage_during_heartbeat_keeps_history() {
        let clock = ManualClock::new(T);
        let (store, service) = outage_service(&clock);
        service
            .apply(ConnectionAction::Connect, Some(IdeKind::Cursor))
            .await
            .expect("connect");
        clock.advance(600_000);
        service
            .apply(ConnectionAction::Heartbeat, Some(IdeKind::Cursor))
            .await
            .expect("heartbeat");

        store.fail_reads(true);
        clock.advance(1_000);
        let result = service
            .apply(ConnectionAction::Heartbeat, Some(IdeKind::Cursor))
            .await;
        assert!(matches!(result, Err(InfraError::Store(_))));

        store.fail_reads(false);
        let snapshot = service.snapshot().await;
        assert!(snapshot.state.is_connected);
        assert_eq!(snapshot.history.total_connection_time, 600);
        assert_eq!(snapshot.history.sessions_count, 1);
    }

    #[tokio::test]
    async fn store_outage_after_disconnect_keeps_suppression() {
        let clock = ManualClock::new(T);
        let (store, service) = outage_service(&clock);
        service
            .apply(ConnectionAction::Connect, Some(IdeKind::Cursor))
            .await
            .expect("connect");
        service
            .apply(ConnectionAction::Disconnect, Some(IdeKind::Cursor))
            .await
            .expect("disconnect");

        store.fail_reads(true);
        clock.advance(1_000);
        assert!(
            service
                .apply(ConnectionAction::Heartbeat, Some(IdeKind::Cursor))
                .await
                .is_err()
        );

        store.fail_reads(false);
        let outcome = service
            .apply(ConnectionAction::Heartbeat, Some(IdeKind::Cursor))
            .await
            .expect("heartbeat");
        assert!(matches!(outcome, ConnectionOutcome::Ignored { .. }));
        assert!(!service.snapshot().await.state.is_connected);
    }

    #[tokio::test]
    async fn corrupt_history_is_replaced_on_write() {
        let clock = ManualClock::new(T);
        let (store, service) = service(&clock);
        store
            .set(CONNECTION_HISTORY_KEY, &json!("not a history"), None)
            .await
            .expect("seed");

        let (snapshot, _) = applied(
            service
                .apply(ConnectionAction::Connect, Some(IdeKind::Windsurf))
                .await
                .expect("connect"),
        );
        assert_eq!(snapshot.history.sessions_count, 1);
    }
}
