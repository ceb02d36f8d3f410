use crate::application::dashboard_sync::{
    ConnectionMonitor, DashboardSyncClient, PollOutcome, SyncListener,
};
use crate::application::sync_state_service::NowProvider;
use crate::domain::models::{ConnectionSnapshot, Mood, SyncStatePatch, TimerDurations, TimerMode};
use crate::domain::timer::{PomodoroTimer, TickOutcome};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::sync_api_client::SyncApi;
use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};

pub const COUNTDOWN_INTERVAL: Duration = Duration::from_secs(1);
pub const SYNC_POLL_INTERVAL: Duration = Duration::from_millis(500);
pub const CONNECTION_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// The dashboard side of the sync protocol: a local countdown reconciled against the shared
/// record, plus the liveness monitor, driven from one event loop.
pub struct Dashboard<A: SyncApi, L: SyncListener> {
    sync: DashboardSyncClient<A>,
    monitor: ConnectionMonitor<A>,
    timer: PomodoroTimer,
    listener: L,
    last_local_edit_ms: Option<i64>,
    now_provider: NowProvider,
}

impl<A: SyncApi, L: SyncListener> Dashboard<A, L> {
    pub fn new(api: Arc<A>, listener: L) -> Self {
        Self {
            sync: DashboardSyncClient::new(Arc::clone(&api)),
            monitor: ConnectionMonitor::new(api),
            timer: PomodoroTimer::default(),
            listener,
            last_local_edit_ms: None,
            now_provider: Arc::new(Utc::now),
        }
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    pub fn timer(&self) -> &PomodoroTimer {
        &self.timer
    }

    pub fn listener(&self) -> &L {
        &self.listener
    }

    pub fn listener_mut(&mut self) -> &mut L {
        &mut self.listener
    }

    pub fn sync_client(&self) -> &DashboardSyncClient<A> {
        &self.sync
    }

    fn now_ms(&self) -> i64 {
        (self.now_provider)().timestamp_millis()
    }

    pub async fn poll_sync(&mut self) -> PollOutcome {
        let outcome = self.sync.poll_once(&mut self.listener).await;
        if let PollOutcome::Applied(remote) = &outcome {
            let reconciled = self
                .timer
                .reconcile(remote, self.now_ms(), self.last_local_edit_ms);
            debug!(
                event = "timer_reconciled",
                control_applied = reconciled.control_applied,
                durations_changed = reconciled.durations_changed,
                countdown_reset = reconciled.countdown_reset,
                agent_update = remote.is_agent_update()
            );
        }
        outcome
    }

    pub async fn poll_connection(&mut self) -> Option<ConnectionSnapshot> {
        self.monitor.poll_once(&mut self.listener).await
    }

    pub async fn tick(&mut self) -> TickOutcome {
        let outcome = self.timer.tick();
        if let TickOutcome::Completed(completed) = outcome {
            info!(
                event = "interval_completed",
                finished = %completed.finished,
                next = %completed.next,
                sessions_completed = completed.sessions_completed
            );
            self.push(self.timer.completion_patch()).await;
        }
        outcome
    }

    async fn push(&mut self, patch: SyncStatePatch) {
        if let Err(error) = self.sync.update_state(&patch).await {
            warn!(event = "sync_push_failed", error = %error);
        }
    }

    async fn push_local_edit(&mut self) {
        self.last_local_edit_ms = Some(self.now_ms());
        self.push(self.timer.control_patch()).await;
    }

    pub async fn toggle_timer(&mut self) -> bool {
        let running = self.timer.toggle();
        self.push_local_edit().await;
        running
    }

    pub async fn start_timer(&mut self) {
        self.timer.start();
        self.push_local_edit().await;
    }

    pub async fn pause_timer(&mut self) {
        self.timer.pause();
        self.push_local_edit().await;
    }

    pub async fn reset_timer(&mut self) {
        self.timer.reset();
        self.push_local_edit().await;
    }

    pub async fn switch_mode(&mut self, mode: TimerMode) {
        self.timer.switch_mode(mode);
        self.push_local_edit().await;
    }

    pub async fn set_durations(&mut self, durations: TimerDurations) -> Result<(), InfraError> {
        durations.validate().map_err(InfraError::InvalidRequest)?;
        self.timer.set_durations(durations);
        self.last_local_edit_ms = Some(self.now_ms());
        self.push(self.timer.durations_patch()).await;
        Ok(())
    }

    pub async fn set_mood(&mut self, mood: Mood) {
        self.push(SyncStatePatch {
            current_mood: Some(mood),
            ..SyncStatePatch::default()
        })
        .await;
    }

    /// Runs until `shutdown` resolves.
    pub async fn run<S>(mut self, shutdown: S)
    where
        S: Future<Output = ()>,
    {
        let mut countdown = interval(COUNTDOWN_INTERVAL);
        let mut sync_poll = interval(SYNC_POLL_INTERVAL);
        let mut connection_poll = interval(CONNECTION_POLL_INTERVAL);
        for ticker in [&mut countdown, &mut sync_poll, &mut connection_poll] {
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        }
        tokio::pin!(shutdown);

        info!(event = "dashboard_start");
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = countdown.tick() => {
                    self.tick().await;
                }
                _ = sync_poll.tick() => {
                    self.poll_sync().await;
                }
                _ = connection_poll.tick() => {
                    self.poll_connection().await;
                }
            }
        }
        info!(event = "dashboard_stop");
    }
}
