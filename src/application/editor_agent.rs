use crate::domain::models::{
    AGENT_SOURCE, ConnectionAction, IdeKind, Mood, ScrollTarget, SyncState, SyncStatePatch,
    TimerDurations, TimerMode,
};
use crate::domain::timer::{PomodoroTimer, TickOutcome};
use crate::infrastructure::connected_flag::{ConnectedFlag, FlagState};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::sync_api_client::SyncApi;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentCommand {
    StartTimer { mode: Option<TimerMode> },
    PauseTimer,
    ToggleTimer,
    ResetTimer,
    SwitchMode { mode: TimerMode },
    SetMood { mood: Mood },
    ScrollTo { section: ScrollTarget },
    SetDurations {
        focus: Option<u32>,
        short_break: Option<u32>,
        long_break: Option<u32>,
    },
    GetStatus,
    Connect,
    Disconnect,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AgentStatus {
    pub mode: TimerMode,
    pub is_running: bool,
    pub time_remaining: u32,
    pub total_time: u32,
    pub sessions_completed: u32,
    pub total_focus_time: u64,
    pub focus_duration: u32,
    pub short_break_duration: u32,
    pub long_break_duration: u32,
    pub current_mood: Option<Mood>,
    pub connected: bool,
    pub ide: IdeKind,
    /// False when the last push did not reach the sync service.
    pub synced: bool,
}

/// The editor-side writer. Owns its own timer, tags every write as agent-originated and
/// heartbeats while the host's connected flag is set.
pub struct EditorAgent<A: SyncApi> {
    api: Arc<A>,
    flag: ConnectedFlag,
    ide: IdeKind,
    timer: PomodoroTimer,
    mood: Option<Mood>,
    last_push_stamp: i64,
    synced: bool,
}

impl<A: SyncApi> EditorAgent<A> {
    pub fn new(api: Arc<A>, flag: ConnectedFlag, ide: IdeKind) -> Self {
        Self {
            api,
            flag,
            ide,
            timer: PomodoroTimer::default(),
            mood: None,
            last_push_stamp: 0,
            synced: false,
        }
    }

    pub fn timer(&self) -> &PomodoroTimer {
        &self.timer
    }

    pub fn ide(&self) -> IdeKind {
        self.ide
    }

    pub fn status(&self) -> AgentStatus {
        let durations = self.timer.durations();
        AgentStatus {
            mode: self.timer.mode(),
            is_running: self.timer.is_running(),
            time_remaining: self.timer.time_remaining(),
            total_time: self.timer.total_time(),
            sessions_completed: self.timer.sessions_completed(),
            total_focus_time: self.timer.total_focus_time(),
            focus_duration: durations.focus,
            short_break_duration: durations.short_break,
            long_break_duration: durations.long_break,
            current_mood: self.mood,
            connected: self.flag.is_set(),
            ide: self.ide,
            synced: self.synced,
        }
    }

    fn observe(&mut self, state: &SyncState) {
        self.mood = Some(state.current_mood);
        self.last_push_stamp = self.last_push_stamp.max(state.last_updated);
    }

    /// Seeds the timer from the shared record, then connects unless the user disconnected
    /// explicitly in an earlier run. Failures are logged; the agent keeps running offline.
    pub async fn start(&mut self) {
        match self.api.fetch_state().await {
            Ok(state) => {
                self.timer = PomodoroTimer::from_state(&state);
                self.observe(&state);
                self.synced = true;
            }
            Err(error) => warn!(event = "agent_seed_failed", error = %error),
        }
        match self.flag.state() {
            Ok(FlagState::DisconnectedByUser) => {
                info!(event = "agent_connect_skipped", reason = "disconnected by user");
            }
            Ok(FlagState::Absent | FlagState::Connected) => {
                if let Err(error) = self.connect().await {
                    warn!(event = "agent_connect_failed", error = %error);
                }
            }
            Err(error) => warn!(event = "agent_flag_unreadable", error = %error),
        }
        info!(event = "agent_start", ide = self.ide.as_str());
    }

    pub async fn connect(&mut self) -> Result<(), InfraError> {
        self.flag.set(self.ide)?;
        self.api
            .send_connection_action(ConnectionAction::Connect, Some(self.ide))
            .await?;
        info!(event = "agent_connected", ide = self.ide.as_str());
        Ok(())
    }

    pub async fn disconnect(&mut self) -> Result<Option<u64>, InfraError> {
        self.flag.mark_disconnected()?;
        let response = self
            .api
            .send_connection_action(ConnectionAction::Disconnect, Some(self.ide))
            .await?;
        info!(
            event = "agent_disconnected",
            session_seconds = response.session_duration.unwrap_or_default()
        );
        Ok(response.session_duration)
    }

    async fn push(&mut self, patch: SyncStatePatch) {
        match self.api.update_state(&patch.with_source(AGENT_SOURCE)).await {
            Ok(state) => {
                self.observe(&state);
                self.synced = true;
            }
            Err(error) => {
                self.synced = false;
                warn!(event = "agent_push_failed", error = %error);
            }
        }
    }

    async fn publish(&mut self, patch: SyncStatePatch) {
        self.push(patch).await;
        self.heartbeat().await;
    }

    pub async fn heartbeat(&mut self) {
        if !self.flag.is_set() {
            return;
        }
        match self
            .api
            .send_connection_action(ConnectionAction::Heartbeat, Some(self.ide))
            .await
        {
            Ok(response) if response.ignored => {
                debug!(
                    event = "heartbeat_ignored",
                    reason = response.reason.as_deref().unwrap_or("")
                );
            }
            Ok(_) => {}
            Err(error) => warn!(event = "heartbeat_failed", error = %error),
        }
    }

    /// One agent second: follow dashboard edits made since the last push, advance the countdown,
    /// mirror it while it runs, then heartbeat.
    pub async fn tick(&mut self) -> TickOutcome {
        match self.api.fetch_state().await {
            Ok(remote) => {
                if remote.last_updated > self.last_push_stamp && !remote.is_agent_update() {
                    debug!(
                        event = "agent_adopted_remote",
                        last_updated = remote.last_updated,
                        is_running = remote.is_running
                    );
                    self.timer.adopt_remote(&remote);
                }
                self.observe(&remote);
            }
            Err(error) => debug!(event = "agent_fetch_failed", error = %error),
        }

        let outcome = self.timer.tick();
        match outcome {
            TickOutcome::Idle => {}
            TickOutcome::Counted { .. } => self.push(self.timer.control_patch()).await,
            TickOutcome::Completed(completed) => {
                info!(
                    event = "interval_completed",
                    finished = %completed.finished,
                    next = %completed.next,
                    sessions_completed = completed.sessions_completed
                );
                self.push(self.timer.completion_patch()).await;
            }
        }

        self.heartbeat().await;
        outcome
    }

    pub async fn handle_command(
        &mut self,
        command: AgentCommand,
    ) -> Result<AgentStatus, InfraError> {
        debug!(event = "agent_command", command = ?command);
        match command {
            AgentCommand::StartTimer { mode } => {
                if let Some(mode) = mode {
                    if mode != self.timer.mode() {
                        self.timer.switch_mode(mode);
                    }
                }
                self.timer.start();
                self.publish(self.timer.control_patch()).await;
            }
            AgentCommand::PauseTimer => {
                self.timer.pause();
                self.publish(self.timer.control_patch()).await;
            }
            AgentCommand::ToggleTimer => {
                self.timer.toggle();
                self.publish(self.timer.control_patch()).await;
            }
            AgentCommand::ResetTimer => {
                self.timer.reset();
                self.publish(self.timer.control_patch()).await;
            }
            AgentCommand::SwitchMode { mode } => {
                self.timer.switch_mode(mode);
                self.publish(self.timer.control_patch()).await;
            }
            AgentCommand::SetMood { mood } => {
                self.mood = Some(mood);
                self.publish(SyncStatePatch {
                    current_mood: Some(mood),
                    ..SyncStatePatch::default()
                })
                .await;
            }
            AgentCommand::ScrollTo { section } => {
                self.publish(SyncStatePatch {
                    scroll_to: Some(Some(section)),
                    ..SyncStatePatch::default()
                })
                .await;
            }
            AgentCommand::SetDurations {
                focus,
                short_break,
                long_break,
            } => {
                let current = self.timer.durations();
                let durations = TimerDurations {
                    focus: focus.unwrap_or(current.focus),
                    short_break: short_break.unwrap_or(current.short_break),
                    long_break: long_break.unwrap_or(current.long_break),
                };
                durations.validate().map_err(InfraError::InvalidRequest)?;
                self.timer.set_durations(durations);
                self.publish(self.timer.durations_patch()).await;
            }
            AgentCommand::GetStatus => {}
            AgentCommand::Connect => self.connect().await?,
            AgentCommand::Disconnect => {
                self.disconnect().await?;
            }
        }
        Ok(self.status())
    }
}
