use crate::domain::models::{SyncState, SyncStatePatch, TimerDurations, TimerMode};

pub const LONG_BREAK_EVERY: u32 = 4;
pub const LOCAL_EDIT_WINDOW_MS: i64 = 1_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletedInterval {
    pub finished: TimerMode,
    pub next: TimerMode,
    pub sessions_completed: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Idle,
    Counted { time_remaining: u32 },
    Completed(CompletedInterval),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub control_applied: bool,
    pub durations_changed: bool,
    pub countdown_reset: bool,
}

/// Local pomodoro countdown. The dashboard and the editor agent each own one and mirror it into
/// the shared record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PomodoroTimer {
    mode: TimerMode,
    is_running: bool,
    time_remaining: u32,
    total_time: u32,
    sessions_completed: u32,
    total_focus_time: u64,
    durations: TimerDurations,
}

impl Default for PomodoroTimer {
    fn default() -> Self {
        Self::new(TimerDurations::default())
    }
}

impl PomodoroTimer {
    pub fn new(durations: TimerDurations) -> Self {
        Self {
            mode: TimerMode::Focus,
            is_running: false,
            time_remaining: durations.focus,
            total_time: durations.focus,
            sessions_completed: 0,
            total_focus_time: 0,
            durations,
        }
    }

    pub fn from_state(state: &SyncState) -> Self {
        let mut timer = Self::new(state.durations());
        timer.adopt_remote(state);
        timer
    }

    pub fn mode(&self) -> TimerMode {
        self.mode
    }

    pub fn is_running(&self) -> bool {
        self.is_running
    }

    pub fn time_remaining(&self) -> u32 {
        self.time_remaining
    }

    pub fn total_time(&self) -> u32 {
        self.total_time
    }

    pub fn sessions_completed(&self) -> u32 {
        self.sessions_completed
    }

    pub fn total_focus_time(&self) -> u64 {
        self.total_focus_time
    }

    pub fn durations(&self) -> TimerDurations {
        self.durations
    }

    pub fn start(&mut self) {
        if self.time_remaining == 0 {
            self.restore_countdown();
        }
        self.is_running = true;
    }

    pub fn pause(&mut self) {
        self.is_running = false;
    }

    /// Returns the new running flag.
    pub fn toggle(&mut self) -> bool {
        if self.is_running {
            self.pause();
        } else {
            self.start();
        }
        self.is_running
    }

    pub fn reset(&mut self) {
        self.is_running = false;
        self.restore_countdown();
    }

    pub fn switch_mode(&mut self, mode: TimerMode) {
        self.mode = mode;
        self.reset();
    }

    /// Returns whether anything changed. A running countdown is left alone.
    pub fn set_durations(&mut self, durations: TimerDurations) -> bool {
        if durations == self.durations {
            return false;
        }
        self.durations = durations;
        if !self.is_running {
            self.restore_countdown();
        }
        true
    }

    pub fn tick(&mut self) -> TickOutcome {
        if !self.is_running {
            return TickOutcome::Idle;
        }
        self.time_remaining = self.time_remaining.saturating_sub(1);
        if self.time_remaining == 0 {
            return TickOutcome::Completed(self.complete());
        }
        TickOutcome::Counted {
            time_remaining: self.time_remaining,
        }
    }

    fn complete(&mut self) -> CompletedInterval {
        let finished = self.mode;
        self.is_running = false;

        let next = if finished.is_break() {
            TimerMode::Focus
        } else {
            self.sessions_completed = self.sessions_completed.saturating_add(1);
            self.total_focus_time = self
                .total_focus_time
                .saturating_add(u64::from(self.total_time));
            if self.sessions_completed % LONG_BREAK_EVERY == 0 {
                TimerMode::LongBreak
            } else {
                TimerMode::ShortBreak
            }
        };

        self.mode = next;
        self.restore_countdown();
        CompletedInterval {
            finished,
            next,
            sessions_completed: self.sessions_completed,
        }
    }

    fn restore_countdown(&mut self) {
        let duration = self.durations.for_mode(self.mode);
        self.time_remaining = duration;
        self.total_time = duration;
    }

    /// Takes every timer field from the remote record unconditionally.
    pub fn adopt_remote(&mut self, remote: &SyncState) {
        self.durations = remote.durations();
        self.mode = remote.mode;
        self.is_running = remote.is_running;
        self.time_remaining = remote.time_remaining;
        self.total_time = remote.total_time;
        self.sessions_completed = remote.sessions_completed;
        self.total_focus_time = remote.total_focus_time;
    }

    pub fn reconcile(
        &mut self,
        remote: &SyncState,
        now_ms: i64,
        last_local_edit_ms: Option<i64>,
    ) -> ReconcileOutcome {
        let recent_local_change = is_recent_local_change(now_ms, last_local_edit_ms);
        let control_applied =
            should_apply_remote(remote.is_agent_update(), self.is_running, recent_local_change);

        let remote_durations = remote.durations();
        let durations_changed = remote_durations != self.durations;

        if control_applied {
            self.adopt_remote(remote);
            return ReconcileOutcome {
                control_applied,
                durations_changed,
                countdown_reset: false,
            };
        }

        self.durations = remote_durations;
        let countdown_reset = durations_changed && !self.is_running;
        if countdown_reset {
            self.restore_countdown();
        }
        ReconcileOutcome {
            control_applied,
            durations_changed,
            countdown_reset,
        }
    }

    pub fn control_patch(&self) -> SyncStatePatch {
        SyncStatePatch {
            is_running: Some(self.is_running),
            mode: Some(self.mode),
            time_remaining: Some(self.time_remaining),
            total_time: Some(self.total_time),
            ..SyncStatePatch::default()
        }
    }

    pub fn completion_patch(&self) -> SyncStatePatch {
        SyncStatePatch {
            sessions_completed: Some(self.sessions_completed),
            total_focus_time: Some(self.total_focus_time),
            ..self.control_patch()
        }
    }

    pub fn durations_patch(&self) -> SyncStatePatch {
        SyncStatePatch {
            focus_duration: Some(self.durations.focus),
            short_break_duration: Some(self.durations.short_break),
            long_break_duration: Some(self.durations.long_break),
            ..self.control_patch()
        }
    }
}

pub fn is_recent_local_change(now_ms: i64, last_local_edit_ms: Option<i64>) -> bool {
    last_local_edit_ms
        .map(|edited_at| now_ms.saturating_sub(edited_at) < LOCAL_EDIT_WINDOW_MS)
        .unwrap_or(false)
}

/// Agent-originated records always win; peer records only land on an idle timer that was not
/// edited within the last second.
pub fn should_apply_remote(
    is_agent_update: bool,
    locally_running: bool,
    recent_local_change: bool,
) -> bool {
    is_agent_update || (!locally_running && !recent_local_change)
}
