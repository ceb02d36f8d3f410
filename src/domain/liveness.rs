use crate::domain::models::{ConnectionHistory, ConnectionState, IdeKind};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use chrono_tz::Tz;

pub const STALE_AFTER_MS: i64 = 30_000;
pub const ROLLUP_DAYS: i64 = 7;

/// The instant an action is evaluated at, plus the calendar day it falls on in the history
/// time zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LivenessClock {
    pub now_ms: i64,
    pub today: NaiveDate,
}

impl LivenessClock {
    pub fn new(now_ms: i64, timezone: Tz) -> Self {
        let today = DateTime::<Utc>::from_timestamp_millis(now_ms)
            .unwrap_or_default()
            .with_timezone(&timezone)
            .date_naive();
        Self { now_ms, today }
    }

    fn now_rfc3339(&self) -> String {
        DateTime::<Utc>::from_timestamp_millis(self.now_ms)
            .unwrap_or_default()
            .to_rfc3339()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatOutcome {
    /// The user disconnected explicitly; nothing was touched.
    Ignored,
    /// No live session existed, so the heartbeat opened one.
    Reconnected,
    Extended { credited_seconds: u64 },
}

pub fn day_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn whole_seconds(ms: i64) -> i64 {
    ms.div_euclid(1_000)
}

pub fn connect(
    state: &mut ConnectionState,
    history: &mut ConnectionHistory,
    ide: IdeKind,
    clock: LivenessClock,
) {
    *state = ConnectionState {
        is_connected: true,
        connected_ide: Some(ide),
        session_start_time: Some(clock.now_ms),
        last_heartbeat: Some(clock.now_ms),
        current_session_duration: 0,
        disconnected_by_user: false,
    };
    history.sessions_count = history.sessions_count.saturating_add(1);
    history.last_session_date = Some(clock.now_rfc3339());
    refresh_rollups(history, clock.today);
}

pub fn heartbeat(
    state: &mut ConnectionState,
    history: &mut ConnectionHistory,
    ide: Option<IdeKind>,
    clock: LivenessClock,
) -> HeartbeatOutcome {
    if state.disconnected_by_user {
        return HeartbeatOutcome::Ignored;
    }

    let (Some(session_start), Some(last_heartbeat)) =
        (state.session_start_time, state.last_heartbeat)
    else {
        connect(state, history, ide.unwrap_or(IdeKind::Unknown), clock);
        return HeartbeatOutcome::Reconnected;
    };
    if !state.is_connected {
        connect(state, history, ide.unwrap_or(IdeKind::Unknown), clock);
        return HeartbeatOutcome::Reconnected;
    }

    // Out-of-order delivery never moves the heartbeat backwards or credits negative time.
    let heartbeat_at = clock.now_ms.max(last_heartbeat);
    let credited_seconds =
        u64::try_from(whole_seconds(heartbeat_at) - whole_seconds(last_heartbeat)).unwrap_or(0);

    let bucket = history.daily_history.entry(day_key(clock.today)).or_insert(0);
    *bucket = bucket.saturating_add(credited_seconds);
    history.total_connection_time = history.total_connection_time.saturating_add(credited_seconds);

    state.last_heartbeat = Some(heartbeat_at);
    state.current_session_duration =
        u64::try_from(whole_seconds(heartbeat_at - session_start)).unwrap_or(0);
    if state.connected_ide.is_none() {
        state.connected_ide = ide;
    }
    refresh_rollups(history, clock.today);

    HeartbeatOutcome::Extended { credited_seconds }
}

/// Ends the session and returns its final duration in seconds.
pub fn disconnect(state: &mut ConnectionState, clock: LivenessClock) -> u64 {
    let session_duration = state
        .session_start_time
        .map(|start| u64::try_from(whole_seconds(clock.now_ms - start)).unwrap_or(0))
        .unwrap_or(0);
    *state = ConnectionState {
        disconnected_by_user: true,
        ..ConnectionState::default()
    };
    session_duration
}

/// Flips a connected state whose last heartbeat is older than the staleness threshold. Returns
/// whether anything changed.
pub fn expire_if_stale(state: &mut ConnectionState, now_ms: i64) -> bool {
    if !state.is_connected {
        return false;
    }
    let stale = state
        .last_heartbeat
        .map(|last| now_ms - last > STALE_AFTER_MS)
        .unwrap_or(true);
    if stale {
        state.is_connected = false;
    }
    stale
}

pub fn refresh_rollups(history: &mut ConnectionHistory, today: NaiveDate) {
    history.today_connection_time = history
        .daily_history
        .get(&day_key(today))
        .copied()
        .unwrap_or(0);
    history.week_connection_time = (0..ROLLUP_DAYS)
        .filter_map(|offset| today.checked_sub_signed(Duration::days(offset)))
        .filter_map(|day| history.daily_history.get(&day_key(day)).copied())
        .sum();
}
