use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_FOCUS_SECONDS: u32 = 25 * 60;
pub const DEFAULT_SHORT_BREAK_SECONDS: u32 = 5 * 60;
pub const DEFAULT_LONG_BREAK_SECONDS: u32 = 15 * 60;
pub const MIN_DURATION_SECONDS: u32 = 60;
pub const MAX_FOCUS_SECONDS: u32 = 120 * 60;
pub const MAX_BREAK_SECONDS: u32 = 60 * 60;
pub const AGENT_SOURCE: &str = "mcp";

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum TimerMode {
    #[default]
    Focus,
    ShortBreak,
    LongBreak,
}

impl TimerMode {
    pub fn is_break(self) -> bool {
        !matches!(self, Self::Focus)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Focus => "focus",
            Self::ShortBreak => "shortBreak",
            Self::LongBreak => "longBreak",
        }
    }
}

impl fmt::Display for TimerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Mood {
    #[default]
    Focus,
    Calm,
    Energetic,
    Creative,
}

impl Mood {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Focus => "focus",
            Self::Calm => "calm",
            Self::Energetic => "energetic",
            Self::Creative => "creative",
        }
    }
}

impl fmt::Display for Mood {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Dashboard section an agent can ask the page to bring into view.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ScrollTarget {
    Timer,
    Mood,
    Music,
    Stats,
    Connection,
}

impl ScrollTarget {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Timer => "timer",
            Self::Mood => "mood",
            Self::Music => "music",
            Self::Stats => "stats",
            Self::Connection => "connection",
        }
    }
}

impl fmt::Display for ScrollTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum IdeKind {
    Cursor,
    Vscode,
    Windsurf,
    Intellij,
    Unknown,
}

impl IdeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cursor => "cursor",
            Self::Vscode => "vscode",
            Self::Windsurf => "windsurf",
            Self::Intellij => "intellij",
            Self::Unknown => "unknown",
        }
    }

    /// Maps any unrecognized name to `Unknown` instead of failing.
    pub fn parse_lenient(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "cursor" => Self::Cursor,
            "vscode" | "vs-code" | "code" => Self::Vscode,
            "windsurf" => Self::Windsurf,
            "intellij" | "idea" | "jetbrains" => Self::Intellij,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for IdeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerDurations {
    pub focus: u32,
    pub short_break: u32,
    pub long_break: u32,
}

impl Default for TimerDurations {
    fn default() -> Self {
        Self {
            focus: DEFAULT_FOCUS_SECONDS,
            short_break: DEFAULT_SHORT_BREAK_SECONDS,
            long_break: DEFAULT_LONG_BREAK_SECONDS,
        }
    }
}

impl TimerDurations {
    pub fn for_mode(&self, mode: TimerMode) -> u32 {
        match mode {
            TimerMode::Focus => self.focus,
            TimerMode::ShortBreak => self.short_break,
            TimerMode::LongBreak => self.long_break,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        validate_range(self.focus, MIN_DURATION_SECONDS, MAX_FOCUS_SECONDS, "focusDuration")?;
        validate_range(
            self.short_break,
            MIN_DURATION_SECONDS,
            MAX_BREAK_SECONDS,
            "shortBreakDuration",
        )?;
        validate_range(
            self.long_break,
            MIN_DURATION_SECONDS,
            MAX_BREAK_SECONDS,
            "longBreakDuration",
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SyncState {
    pub is_running: bool,
    pub mode: TimerMode,
    pub time_remaining: u32,
    pub total_time: u32,
    pub current_mood: Mood,
    pub sessions_completed: u32,
    pub total_focus_time: u64,
    pub focus_duration: u32,
    pub short_break_duration: u32,
    pub long_break_duration: u32,
    pub last_updated: i64,
    pub last_mcp_update: i64,
    #[serde(default)]
    pub scroll_to: Option<ScrollTarget>,
}

impl Default for SyncState {
    fn default() -> Self {
        Self::defaults(0)
    }
}

impl SyncState {
    pub fn defaults(stamp: i64) -> Self {
        let durations = TimerDurations::default();
        Self {
            is_running: false,
            mode: TimerMode::Focus,
            time_remaining: durations.focus,
            total_time: durations.focus,
            current_mood: Mood::Focus,
            sessions_completed: 0,
            total_focus_time: 0,
            focus_duration: durations.focus,
            short_break_duration: durations.short_break,
            long_break_duration: durations.long_break,
            last_updated: stamp,
            last_mcp_update: 0,
            scroll_to: None,
        }
    }

    pub fn durations(&self) -> TimerDurations {
        TimerDurations {
            focus: self.focus_duration,
            short_break: self.short_break_duration,
            long_break: self.long_break_duration,
        }
    }

    /// True when the most recent write to this record came from the editor agent.
    pub fn is_agent_update(&self) -> bool {
        self.last_mcp_update > 0 && self.last_mcp_update == self.last_updated
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_running: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<TimerMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_remaining: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_time: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_mood: Option<Mood>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sessions_completed: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_focus_time: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub focus_duration: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub short_break_duration: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub long_break_duration: Option<u32>,
    // Outer None: untouched. Some(None): clear.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_present"
    )]
    pub scroll_to: Option<Option<ScrollTarget>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl SyncStatePatch {
    pub fn clear_scroll() -> Self {
        Self {
            scroll_to: Some(None),
            ..Self::default()
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn is_agent_originated(&self) -> bool {
        self.source.as_deref() == Some(AGENT_SOURCE)
    }

    pub fn validate(&self) -> Result<(), String> {
        if let Some(value) = self.focus_duration {
            validate_range(value, MIN_DURATION_SECONDS, MAX_FOCUS_SECONDS, "focusDuration")?;
        }
        if let Some(value) = self.short_break_duration {
            validate_range(value, MIN_DURATION_SECONDS, MAX_BREAK_SECONDS, "shortBreakDuration")?;
        }
        if let Some(value) = self.long_break_duration {
            validate_range(value, MIN_DURATION_SECONDS, MAX_BREAK_SECONDS, "longBreakDuration")?;
        }
        if let Some(value) = self.time_remaining {
            validate_range(value, 0, MAX_FOCUS_SECONDS, "timeRemaining")?;
        }
        if let Some(value) = self.total_time {
            validate_range(value, 0, MAX_FOCUS_SECONDS, "totalTime")?;
        }
        Ok(())
    }

    /// Shallow merge: every present field overwrites the record's value. `source` is not a
    /// record field and never lands in the state.
    pub fn apply_to(&self, state: &mut SyncState) {
        if let Some(value) = self.is_running {
            state.is_running = value;
        }
        if let Some(value) = self.mode {
            state.mode = value;
        }
        if let Some(value) = self.time_remaining {
            state.time_remaining = value;
        }
        if let Some(value) = self.total_time {
            state.total_time = value;
        }
        if let Some(value) = self.current_mood {
            state.current_mood = value;
        }
        if let Some(value) = self.sessions_completed {
            state.sessions_completed = value;
        }
        if let Some(value) = self.total_focus_time {
            state.total_focus_time = value;
        }
        if let Some(value) = self.focus_duration {
            state.focus_duration = value;
        }
        if let Some(value) = self.short_break_duration {
            state.short_break_duration = value;
        }
        if let Some(value) = self.long_break_duration {
            state.long_break_duration = value;
        }
        if let Some(value) = self.scroll_to {
            state.scroll_to = value;
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct ConnectionState {
    pub is_connected: bool,
    #[serde(rename = "connectedIDE")]
    pub connected_ide: Option<IdeKind>,
    pub session_start_time: Option<i64>,
    pub last_heartbeat: Option<i64>,
    pub current_session_duration: u64,
    pub disconnected_by_user: bool,
}

// Missing fields default to zero so an older record never drops accumulated history.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct ConnectionHistory {
    pub total_connection_time: u64,
    pub today_connection_time: u64,
    pub week_connection_time: u64,
    pub sessions_count: u32,
    pub last_session_date: Option<String>,
    pub daily_history: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConnectionSnapshot {
    pub state: ConnectionState,
    pub history: ConnectionHistory,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionAction {
    Connect,
    Heartbeat,
    Disconnect,
}

impl ConnectionAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Heartbeat => "heartbeat",
            Self::Disconnect => "disconnect",
        }
    }
}

impl FromStr for ConnectionAction {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "connect" => Ok(Self::Connect),
            "heartbeat" => Ok(Self::Heartbeat),
            "disconnect" => Ok(Self::Disconnect),
            other => Err(format!(
                "unknown action '{other}' (expected connect, heartbeat or disconnect)"
            )),
        }
    }
}

fn deserialize_present<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

fn validate_range(value: u32, min: u32, max: u32, field_name: &str) -> Result<(), String> {
    if value < min || value > max {
        return Err(format!("{field_name} must be between {min} and {max} seconds"));
    }
    Ok(())
}
