use crate::application::editor_agent::{AgentCommand, EditorAgent};
use crate::domain::models::{Mood, ScrollTarget, TimerMode};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::sync_api_client::SyncApi;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, info, warn};

pub const AGENT_TICK_INTERVAL: Duration = Duration::from_secs(1);

const JSONRPC_VERSION: &str = "2.0";
pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
pub const INTERNAL_ERROR: i64 = -32603;
pub const SERVER_ERROR: i64 = -32000;

#[derive(Debug, Deserialize)]
struct RpcRequest {
    #[serde(default)]
    id: Option<Value>,
    method: String,
    #[serde(default)]
    params: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

impl RpcError {
    fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl From<InfraError> for RpcError {
    fn from(error: InfraError) -> Self {
        let code = if error.is_client_error() {
            INVALID_PARAMS
        } else {
            SERVER_ERROR
        };
        Self::new(code, error.to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl RpcResponse {
    fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    fn failure(id: Value, error: RpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct StartTimerParams {
    #[serde(default)]
    mode: Option<TimerMode>,
}

#[derive(Debug, Deserialize)]
struct SwitchModeParams {
    mode: TimerMode,
}

#[derive(Debug, Deserialize)]
struct SetMoodParams {
    mood: Mood,
}

#[derive(Debug, Deserialize)]
struct ScrollToParams {
    section: ScrollTarget,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SetDurationsParams {
    #[serde(default)]
    focus_duration: Option<u32>,
    #[serde(default)]
    short_break_duration: Option<u32>,
    #[serde(default)]
    long_break_duration: Option<u32>,
}

fn params<T>(method: &str, raw: Value) -> Result<T, RpcError>
where
    T: DeserializeOwned,
{
    let raw = if raw.is_null() {
        Value::Object(Default::default())
    } else {
        raw
    };
    serde_json::from_value(raw).map_err(|error| {
        RpcError::new(INVALID_PARAMS, format!("invalid params for {method}: {error}"))
    })
}

/// Maps a method name and its params onto an agent command.
pub fn parse_command(method: &str, raw: Value) -> Result<AgentCommand, RpcError> {
    let command = match method {
        "start_timer" => {
            let StartTimerParams { mode } = params(method, raw)?;
            AgentCommand::StartTimer { mode }
        }
        "pause_timer" => AgentCommand::PauseTimer,
        "toggle_timer" => AgentCommand::ToggleTimer,
        "reset_timer" => AgentCommand::ResetTimer,
        "switch_mode" => {
            let SwitchModeParams { mode } = params(method, raw)?;
            AgentCommand::SwitchMode { mode }
        }
        "set_mood" => {
            let SetMoodParams { mood } = params(method, raw)?;
            AgentCommand::SetMood { mood }
        }
        "scroll_to" => {
            let ScrollToParams { section } = params(method, raw)?;
            AgentCommand::ScrollTo { section }
        }
        "set_durations" => {
            let parsed: SetDurationsParams = params(method, raw)?;
            AgentCommand::SetDurations {
                focus: parsed.focus_duration,
                short_break: parsed.short_break_duration,
                long_break: parsed.long_break_duration,
            }
        }
        "get_status" => AgentCommand::GetStatus,
        "connect" => AgentCommand::Connect,
        "disconnect" => AgentCommand::Disconnect,
        other => {
            return Err(RpcError::new(
                METHOD_NOT_FOUND,
                format!("method not found: {other}"),
            ));
        }
    };
    Ok(command)
}

/// Handles one line of the command channel. Returns `None` for blank lines and notifications.
pub async fn handle_line<A: SyncApi>(
    agent: &mut EditorAgent<A>,
    line: &str,
) -> Option<RpcResponse> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let value: Value = match serde_json::from_str(line) {
        Ok(value) => value,
        Err(error) => {
            warn!(event = "rpc_parse_error", error = %error);
            return Some(RpcResponse::failure(
                Value::Null,
                RpcError::new(PARSE_ERROR, format!("parse error: {error}")),
            ));
        }
    };
    let id_hint = value.get("id").cloned().unwrap_or(Value::Null);
    let request: RpcRequest = match serde_json::from_value(value) {
        Ok(request) => request,
        Err(error) => {
            return Some(RpcResponse::failure(
                id_hint,
                RpcError::new(INVALID_REQUEST, format!("invalid request: {error}")),
            ));
        }
    };

    debug!(event = "rpc_request", method = %request.method);
    let result = execute(agent, &request.method, request.params).await;
    let id = request.id?;
    Some(match result {
        Ok(value) => RpcResponse::success(id, value),
        Err(error) => RpcResponse::failure(id, error),
    })
}

async fn execute<A: SyncApi>(
    agent: &mut EditorAgent<A>,
    method: &str,
    raw: Value,
) -> Result<Value, RpcError> {
    let command = parse_command(method, raw)?;
    let status = agent.handle_command(command).await?;
    serde_json::to_value(status).map_err(|error| RpcError::new(INTERNAL_ERROR, error.to_string()))
}

/// Serves the command channel and ticks the agent until the reader reaches end of input.
pub async fn run_agent_loop<A, R, W>(
    agent: &mut EditorAgent<A>,
    reader: R,
    mut writer: W,
    tick_every: Duration,
) -> Result<(), InfraError>
where
    A: SyncApi,
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();
    let mut ticker = interval_at(Instant::now() + tick_every, tick_every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                agent.tick().await;
            }
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                if let Some(response) = handle_line(agent, &line).await {
                    let mut encoded = serde_json::to_vec(&response)?;
                    encoded.push(b'\n');
                    writer.write_all(&encoded).await?;
                    writer.flush().await?;
                }
            }
        }
    }

    info!(event = "agent_input_closed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::test_support::{InProcessSyncApi, ManualClock, TempStateDir};
    use crate::domain::models::IdeKind;
    use crate::infrastructure::connected_flag::ConnectedFlag;
    use serde_json::json;
    use std::sync::Arc;
    use tokio::io::BufReader;

    const T: i64 = 1_760_000_000_000;

    fn agent() -> (
        ManualClock,
        Arc<InProcessSyncApi>,
        TempStateDir,
        EditorAgent<InProcessSyncApi>,
    ) {
        let clock = ManualClock::new(T);
        let api = Arc::new(InProcessSyncApi::new(&clock));
        let dir = TempStateDir::new();
        let agent = EditorAgent::new(
            Arc::clone(&api),
            ConnectedFlag::new(&dir.path),
            IdeKind::Vscode,
        );
        (clock, api, dir, agent)
    }

    async fn call(agent: &mut EditorAgent<InProcessSyncApi>, request: Value) -> RpcResponse {
        handle_line(agent, &request.to_string())
            .await
            .expect("response for request with id")
    }

    #[test]
    fn parse_command_reads_camel_case_duration_params() {
        let command = parse_command(
            "set_durations",
            json!({ "focusDuration": 1800, "longBreakDuration": 1200 }),
        )
        .expect("command");
        assert_eq!(
            command,
            AgentCommand::SetDurations {
                focus: Some(1800),
                short_break: None,
                long_break: Some(1200),
            }
        );
        assert_eq!(
            parse_command("start_timer", Value::Null).expect("command"),
            AgentCommand::StartTimer { mode: None }
        );
    }

    #[test]
    fn parse_command_rejects_unknown_methods_and_bad_params() {
        assert_eq!(
            parse_command("self_destruct", Value::Null)
                .expect_err("unknown")
                .code,
            METHOD_NOT_FOUND
        );
        assert_eq!(
            parse_command("switch_mode", json!({ "mode": "nap" }))
                .expect_err("bad mode")
                .code,
            INVALID_PARAMS
        );
        assert_eq!(
            parse_command("scroll_to", Value::Null)
                .expect_err("missing section")
                .code,
            INVALID_PARAMS
        );
    }

    #[tokio::test]
    async fn get_status_answers_with_the_timer_snapshot() {
        let (_, _, _dir, mut agent) = agent();
        let response = call(
            &mut agent,
            json!({ "jsonrpc": "2.0", "id": 7, "method": "get_status" }),
        )
        .await;
        assert_eq!(response.id, json!(7));
        assert!(response.error.is_none());
        let result = response.result.expect("result");
        assert_eq!(result["mode"], "focus");
        assert_eq!(result["isRunning"], false);
        assert_eq!(result["ide"], "vscode");
        assert_eq!(result["connected"], false);
    }

    #[tokio::test]
    async fn state_changing_methods_post_as_agent() {
        let (clock, api, _dir, mut agent) = agent();
        clock.advance(100);
        let response = call(
            &mut agent,
            json!({
                "jsonrpc": "2.0",
                "id": "a",
                "method": "switch_mode",
                "params": { "mode": "shortBreak" }
            }),
        )
        .await;
        assert_eq!(response.result.expect("result")["mode"], "shortBreak");

        let stored = api.sync.get().await;
        assert_eq!(stored.mode, TimerMode::ShortBreak);
        assert!(stored.is_agent_update());
    }

    #[tokio::test]
    async fn malformed_lines_get_a_parse_error() {
        let (_, _, _dir, mut agent) = agent();
        let response = handle_line(&mut agent, "{ not json").await.expect("response");
        assert_eq!(response.id, Value::Null);
        assert_eq!(response.error.expect("error").code, PARSE_ERROR);

        let response = call(&mut agent, json!({ "id": 3, "params": {} })).await;
        assert_eq!(response.id, json!(3));
        assert_eq!(response.error.expect("error").code, INVALID_REQUEST);
    }

    #[tokio::test]
    async fn out_of_range_durations_are_invalid_params() {
        let (_, api, _dir, mut agent) = agent();
        let response = call(
            &mut agent,
            json!({
                "jsonrpc": "2.0",
                "id": 1,
                "method": "set_durations",
                "params": { "focusDuration": 5 }
            }),
        )
        .await;
        assert_eq!(response.error.expect("error").code, INVALID_PARAMS);
        assert!(api.patches().is_empty());
    }

    #[tokio::test]
    async fn notifications_run_without_a_reply() {
        let (_, _, _dir, mut agent) = agent();
        let reply = handle_line(
            &mut agent,
            &json!({ "jsonrpc": "2.0", "method": "start_timer" }).to_string(),
        )
        .await;
        assert!(reply.is_none());
        assert!(agent.timer().is_running());
        assert!(handle_line(&mut agent, "   ").await.is_none());
    }

    #[tokio::test]
    async fn loop_answers_each_request_line_until_eof() {
        let (_, api, dir, mut agent) = agent();
        let input = [
            json!({ "jsonrpc": "2.0", "id": 1, "method": "connect" }).to_string(),
            json!({ "jsonrpc": "2.0", "id": 2, "method": "set_mood", "params": { "mood": "calm" } })
                .to_string(),
            json!({ "jsonrpc": "2.0", "id": 3, "method": "teleport" }).to_string(),
        ]
        .join("\n");
        let mut output = Vec::new();

        run_agent_loop(
            &mut agent,
            BufReader::new(input.as_bytes()),
            &mut output,
            Duration::from_secs(3600),
        )
        .await
        .expect("loop");

        let responses: Vec<RpcResponse> = String::from_utf8(output)
            .expect("utf8 output")
            .lines()
            .map(|line| serde_json::from_str(line).expect("response line"))
            .collect();
        assert_eq!(responses.len(), 3);
        assert_eq!(responses[0].result.as_ref().expect("connect")["connected"], true);
        assert_eq!(responses[1].result.as_ref().expect("mood")["currentMood"], "calm");
        assert_eq!(
            responses[2].error.as_ref().expect("unknown").code,
            METHOD_NOT_FOUND
        );

        assert!(ConnectedFlag::new(&dir.path).is_set());
        assert!(api.connection.snapshot().await.state.is_connected);
    }
}
