use crate::application::agent_rpc::{AGENT_TICK_INTERVAL, run_agent_loop};
use crate::application::bootstrap::bootstrap_server;
use crate::application::dashboard::Dashboard;
use crate::application::dashboard_sync::SyncListener;
use crate::application::editor_agent::EditorAgent;
use crate::application::http_api::router;
use crate::domain::ide::{IdeSignals, detect_ide};
use crate::domain::models::{ConnectionSnapshot, IdeKind, Mood, ScrollTarget, SyncState};
use crate::infrastructure::config::{ClientConfig, ServerConfig};
use crate::infrastructure::connected_flag::ConnectedFlag;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::sync_api_client::ReqwestSyncApiClient;
use std::sync::Arc;
use tokio::io::BufReader;
use tracing::info;

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

/// `pomosync serve`
pub async fn serve(config: ServerConfig) -> Result<(), InfraError> {
    let bootstrap = bootstrap_server(&config)?;
    let app = router(bootstrap.state);
    let listener = tokio::net::TcpListener::bind(config.listen).await?;

    info!(
        event = "server_start",
        addr = %listener.local_addr()?,
        backend = bootstrap.backend,
        timezone = %config.timezone
    );
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!(event = "server_stop");
    Ok(())
}

/// `pomosync agent`: stdin carries requests, stdout carries responses.
pub async fn run_agent(config: ClientConfig, ide: Option<IdeKind>) -> Result<(), InfraError> {
    let ide = ide.unwrap_or_else(|| detect_ide(&IdeSignals::from_process()));
    let api = Arc::new(ReqwestSyncApiClient::new(&config.base_url)?);
    let flag = ConnectedFlag::new(&config.state_dir);
    info!(
        event = "agent_config",
        base_url = %config.base_url,
        flag = %flag.path().display(),
        ide = ide.as_str()
    );

    let mut agent = EditorAgent::new(api, flag, ide);
    agent.start().await;

    let stdin = BufReader::new(tokio::io::stdin());
    let stdout = tokio::io::stdout();
    tokio::select! {
        result = run_agent_loop(&mut agent, stdin, stdout, AGENT_TICK_INTERVAL) => result?,
        _ = shutdown_signal() => info!(event = "agent_interrupted"),
    }
    info!(event = "agent_stop");
    Ok(())
}

/// Logs every dashboard callback; stands in for the page.
#[derive(Debug, Default)]
pub struct WatchListener;

impl SyncListener for WatchListener {
    fn on_state_applied(&mut self, state: &SyncState) {
        info!(
            event = "state_applied",
            last_updated = state.last_updated,
            mode = %state.mode,
            is_running = state.is_running,
            time_remaining = state.time_remaining,
            agent_update = state.is_agent_update()
        );
    }

    fn on_mood_changed(&mut self, mood: Mood) {
        info!(event = "mood_changed", mood = mood.as_str());
    }

    fn on_timer_started(&mut self, state: &SyncState) {
        info!(event = "timer_started", mode = %state.mode, time_remaining = state.time_remaining);
    }

    fn on_timer_stopped(&mut self, state: &SyncState) {
        info!(event = "timer_stopped", mode = %state.mode, time_remaining = state.time_remaining);
    }

    fn on_scroll_requested(&mut self, target: ScrollTarget) {
        info!(event = "scroll_requested", target = target.as_str());
    }

    fn on_connectivity_changed(&mut self, online: bool) {
        info!(event = "connectivity_changed", online);
    }

    fn on_connection_changed(&mut self, snapshot: &ConnectionSnapshot) {
        info!(
            event = "ide_connection_changed",
            connected = snapshot.state.is_connected,
            ide = snapshot.state.connected_ide.map(IdeKind::as_str).unwrap_or("none"),
            today_seconds = snapshot.history.today_connection_time,
            week_seconds = snapshot.history.week_connection_time
        );
    }
}

/// `pomosync watch`
pub async fn watch(config: ClientConfig) -> Result<(), InfraError> {
    let api = Arc::new(ReqwestSyncApiClient::new(&config.base_url)?);
    info!(event = "watch_start", base_url = %config.base_url);
    Dashboard::new(api, WatchListener).run(shutdown_signal()).await;
    Ok(())
}
