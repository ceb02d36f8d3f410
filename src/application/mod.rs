pub mod agent_rpc;
pub mod bootstrap;
pub mod commands;
pub mod connection_service;
pub mod dashboard;
pub mod dashboard_sync;
pub mod editor_agent;
pub mod http_api;
pub mod sync_state_service;
