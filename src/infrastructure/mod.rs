pub mod config;
pub mod connected_flag;
pub mod connection_repository;
pub mod error;
pub mod kv_store;
pub mod logging;
pub mod rest_kv_store;
pub mod sync_api_client;
pub mod sync_state_repository;
