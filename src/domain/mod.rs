pub mod api;
pub mod ide;
pub mod liveness;
pub mod models;
pub mod timer;
