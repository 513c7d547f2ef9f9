//! HTTP front end for the iris classifier
//!
//! Translates requests into calls on the serving library and owns process
//! bootstrap and configuration.

pub mod api;
pub mod app;
pub mod config;

pub use api::{create_router, AppState};
pub use app::build_state;
pub use config::ServerConfig;
