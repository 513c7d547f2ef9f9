//! Subcommand implementations

pub mod audit;
pub mod model;
pub mod predict;
pub mod retrain;
