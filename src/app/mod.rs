pub mod boot;
pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod prefs;
pub mod root;
pub mod state;
pub mod telemetry;
pub mod tweaks;
