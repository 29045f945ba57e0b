//! Storage, configuration and diagnostics shared by the engine.

pub mod broker;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod schemas;
pub mod store;
pub mod time;
pub mod todo;
pub mod trace;
