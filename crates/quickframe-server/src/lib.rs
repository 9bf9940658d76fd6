//! Quickframe server library - HTTP API over the query memory.
//!
//! Routes, configuration, logging and application state live here so that
//! main.rs stays thin and integration tests can build the router directly.

pub mod config;
pub mod logging;
pub mod routes;
pub mod state;
