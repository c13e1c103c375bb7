//! Core triage library (graph client, session state, config).

pub mod client;
pub mod config;
pub mod session;
