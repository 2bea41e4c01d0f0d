//! Slipway Deployment Engine
//!
//! Core modules for building a source commit in an isolated container,
//! activating it on a remote host, and streaming logs to live observers.

pub mod app;
pub mod deploy;
pub mod errors;
pub mod hub;
pub mod logs;
pub mod models;
pub mod storage;
pub mod store;
pub mod trigger;
pub mod utils;
pub mod workers;
