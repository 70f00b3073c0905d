//! fxguard Trade Execution Library
//!
//! Core components for executing trade recommendations against a broker:
//! the execution pipeline, the currency conversion engine and the exchange
//! rate cache, with their SQLite persistence and HTTP rate providers.

pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod persistence;
pub mod task_runner;
