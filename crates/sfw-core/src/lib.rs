//! Core domain + application logic for the Smule follower watcher.
//!
//! This crate is intentionally framework-agnostic. The Smule HTTP API and Telegram
//! live behind ports (traits) implemented in adapter crates.

pub mod config;
pub mod diff;
pub mod domain;
pub mod errors;
pub mod followers;
pub mod formatting;
pub mod health;
pub mod logging;
pub mod messaging;
pub mod retry;
pub mod scheduler;
pub mod snapshot;

pub use errors::{Error, Result};
