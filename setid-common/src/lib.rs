//! # setid Common Library
//!
//! Shared code for the setid crates:
//! - Error types
//! - Bootstrap configuration and data folder resolution
//! - Human-readable time formatting
//! - Tracing subscriber setup

pub mod config;
pub mod error;
pub mod human_time;
pub mod logging;

pub use error::{Error, Result};
