//! # Chatguard Common Library
//!
//! Shared code for the chatguard crates including:
//! - Error types (Error enum, Result alias)
//! - Configuration loading, resolution and validation
//! - Timestamp and date-partition utilities

pub mod config;
pub mod error;
pub mod time;

pub use config::MonitorConfig;
pub use error::{Error, Result};
