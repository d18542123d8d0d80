#![doc = "Common types shared across the dryve D1 workspace: errors and configuration."]

pub mod config;
pub mod error;

pub use config::*;
pub use error::*;
