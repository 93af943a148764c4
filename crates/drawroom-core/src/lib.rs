//! Core types, config, errors, and wire protocol for Drawroom.

pub mod config;
pub mod error;
pub mod protocol;
pub mod types;
