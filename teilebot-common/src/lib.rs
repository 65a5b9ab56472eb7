//! # Teilebot Common Library
//!
//! Shared code for the teilebot services:
//! - Common error types
//! - Configuration file resolution and loading

pub mod config;
pub mod error;

pub use error::{Error, Result};
