//! Kinetrace Common Utilities
//!
//! Shared infrastructure for all kinetrace crates:
//! - Error types and result aliases
//! - Run clocks, throttles and ETA formatting for progress reporting
//! - Cooperative stop flag
//! - Tracing/logging initialization
//! - Configuration loading

pub mod cancel;
pub mod clock;
pub mod config;
pub mod error;
pub mod logging;

pub use cancel::*;
pub use clock::*;
pub use config::*;
pub use error::*;
