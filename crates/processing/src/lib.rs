//! Kinetrace Processing Core
//!
//! The two sequential passes that run after inference:
//! - **Tracking:** Locked reference box + contact classification state machine
//!   that turns a detection log into a raw `[0, 100]` distance signal
//! - **Curve building:** Smoothing, simplification, normalization and shaping
//!   that turns the raw signal into a motion script
//!
//! This crate is pure computation over already-materialized data. It reads no
//! files and spawns no threads; callers run it off their pipeline thread.

pub mod curve;
pub mod tracking;

pub use curve::{CurveBuilder, CurveConfig};
pub use tracking::{TrackerConfig, TrackingAnalyzer};
