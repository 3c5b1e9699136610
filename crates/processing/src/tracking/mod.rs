//! Contact tracking over a detection log.
//!
//! # Algorithm
//!
//! 1. **Lock** a stabilized box onto the reference class once it has been seen
//!    for K consecutive frames (K = a tenth of the frame rate).
//! 2. **Follow** it with a rate-limited, height-monotonic update and derive a
//!    visibility percentage from the observed/locked area ratio.
//! 3. **Classify** every other box overlapping the locked box as touching,
//!    ignoring limb near-misses, and feed per-track position/distance buffers.
//! 4. **Decide** the interaction mode by precedence and majority vote.
//! 5. **Combine** touching tracks into one weighted distance, then smooth and
//!    speed-limit it before emission.

mod analyzer;
mod config;
mod locked_box;
mod mode;
mod signals;
mod tracker;

pub use analyzer::{find_first_reference_frame, AnalysisRange, TrackingAnalyzer, TrackingOutput};
pub use config::{TrackerConfig, TrackingContext};
pub use locked_box::LockedReferenceBox;
pub use mode::{InteractionMode, ModeChange, ModeHistory};
pub use signals::{TrackKey, TrackSignals};
pub use tracker::{ContactTracker, FrameState, Streak};
