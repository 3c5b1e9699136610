//! Kinetrace Model
//!
//! Defines the data contracts shared by every pass:
//! - **Detections:** Classes, boxes, and the compact persisted record
//! - **Detection log:** Versioned envelope written by the inference pipeline
//! - **Raw signal:** Per-frame contact distance emitted by the tracker
//! - **Motion script:** Final `(at, pos)` keyframe track
//! - **Video / metadata:** Source description and the run sidecar
//!
//! Pixel coordinates are in the detection frame's space (after scaling and
//! reprojection), not the source video's.

pub mod detection;
pub mod detection_log;
pub mod error;
pub mod layout;
pub mod metadata;
pub mod script;
pub mod signal;
pub mod version;
pub mod video;

mod io;

pub use detection::*;
pub use detection_log::*;
pub use error::*;
pub use layout::*;
pub use metadata::*;
pub use script::*;
pub use signal::*;
pub use version::*;
pub use video::*;
