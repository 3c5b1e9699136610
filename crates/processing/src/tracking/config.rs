use serde::{Deserialize, Serialize};

/// Tunables of the contact tracker.
///
/// Every number here was tuned by eye against real footage; they are kept as
/// overridable defaults rather than structural constants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Detections at or below this confidence are ignored.
    pub min_confidence: f64,

    /// Consecutive detections needed to trust a class, as a fraction of fps.
    pub lock_fraction_of_fps: f64,

    /// The locked box is released after `lock_frames * release_multiplier`
    /// frames without a reference detection (about three seconds).
    pub release_multiplier: f64,

    /// Max locked-box edge movement for panoramic sources, pixels per second.
    pub max_move_panoramic: f64,

    /// Max locked-box edge movement for flat sources, pixels per second.
    pub max_move_flat: f64,

    /// Visibility below this share of the locked area reads as zero.
    pub visibility_offset: f64,

    /// Limb boxes covering less than this percentage of the locked box are near-misses.
    pub near_miss_overlap_pct: f64,

    /// Locked height share used when measuring limb contact.
    pub limb_height_factor: f64,

    /// Locked height share used when measuring region contact.
    pub region_height_factor: f64,

    /// The measuring base is lifted by this share of the scaled height.
    pub base_lift: f64,

    /// Where the rear region's contact edge sits, as a share of its height.
    pub rear_low_fraction: f64,

    /// Containing-region area (share of the frame) that means close-up, panoramic.
    pub close_up_area_panoramic: f64,

    /// Containing-region area (share of the frame) that means close-up, flat.
    pub close_up_area_flat: f64,

    /// Front-region area (share of the frame) that means close-up without a reference.
    pub front_close_up_area: f64,

    /// Weight of the absolute position against distance in the composite.
    pub position_weight: f64,

    /// Fastest plausible full 0→100 sweep, in seconds.
    pub full_sweep_secs: f64,

    /// Length of the mode majority-vote window, in seconds.
    pub mode_history_secs: f64,

    /// Raw vertical positions kept per track.
    pub position_history: usize,

    /// Normalized position/distance samples kept per track.
    pub signal_window: usize,

    /// Confidence needed for a frame to count toward the first reference run.
    pub first_reference_confidence: f64,

    /// Consecutive frames (exclusive) that make the first reference run.
    pub first_reference_run: u64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.3,
            lock_fraction_of_fps: 0.1,
            release_multiplier: 30.0,
            max_move_panoramic: 180.0,
            max_move_flat: 360.0,
            visibility_offset: 20.0,
            near_miss_overlap_pct: 20.0,
            limb_height_factor: 0.7,
            region_height_factor: 0.8,
            base_lift: 0.1,
            rear_low_fraction: 0.8,
            close_up_area_panoramic: 0.15,
            close_up_area_flat: 0.4,
            front_close_up_area: 0.1,
            position_weight: 0.4,
            full_sweep_secs: 0.18,
            mode_history_secs: 10.0,
            position_history: 600,
            signal_window: 60,
            first_reference_confidence: 0.5,
            first_reference_run: 5,
        }
    }
}

/// What the tracker needs to know about the frames it analyzes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackingContext {
    pub fps: f64,

    /// Detection-frame size; boxes are in this coordinate space.
    pub frame_width: u32,
    pub frame_height: u32,

    /// Frames in the source video.
    pub total_frames: u64,

    pub panoramic: bool,
}

impl TrackingContext {
    pub fn frame_area(&self) -> f64 {
        self.frame_width as f64 * self.frame_height as f64
    }

    /// Integral frame rate, at least 1.
    pub fn whole_fps(&self) -> u64 {
        (self.fps.trunc() as u64).max(1)
    }
}

impl TrackerConfig {
    /// K: consecutive detections needed before a class is trusted.
    pub fn lock_frames(&self, ctx: &TrackingContext) -> f64 {
        ctx.fps.round() * self.lock_fraction_of_fps
    }

    /// Per-frame edge movement cap for the locked box.
    pub fn max_move_per_frame(&self, ctx: &TrackingContext) -> f64 {
        let per_sec = if ctx.panoramic {
            self.max_move_panoramic
        } else {
            self.max_move_flat
        };
        (per_sec / ctx.whole_fps() as f64).floor().max(1.0)
    }

    /// Largest distance change allowed between two frames.
    pub fn max_speed(&self, ctx: &TrackingContext) -> f64 {
        100.0 / (self.full_sweep_secs * ctx.fps.max(1.0))
    }

    /// Mode history capacity in frames.
    pub fn mode_history_len(&self, ctx: &TrackingContext) -> usize {
        ((ctx.whole_fps() as f64 * self.mode_history_secs) as usize).max(1)
    }

    /// Containing-region close-up threshold for this source, as a frame share.
    pub fn close_up_area(&self, ctx: &TrackingContext) -> f64 {
        if ctx.panoramic {
            self.close_up_area_panoramic
        } else {
            self.close_up_area_flat
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(fps: f64, panoramic: bool) -> TrackingContext {
        TrackingContext {
            fps,
            frame_width: 1080,
            frame_height: 1080,
            total_frames: 1000,
            panoramic,
        }
    }

    #[test]
    fn test_derived_values_at_30fps() {
        let config = TrackerConfig::default();
        let ctx = ctx(30.0, true);
        assert!((config.lock_frames(&ctx) - 3.0).abs() < 1e-9);
        assert_eq!(config.max_move_per_frame(&ctx), 6.0);
        assert!((config.max_speed(&ctx) - 18.518_518).abs() < 1e-3);
        assert_eq!(config.mode_history_len(&ctx), 300);
    }

    #[test]
    fn test_flat_sources_move_faster() {
        let config = TrackerConfig::default();
        assert_eq!(config.max_move_per_frame(&ctx(60.0, false)), 6.0);
        assert_eq!(config.max_move_per_frame(&ctx(60.0, true)), 3.0);
        assert_eq!(config.close_up_area(&ctx(60.0, false)), 0.4);
    }
}
