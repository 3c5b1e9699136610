//! Stabilized reference rectangle.

use kinetrace_model::Rect;
use serde::{Deserialize, Serialize};

use super::TrackerConfig;

/// Rate-limited, height-monotonic copy of the reference detection.
///
/// The height only ever grows while the box stays locked, so the measuring
/// base does not drift when the reference is partly occluded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LockedReferenceBox {
    pub rect: Option<Rect>,
    pub height: f64,
    pub active: bool,

    /// Share of the locked area currently visible, 0..=100.
    pub visibility: f64,

    /// Locked area used as the visibility denominator.
    pub area: f64,
}

impl LockedReferenceBox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock onto `observed`, adopting its size as-is.
    pub fn lock(&mut self, observed: Rect) {
        self.rect = Some(observed);
        self.height = observed.height();
        self.area = observed.area();
        self.visibility = 100.0;
        self.active = true;
    }

    /// Move toward `observed`, each edge by at most `max_move` pixels.
    pub fn follow(&mut self, observed: Rect, max_move: f64, config: &TrackerConfig) {
        let Some(current) = self.rect else {
            self.lock(observed);
            return;
        };

        if observed.height() > self.height {
            self.rect = Some(observed);
            self.height = observed.height();
            self.area = observed.area();
        }
        let locked = self.rect.unwrap_or(current);

        let step = |from: f64, to: f64| from + (to - from).clamp(-max_move, max_move);
        let x1 = step(locked.x1, observed.x1);
        let x2 = step(locked.x2, observed.x2);
        let y2 = step(locked.y2, observed.y2);
        let rect = Rect::new(x1, y2 - self.height, x2, y2);
        self.rect = Some(rect);
        self.area = rect.area();

        self.visibility = visibility(observed.area(), self.area, config);
    }

    /// Re-anchor on the last reference seen, keeping the larger height.
    ///
    /// Used when the tip shows up: the reference is fully exposed then.
    pub fn reanchor(&mut self, observed: Rect) {
        self.height = self.height.max(observed.height());
        let rect = Rect::new(observed.x1, observed.y2 - self.height, observed.x2, observed.y2);
        self.rect = Some(rect);
        self.area = rect.area();
        self.visibility = 100.0;
        self.active = true;
    }

    /// Forget the locked box entirely.
    pub fn deactivate(&mut self) {
        *self = Self::default();
    }

    /// Bottom edge of the locked box, if any.
    pub fn y2(&self) -> Option<f64> {
        self.rect.map(|r| r.y2)
    }
}

fn visibility(observed_area: f64, locked_area: f64, config: &TrackerConfig) -> f64 {
    if locked_area <= 0.0 {
        return 0.0;
    }
    let share = (observed_area / locked_area * 100.0).min(100.0);
    let span = 100.0 - config.visibility_offset;
    ((share - config.visibility_offset).max(0.0) * 100.0 / span).floor()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect_of_height(h: f64) -> Rect {
        Rect::new(100.0, 500.0 - h, 200.0, 500.0)
    }

    #[test]
    fn test_height_only_grows() {
        let config = TrackerConfig::default();
        let mut locked = LockedReferenceBox::new();
        let mut heights = Vec::new();
        for (i, h) in [10.0, 15.0, 12.0, 20.0].into_iter().enumerate() {
            if i == 0 {
                locked.lock(rect_of_height(h));
            } else {
                locked.follow(rect_of_height(h), 6.0, &config);
            }
            heights.push(locked.height);
        }
        assert_eq!(heights, vec![10.0, 15.0, 15.0, 20.0]);
    }

    #[test]
    fn test_edges_are_rate_limited() {
        let config = TrackerConfig::default();
        let mut locked = LockedReferenceBox::new();
        locked.lock(Rect::new(100.0, 400.0, 200.0, 500.0));
        locked.follow(Rect::new(150.0, 450.0, 260.0, 540.0), 6.0, &config);

        let rect = locked.rect.unwrap();
        assert_eq!(rect.x1, 106.0);
        assert_eq!(rect.x2, 206.0);
        assert_eq!(rect.y2, 506.0);
        assert_eq!(rect.height(), 100.0);
    }

    #[test]
    fn test_visibility_maps_offset_to_zero() {
        let config = TrackerConfig::default();
        let mut locked = LockedReferenceBox::new();
        locked.lock(Rect::new(0.0, 0.0, 100.0, 100.0));

        // Half the height visible: 50% area, (50 - 20) * 100 / 80 = 37.5.
        locked.follow(Rect::new(0.0, 50.0, 100.0, 100.0), 6.0, &config);
        assert_eq!(locked.visibility, 37.0);

        // Barely visible stays at zero.
        locked.follow(Rect::new(0.0, 90.0, 100.0, 100.0), 6.0, &config);
        assert_eq!(locked.visibility, 0.0);
    }

    #[test]
    fn test_reanchor_keeps_larger_height() {
        let mut locked = LockedReferenceBox::new();
        locked.lock(rect_of_height(80.0));
        locked.reanchor(rect_of_height(40.0));
        assert!(locked.active);
        assert_eq!(locked.height, 80.0);
        assert_eq!(locked.rect.unwrap().y1, 420.0);
    }

    #[test]
    fn test_deactivate_clears_box() {
        let mut locked = LockedReferenceBox::new();
        locked.lock(rect_of_height(80.0));
        locked.deactivate();
        assert!(!locked.active);
        assert!(locked.rect.is_none());
        assert_eq!(locked.height, 0.0);
    }
}
