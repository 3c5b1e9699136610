//! Per-frame contact classification and distance estimation.

use std::collections::HashMap;

use kinetrace_model::{DetectionBox, DetectionClass, Rect};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::signals::ema3;
use super::{
    InteractionMode, LockedReferenceBox, ModeChange, ModeHistory, TrackKey, TrackSignals,
    TrackerConfig, TrackingContext,
};

/// Consecutive detection / non-detection counters for one class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Streak {
    pub hits: u64,
    pub misses: u64,
}

impl Streak {
    fn record(&mut self, seen: bool) {
        if seen {
            self.hits += 1;
            self.misses = 0;
        } else {
            self.hits = 0;
            self.misses += 1;
        }
    }

    fn trusted(&self, lock_frames: f64) -> bool {
        self.hits as f64 >= lock_frames
    }
}

/// Inspectable tracker state after one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameState {
    pub frame_index: u64,
    pub distance: u8,
    pub mode: InteractionMode,
    pub mode_reason: String,
    pub tracked_part: Option<DetectionClass>,
    pub locked_box: Option<Rect>,
    pub locked_height: f64,
    pub visibility: f64,
    pub tip_detected: bool,
    pub engaged: bool,
    pub close_up: bool,
    pub proxy_tracking: bool,
    pub tip: Streak,
    pub reference: Streak,
    pub midsection: Streak,
    pub touching: Vec<DetectionClass>,

    /// Share of the composite each contributing track carried, in percent.
    pub track_weights: Vec<(TrackKey, u8)>,
}

/// Distance decided before the composite step.
#[derive(Debug, Clone, Copy, PartialEq)]
enum RawDistance {
    Unset,
    /// No measurement; extrapolate from recent output.
    Predict,
    Value(f64),
}

impl From<Option<f64>> for RawDistance {
    fn from(value: Option<f64>) -> Self {
        value.map_or(Self::Predict, Self::Value)
    }
}

/// Stateful tracker fed one frame of detections at a time, in frame order.
pub struct ContactTracker {
    config: TrackerConfig,
    ctx: TrackingContext,
    lock_frames: f64,
    max_move: f64,
    max_speed: f64,

    locked: LockedReferenceBox,
    tip: Streak,
    reference: Streak,
    midsection: Streak,
    last_reference: Option<Rect>,
    reference_seen: bool,

    /// Contact is ongoing; keeps the locked box alive through occlusion.
    engaged: bool,
    tip_detected: bool,
    proxy_tracking: bool,
    close_up: bool,
    tracked_part: Option<DetectionClass>,

    tracks: HashMap<TrackKey, TrackSignals>,
    modes: ModeHistory,

    distance: u8,
    previous: [f64; 3],
}

impl ContactTracker {
    pub fn new(config: TrackerConfig, ctx: TrackingContext) -> Self {
        let lock_frames = config.lock_frames(&ctx);
        let max_move = config.max_move_per_frame(&ctx);
        let max_speed = config.max_speed(&ctx);
        let modes = ModeHistory::new(config.mode_history_len(&ctx));
        Self {
            config,
            ctx,
            lock_frames,
            max_move,
            max_speed,
            locked: LockedReferenceBox::new(),
            tip: Streak::default(),
            reference: Streak::default(),
            midsection: Streak::default(),
            last_reference: None,
            reference_seen: false,
            engaged: false,
            tip_detected: false,
            proxy_tracking: false,
            close_up: false,
            tracked_part: None,
            tracks: HashMap::new(),
            modes,
            distance: 100,
            previous: [100.0; 3],
        }
    }

    /// Advance by one frame. `boxes` should be sorted by class priority.
    pub fn process_frame(&mut self, frame_index: u64, boxes: &[DetectionBox]) -> FrameState {
        self.tip_detected = false;
        self.proxy_tracking = false;

        let confident: Vec<&DetectionBox> = boxes
            .iter()
            .filter(|b| b.confidence > self.config.min_confidence)
            .collect();
        let tip = best_of(&confident, DetectionClass::Tip);
        let reference = best_of(&confident, DetectionClass::Reference);
        let midsection = best_of(&confident, DetectionClass::Midsection);
        self.tip.record(tip.is_some());
        self.reference.record(reference.is_some());
        self.midsection.record(midsection.is_some());

        if tip.is_some() && self.tip.trusted(self.lock_frames) {
            self.tip_detected = true;
            if let Some(last) = self.last_reference {
                self.locked.reanchor(last);
            }
            if self.engaged {
                debug!(frame = frame_index, "Tip visible, contact ended");
                self.engaged = false;
            }
        }

        if let Some(observed) = reference {
            self.observe_reference(frame_index, observed.rect);
        }

        let release_after = self.lock_frames * self.config.release_multiplier;
        if self.reference.misses as f64 > release_after && !self.engaged && self.locked.active {
            self.locked.deactivate();
            info!(frame = frame_index, "Released locked reference box");
        }

        if self.locked.active && self.locked.visibility < 100.0 && !self.tip_detected {
            self.engaged = true;
        }

        if let Some(reason) = self.close_up_reason(&confident) {
            if !self.close_up {
                info!(frame = frame_index, reason, "Close up detected");
                self.close_up = true;
            }
            self.modes.vote(frame_index, InteractionMode::CloseUp, reason);
            self.engaged = false;
            self.update_distance(Some(100.0));
            return self.snapshot(frame_index, Vec::new(), Vec::new());
        }
        self.close_up = false;

        let mut touching: Vec<DetectionClass> = Vec::new();
        let mut contacts: Vec<TrackKey> = Vec::new();
        let mut proxy: Option<f64> = None;

        if let (true, Some(locked_rect)) = (self.locked.active, self.locked.rect) {
            for det in boxes {
                if matches!(
                    det.class,
                    DetectionClass::Tip
                        | DetectionClass::Midsection
                        | DetectionClass::HipAnchor
                        | DetectionClass::RearDetail
                ) {
                    continue;
                }
                let key = TrackKey::new(det.class, det.track_id);
                let overlaps = det.rect.overlaps(&locked_rect);

                if det.class == DetectionClass::Torso && !overlaps {
                    proxy = Some(self.track(key).push_position(det.rect.mid_y().floor()));
                    continue;
                }
                if !overlaps {
                    continue;
                }
                if det.class.is_limb()
                    && det.rect.overlap_pct(&locked_rect) < self.config.near_miss_overlap_pct
                {
                    continue;
                }

                if !touching.contains(&det.class) {
                    touching.push(det.class);
                }
                if !contacts.contains(&key) {
                    contacts.push(key);
                }

                let y = if det.class == DetectionClass::Reference {
                    det.rect.mid_y().floor()
                } else {
                    det.rect.y2
                };
                let distance = self.distance_to_base(det, locked_rect);
                let signals = self.track(key);
                signals.push_position(y);
                signals.push_distance(distance);
            }
        }

        let raw = self.classify(frame_index, &mut touching, proxy);
        let (raw, track_weights) = self.composite(raw, &touching, &contacts, proxy);

        match raw {
            RawDistance::Predict => self.update_distance(None),
            RawDistance::Value(v) => self.update_distance(Some(v)),
            RawDistance::Unset => self.update_distance(Some(100.0)),
        };

        self.snapshot(frame_index, touching, track_weights)
    }

    fn observe_reference(&mut self, frame_index: u64, observed: Rect) {
        self.last_reference = Some(observed);
        self.reference_seen = true;
        if !self.reference.trusted(self.lock_frames) {
            return;
        }
        if self.locked.active {
            self.locked.follow(observed, self.max_move, &self.config);
        } else {
            self.locked.lock(observed);
            debug!(
                frame = frame_index,
                height = observed.height(),
                "Locked reference box"
            );
        }
    }

    fn close_up_reason(&self, confident: &[&DetectionBox]) -> Option<&'static str> {
        let frame_area = self.ctx.frame_area();
        let rear_limit = self.config.close_up_area(&self.ctx) * frame_area;
        let front_limit = self.config.front_close_up_area * frame_area;

        let regions = |class| confident.iter().filter(move |b| b.class == class);
        for front in regions(DetectionClass::FrontRegion) {
            for rear in regions(DetectionClass::RearRegion) {
                if !front.rect.overlaps(&rear.rect) {
                    continue;
                }
                if rear.rect.area() > rear_limit {
                    return Some("rear region beyond close-up size");
                }
                if !self.reference_seen {
                    return Some("regions overlap with no reference");
                }
            }
            if front.rect.area() > front_limit && !self.reference_seen {
                return Some("large front region with no reference");
            }
        }
        None
    }

    /// Contact distance of one box relative to the locked base, 0..=100.
    fn distance_to_base(&self, det: &DetectionBox, locked: Rect) -> f64 {
        if det.class == DetectionClass::Reference {
            return self.locked.visibility.clamp(0.0, 100.0);
        }
        let low_y = if det.class == DetectionClass::RearRegion {
            det.rect.y1 + self.config.rear_low_fraction * det.rect.height()
        } else {
            det.rect.y2
        };
        let factor = if det.class.is_limb() {
            self.config.limb_height_factor
        } else {
            self.config.region_height_factor
        };
        let height = self.locked.height * factor;
        if height <= 0.0 {
            return 0.0;
        }
        let base = locked.y2 - height * self.config.base_lift;
        ((base - low_y) / height * 100.0).trunc().clamp(0.0, 100.0)
    }

    /// Vote the frame's mode; first matching rule wins.
    fn classify(
        &mut self,
        frame_index: u64,
        touching: &mut Vec<DetectionClass>,
        proxy: Option<f64>,
    ) -> RawDistance {
        use DetectionClass::*;

        let previous_mode = self.modes.current();
        let has = |touching: &[DetectionClass], class| touching.contains(&class);

        if !self.locked.active {
            self.engaged = false;
            self.tracked_part = None;
            self.modes.vote(
                frame_index,
                InteractionMode::NotRelevant,
                "nothing touching, no reference",
            );
            return RawDistance::Value(100.0);
        }

        if touching.is_empty() && !self.tip_detected && self.engaged {
            self.proxy_tracking = true;
            self.tracked_part = Some(Torso);
            self.modes.vote(
                frame_index,
                InteractionMode::FrontContact,
                "torso visible while front region is not",
            );
            return proxy.into();
        }

        if has(touching, FrontRegion) && !self.tip_detected {
            if previous_mode == InteractionMode::FrontContact {
                touching.retain(|c| *c != Hand);
                self.engaged = true;
            }
            self.tracked_part = Some(FrontRegion);
            self.modes.vote(
                frame_index,
                InteractionMode::FrontContact,
                "front region visible and touching",
            );
        } else if has(touching, RearRegion) && !self.tip_detected {
            if previous_mode == InteractionMode::RearContact {
                touching.retain(|c| *c != Hand);
                self.engaged = true;
            }
            self.tracked_part = Some(RearRegion);
            self.modes.vote(
                frame_index,
                InteractionMode::RearContact,
                "rear region visible and touching",
            );
        } else if (has(touching, Hand) || has(touching, Face)) && !self.engaged {
            if !has(touching, Face) {
                self.tracked_part = Some(Hand);
            }
            self.modes.vote(
                frame_index,
                InteractionMode::HandOrFace,
                "hand or face visible and touching",
            );
        } else if has(touching, Foot) && !self.engaged {
            self.modes
                .vote(frame_index, InteractionMode::Foot, "foot visible and touching");
        } else if has(touching, Torso) && !self.engaged {
            self.tracked_part = Some(Torso);
            self.modes
                .vote(frame_index, InteractionMode::Torso, "torso visible and touching");
        }
        RawDistance::Unset
    }

    /// Weighted blend of every contributing track's distance and position.
    fn composite(
        &mut self,
        raw: RawDistance,
        touching: &[DetectionClass],
        contacts: &[TrackKey],
        proxy: Option<f64>,
    ) -> (RawDistance, Vec<(TrackKey, u8)>) {
        let limb_touching = touching.iter().any(|c| c.is_limb());
        let position_weight = self.config.position_weight;

        let mut sum = 0.0;
        let mut total_weight = 0.0;
        let mut contributing = Vec::new();
        for key in contacts {
            // The reference box is unreliable while a limb occludes it.
            if key.class == DetectionClass::Reference && limb_touching {
                continue;
            }
            let Some(signals) = self.tracks.get(key) else {
                continue;
            };
            let (Some(distance), Some(position)) =
                (signals.last_distance(), signals.last_position())
            else {
                continue;
            };
            let weight = signals.weight();
            sum += ((distance + position_weight * position) / (1.0 + position_weight)).floor()
                * weight;
            total_weight += weight;
            contributing.push((*key, weight));
        }

        let track_weights = if total_weight > 0.0 {
            contributing
                .into_iter()
                .map(|(key, w)| (key, (w / total_weight * 100.0) as u8))
                .collect()
        } else {
            Vec::new()
        };

        let mode = self.modes.current();
        let raw = if total_weight > 0.0 && !mode.is_idle() {
            RawDistance::Value((sum / total_weight).trunc())
        } else if total_weight == 0.0
            && mode == InteractionMode::FrontContact
            && !touching.contains(&DetectionClass::FrontRegion)
            && proxy.is_some_and(|p| p != 0.0)
        {
            self.proxy_tracking = true;
            RawDistance::from(proxy)
        } else {
            raw
        };
        (raw, track_weights)
    }

    /// EMA over recent output plus a per-frame speed clamp.
    fn update_distance(&mut self, raw: Option<f64>) -> u8 {
        let [p0, p1, p2] = self.previous;
        let filtered = match raw {
            None => ema3(p0, p1, p2),
            Some(raw) => {
                let ema = ema3(p1, p2, raw);
                let current = self.distance as f64;
                if (ema - current).abs() > self.max_speed {
                    current + (ema - current).signum() * self.max_speed
                } else {
                    ema
                }
            }
        };
        self.distance = filtered.clamp(0.0, 100.0) as u8;
        self.previous = [p1, p2, self.distance as f64];
        self.distance
    }

    fn track(&mut self, key: TrackKey) -> &mut TrackSignals {
        let (cap, window) = (self.config.position_history, self.config.signal_window);
        self.tracks
            .entry(key)
            .or_insert_with(|| TrackSignals::new(cap, window))
    }

    fn snapshot(
        &self,
        frame_index: u64,
        touching: Vec<DetectionClass>,
        track_weights: Vec<(TrackKey, u8)>,
    ) -> FrameState {
        FrameState {
            frame_index,
            distance: self.distance,
            mode: self.modes.current(),
            mode_reason: self.modes.reason().to_string(),
            tracked_part: self.tracked_part,
            locked_box: self.locked.rect,
            locked_height: self.locked.height,
            visibility: self.locked.visibility,
            tip_detected: self.tip_detected,
            engaged: self.engaged,
            close_up: self.close_up,
            proxy_tracking: self.proxy_tracking,
            tip: self.tip,
            reference: self.reference,
            midsection: self.midsection,
            touching,
            track_weights,
        }
    }

    pub fn distance(&self) -> u8 {
        self.distance
    }

    pub fn locked_box(&self) -> &LockedReferenceBox {
        &self.locked
    }

    pub fn mode_changes(&self) -> &[ModeChange] {
        self.modes.changes()
    }

    pub fn into_mode_changes(self) -> Vec<ModeChange> {
        self.modes.into_changes()
    }
}

/// Most confident box of `class`; the first one wins ties.
fn best_of<'a>(boxes: &[&'a DetectionBox], class: DetectionClass) -> Option<&'a DetectionBox> {
    let mut best: Option<&'a DetectionBox> = None;
    for &candidate in boxes.iter().filter(|b| b.class == class) {
        if best.map_or(true, |b| candidate.confidence > b.confidence) {
            best = Some(candidate);
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> TrackingContext {
        TrackingContext {
            fps: 30.0,
            frame_width: 1000,
            frame_height: 1000,
            total_frames: 1000,
            panoramic: false,
        }
    }

    fn tracker() -> ContactTracker {
        ContactTracker::new(TrackerConfig::default(), ctx())
    }

    fn det(class: DetectionClass, x1: f64, y1: f64, x2: f64, y2: f64) -> DetectionBox {
        DetectionBox::new(Rect::new(x1, y1, x2, y2), 0.9, class, 1)
    }

    fn reference() -> DetectionBox {
        det(DetectionClass::Reference, 400.0, 400.0, 600.0, 800.0)
    }

    #[test]
    fn test_locks_after_consecutive_detections() {
        let mut tracker = tracker();
        let first = tracker.process_frame(0, &[reference()]);
        assert!(first.locked_box.is_none());
        assert_eq!(first.distance, 100);
        assert_eq!(first.mode, InteractionMode::NotRelevant);

        tracker.process_frame(1, &[reference()]);
        let third = tracker.process_frame(2, &[reference()]);
        assert!(tracker.locked_box().active);
        assert_eq!(third.locked_height, 400.0);
        assert_eq!(third.reference.hits, 3);
    }

    #[test]
    fn test_low_confidence_is_ignored() {
        let mut tracker = tracker();
        let mut weak = reference();
        weak.confidence = 0.3;
        for i in 0..10 {
            tracker.process_frame(i, &[weak.clone()]);
        }
        assert!(!tracker.locked_box().active);
    }

    #[test]
    fn test_releases_after_long_absence() {
        let mut tracker = tracker();
        for i in 0..3 {
            tracker.process_frame(i, &[reference()]);
        }
        // K = 3, release after more than 90 misses.
        for i in 3..93 {
            tracker.process_frame(i, &[]);
        }
        assert!(tracker.locked_box().active);
        tracker.process_frame(93, &[]);
        assert!(!tracker.locked_box().active);
    }

    #[test]
    fn test_engaged_contact_survives_absence() {
        let mut tracker = tracker();
        for i in 0..3 {
            tracker.process_frame(i, &[reference()]);
        }
        let half = det(DetectionClass::Reference, 400.0, 600.0, 600.0, 800.0);
        let state = tracker.process_frame(3, &[half]);
        assert!(state.engaged);
        assert_eq!(state.visibility, 37.0);

        for i in 4..300 {
            tracker.process_frame(i, &[]);
        }
        assert!(tracker.locked_box().active);
    }

    #[test]
    fn test_tip_ends_contact() {
        let mut tracker = tracker();
        for i in 0..3 {
            tracker.process_frame(i, &[reference()]);
        }
        let half = det(DetectionClass::Reference, 400.0, 600.0, 600.0, 800.0);
        assert!(tracker.process_frame(3, &[half.clone()]).engaged);

        let tip = det(DetectionClass::Tip, 450.0, 580.0, 550.0, 620.0);
        let mut state = tracker.process_frame(4, &[half.clone(), tip.clone()]);
        assert!(!state.tip_detected);
        for i in 5..7 {
            state = tracker.process_frame(i, &[half.clone(), tip.clone()]);
        }
        assert!(state.tip_detected);
        assert!(!state.engaged);
        assert_eq!(state.locked_height, 400.0);
    }

    #[test]
    fn test_large_rear_region_is_close_up() {
        let mut tracker = tracker();
        let front = det(DetectionClass::FrontRegion, 300.0, 300.0, 500.0, 500.0);
        let rear = det(DetectionClass::RearRegion, 0.0, 0.0, 800.0, 800.0);
        let state = tracker.process_frame(0, &[front, rear]);
        assert!(state.close_up);
        assert_eq!(state.mode, InteractionMode::CloseUp);
        assert_eq!(state.distance, 100);
        assert!(state.touching.is_empty());
    }

    #[test]
    fn test_front_region_without_reference_is_close_up() {
        let mut tracker = tracker();
        let front = det(DetectionClass::FrontRegion, 0.0, 0.0, 400.0, 400.0);
        assert!(tracker.process_frame(0, &[front.clone()]).close_up);

        // Once a reference has been seen the same box is ordinary.
        for i in 1..4 {
            tracker.process_frame(i, &[reference()]);
        }
        assert!(!tracker.process_frame(4, &[front]).close_up);
    }

    #[test]
    fn test_hand_near_miss_is_not_contact() {
        let mut tracker = tracker();
        for i in 0..3 {
            tracker.process_frame(i, &[reference()]);
        }
        let hand = det(DetectionClass::Hand, 590.0, 700.0, 790.0, 800.0);
        let state = tracker.process_frame(3, &[reference(), hand]);
        assert_eq!(state.touching, vec![DetectionClass::Reference]);
    }

    #[test]
    fn test_front_contact_drives_distance() {
        let mut tracker = tracker();
        for i in 0..3 {
            tracker.process_frame(i, &[reference()]);
        }

        let mut distances = Vec::new();
        let mut last = None;
        for i in 3..120u64 {
            let y2 = if (i / 10) % 2 == 0 { 500.0 } else { 700.0 };
            let front = det(DetectionClass::FrontRegion, 420.0, y2 - 150.0, 580.0, y2);
            let state = tracker.process_frame(i, &[reference(), front]);
            distances.push(state.distance);
            last = Some(state);
        }

        let last = last.unwrap();
        assert_eq!(last.mode, InteractionMode::FrontContact);
        assert_eq!(last.tracked_part, Some(DetectionClass::FrontRegion));
        assert!(distances.iter().all(|d| *d <= 100));
        assert!(*distances.iter().min().unwrap() < 50);
        assert!(*distances.iter().max().unwrap() > 60);
        assert!(tracker
            .mode_changes()
            .iter()
            .any(|c| c.mode == InteractionMode::FrontContact));
    }

    #[test]
    fn test_distance_is_speed_limited() {
        let mut tracker = tracker();
        // max_speed at 30 fps is about 18.5 per frame.
        assert_eq!(tracker.update_distance(Some(0.0)), 81);
        assert_eq!(tracker.update_distance(None), 86);
    }
}
