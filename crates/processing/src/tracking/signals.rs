//! Per-track position and distance buffers.

use std::collections::VecDeque;

use kinetrace_model::DetectionClass;
use serde::{Deserialize, Serialize};

/// Identity of a tracked object across frames.
///
/// Detector track ids are only unique within a class and may reset, so the
/// class is part of the key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TrackKey {
    pub class: DetectionClass,
    pub track_id: u32,
}

impl TrackKey {
    pub fn new(class: DetectionClass, track_id: u32) -> Self {
        Self { class, track_id }
    }
}

/// Three-tap smoothing applied once a buffer has history: `0.1, 0.2, 0.7`
/// over the two previous values and the new one.
pub(crate) fn ema3(prev2: f64, prev1: f64, current: f64) -> f64 {
    0.1 * prev2 + 0.2 * prev1 + 0.7 * current
}

/// Rolling buffers for one tracked object.
#[derive(Debug, Clone, Default)]
pub struct TrackSignals {
    positions: VecDeque<f64>,
    normalized: VecDeque<f64>,
    distances: VecDeque<f64>,
    position_cap: usize,
    window: usize,
}

impl TrackSignals {
    pub fn new(position_cap: usize, window: usize) -> Self {
        Self {
            positions: VecDeque::with_capacity(position_cap),
            normalized: VecDeque::with_capacity(window),
            distances: VecDeque::with_capacity(window),
            position_cap: position_cap.max(1),
            window: window.max(1),
        }
    }

    /// Record a raw vertical position and return its normalized value.
    ///
    /// 100 is the top of the observed range, 0 the bottom.
    pub fn push_position(&mut self, y: f64) -> f64 {
        let value = smoothed(&self.positions, y).floor();
        push_capped(&mut self.positions, value, self.position_cap);

        let (min, max) = self
            .positions
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            });
        let normalized = if max > min {
            (100.0 - (value - min) / (max - min) * 100.0)
                .clamp(0.0, 100.0)
                .floor()
        } else {
            100.0
        };
        push_capped(&mut self.normalized, normalized, self.window);
        normalized
    }

    /// Record a clamped distance sample.
    pub fn push_distance(&mut self, distance: f64) {
        let value = smoothed(&self.distances, distance);
        push_capped(&mut self.distances, value, self.window);
    }

    /// Total movement over the window; still objects weigh nothing.
    pub fn weight(&self) -> f64 {
        self.distances
            .iter()
            .zip(self.distances.iter().skip(1))
            .map(|(a, b)| (b - a).abs())
            .sum()
    }

    pub fn last_distance(&self) -> Option<f64> {
        self.distances.back().copied()
    }

    pub fn last_position(&self) -> Option<f64> {
        self.normalized.back().copied()
    }
}

fn smoothed(history: &VecDeque<f64>, value: f64) -> f64 {
    let n = history.len();
    if n > 2 {
        ema3(history[n - 2], history[n - 1], value)
    } else {
        value
    }
}

fn push_capped(buf: &mut VecDeque<f64>, value: f64, cap: usize) {
    if buf.len() == cap {
        buf.pop_front();
    }
    buf.push_back(value);
}
