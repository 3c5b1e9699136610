//! Raw distance signal to motion script.
//!
//! # Steps
//!
//! 1. **Smooth** with a Savitzky–Golay filter (cubic, about a quarter second).
//! 2. **Simplify** with Visvalingam–Whyatt so the output stays editable.
//! 3. **Normalize** to exactly `[0, 100]`.
//! 4. **Threshold** values near the rails onto them.
//! 5. **Boost** peaks and lows, breaking any rail plateau this creates.
//! 6. **Round** to a step (by default only when simplifying).
//!
//! Every step can be turned off. Series shorter than three points pass
//! through untouched.

mod boost;
mod savgol;
mod simplify;

pub use boost::{boost_extrema, find_plateaus};
pub use savgol::{savgol_filter, smoothing_window};
pub use simplify::visvalingam_whyatt;

use std::str::FromStr;

use kinetrace_common::ScriptDefaults;
use kinetrace_model::{MotionScript, RawSample};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmoothingConfig {
    pub polyorder: usize,

    /// Fixed window; derived from the frame rate when `None`.
    pub window: Option<usize>,
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        Self {
            polyorder: 3,
            window: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimplifyConfig {
    /// Minimum triangle area (frames × position) a vertex needs to survive.
    pub factor: f64,
}

impl Default for SimplifyConfig {
    fn default() -> Self {
        Self { factor: 8.0 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    /// Values below this snap to 0.
    pub low: f64,
    /// Values above this snap to 100.
    pub high: f64,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            low: 10.0,
            high: 90.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoostConfig {
    pub up_pct: f64,
    pub down_pct: f64,
    pub max_flat_length: usize,
}

impl Default for BoostConfig {
    fn default() -> Self {
        Self {
            up_pct: 10.0,
            down_pct: 15.0,
            max_flat_length: 5,
        }
    }
}

/// When the rounding step applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rounding {
    /// Only together with simplification.
    #[default]
    WithSimplification,
    Always,
    Off,
}

impl FromStr for Rounding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "with-simplification" | "auto" => Ok(Self::WithSimplification),
            "always" => Ok(Self::Always),
            "off" | "none" => Ok(Self::Off),
            other => Err(format!("unknown rounding mode: {other}")),
        }
    }
}

/// Curve builder configuration. `None` disables a step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CurveConfig {
    pub smoothing: Option<SmoothingConfig>,
    pub simplify: Option<SimplifyConfig>,
    pub threshold: Option<ThresholdConfig>,
    pub boost: Option<BoostConfig>,
    pub rounding: Rounding,
    pub rounding_step: u32,
}

impl Default for CurveConfig {
    fn default() -> Self {
        Self {
            smoothing: Some(SmoothingConfig::default()),
            simplify: Some(SimplifyConfig::default()),
            threshold: Some(ThresholdConfig::default()),
            boost: Some(BoostConfig::default()),
            rounding: Rounding::default(),
            rounding_step: 5,
        }
    }
}

impl From<&ScriptDefaults> for CurveConfig {
    fn from(defaults: &ScriptDefaults) -> Self {
        Self {
            simplify: Some(SimplifyConfig {
                factor: defaults.simplify_factor,
            }),
            threshold: Some(ThresholdConfig {
                low: defaults.threshold_low,
                high: defaults.threshold_high,
            }),
            boost: Some(BoostConfig {
                up_pct: defaults.boost_up_pct,
                down_pct: defaults.boost_down_pct,
                ..BoostConfig::default()
            }),
            rounding_step: defaults.rounding_step,
            ..Self::default()
        }
    }
}

impl CurveConfig {
    /// Every step off; useful as a starting point.
    pub fn raw() -> Self {
        Self {
            smoothing: None,
            simplify: None,
            threshold: None,
            boost: None,
            rounding: Rounding::Off,
            rounding_step: 5,
        }
    }

    fn rounds(&self) -> bool {
        match self.rounding {
            Rounding::Always => true,
            Rounding::WithSimplification => self.simplify.is_some(),
            Rounding::Off => false,
        }
    }
}

/// Turns raw samples into script keyframes.
pub struct CurveBuilder {
    config: CurveConfig,
    fps: f64,
}

impl CurveBuilder {
    pub fn new(config: CurveConfig, fps: f64) -> Self {
        Self { config, fps }
    }

    /// Run every enabled step; returns `(at_ms, pos)` points.
    pub fn process(&self, samples: &[RawSample]) -> Vec<(f64, f64)> {
        let mut points: Vec<(f64, f64)> = samples
            .iter()
            .map(|s| (s.at_ms as f64, s.distance))
            .collect();
        if points.len() < 3 {
            return points;
        }

        if let Some(smoothing) = &self.config.smoothing {
            let window = match smoothing.window {
                Some(window) => Some(window),
                None => smoothing_window(self.fps, smoothing.polyorder, points.len()),
            };
            if let Some(window) = window {
                let values: Vec<f64> = points.iter().map(|p| p.1).collect();
                let smoothed = savgol_filter(&values, window, smoothing.polyorder);
                for (point, value) in points.iter_mut().zip(smoothed) {
                    point.1 = value;
                }
                debug!(window, "Smoothed raw signal");
            }
        }

        if let Some(simplify) = &self.config.simplify {
            let frames_per_ms = if self.fps > 0.0 { self.fps / 1000.0 } else { 1.0 };
            let scaled: Vec<(f64, f64)> = points
                .iter()
                .map(|&(at, pos)| (at * frames_per_ms, pos))
                .collect();
            let kept = visvalingam_whyatt(&scaled, simplify.factor);
            debug!(before = points.len(), after = kept.len(), "Simplified curve");
            points = kept.into_iter().map(|i| points[i]).collect();
        }

        let mut values: Vec<f64> = points.iter().map(|p| p.1).collect();
        normalize(&mut values);

        if let Some(threshold) = &self.config.threshold {
            for v in values.iter_mut() {
                if *v < threshold.low {
                    *v = 0.0;
                } else if *v > threshold.high {
                    *v = 100.0;
                }
            }
        }

        if let Some(boost) = &self.config.boost {
            boost_extrema(&mut values, boost.up_pct, boost.down_pct, boost.max_flat_length);
        }

        if self.config.rounds() && self.config.rounding_step > 0 {
            let step = self.config.rounding_step as f64;
            for v in values.iter_mut() {
                *v = (round_half_even(*v / step) * step).clamp(0.0, 100.0);
            }
        }

        points
            .iter()
            .zip(values)
            .map(|(&(at, _), pos)| (at, pos))
            .collect()
    }

    /// Build the final script.
    pub fn build(&self, samples: &[RawSample], author: &str) -> MotionScript {
        let points = self.process(samples);
        MotionScript::from_points(author, points)
    }
}

/// Nearest integer, ties to the even neighbour.
fn round_half_even(x: f64) -> f64 {
    if (x - x.trunc()).abs() == 0.5 {
        2.0 * (x / 2.0).round()
    } else {
        x.round()
    }
}

/// Min-max rescale onto `[0, 100]`; a flat series maps to 100.
fn normalize(values: &mut [f64]) {
    let (min, max) = values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    if !(max > min) {
        values.iter_mut().for_each(|v| *v = 100.0);
        return;
    }
    for v in values.iter_mut() {
        *v = (*v - min) / (max - min) * 100.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_script_defaults() {
        let defaults = ScriptDefaults {
            threshold_low: 5.0,
            rounding_step: 10,
            ..ScriptDefaults::default()
        };
        let config = CurveConfig::from(&defaults);
        assert_eq!(config.threshold.map(|t| t.low), Some(5.0));
        assert_eq!(config.rounding_step, 10);
        assert!(config.smoothing.is_some());
        assert_eq!("With_Simplification".parse::<Rounding>(), Ok(Rounding::WithSimplification));
        assert!("sometimes".parse::<Rounding>().is_err());
    }

    fn samples(points: &[(u64, f64)]) -> Vec<RawSample> {
        points.iter().map(|&(at, d)| RawSample::new(at, d)).collect()
    }

    #[test]
    fn test_threshold_and_rounding_scenario() {
        let config = CurveConfig {
            threshold: Some(ThresholdConfig::default()),
            rounding: Rounding::Always,
            ..CurveConfig::raw()
        };
        let builder = CurveBuilder::new(config, 25.0);
        let raw = samples(&[(0, 50.0), (40, 52.0), (80, 90.0), (120, 10.0)]);

        let points = builder.process(&raw);
        assert_eq!(
            points,
            vec![(0.0, 50.0), (40.0, 50.0), (80.0, 100.0), (120.0, 0.0)]
        );

        let script = builder.build(&raw, "tester");
        assert_eq!(script.actions.len(), 4);
        assert_eq!(script.actions[0].at, 0);
    }

    #[test]
    fn test_round_half_even() {
        assert_eq!(round_half_even(10.5), 10.0);
        assert_eq!(round_half_even(11.5), 12.0);
        assert_eq!(round_half_even(0.5), 0.0);
        assert_eq!(round_half_even(10.4), 10.0);
        assert_eq!(round_half_even(10.6), 11.0);
    }

    #[test]
    fn test_rounding_ties_go_to_even_step() {
        let config = CurveConfig {
            rounding: Rounding::Always,
            ..CurveConfig::raw()
        };
        // Normalizes to 0, 12.5, 37.5, 100.
        let raw = samples(&[(0, 0.0), (100, 12.5), (200, 37.5), (300, 100.0)]);
        let points = CurveBuilder::new(config, 10.0).process(&raw);
        let values: Vec<f64> = points.iter().map(|p| p.1).collect();
        assert_eq!(values, vec![0.0, 10.0, 40.0, 100.0]);
    }

    #[test]
    fn test_short_input_passes_through() {
        let builder = CurveBuilder::new(CurveConfig::default(), 30.0);
        let raw = samples(&[(0, 120.0), (33, -5.0)]);
        assert_eq!(builder.process(&raw), vec![(0.0, 120.0), (33.0, -5.0)]);
        assert!(builder.process(&[]).is_empty());
    }

    #[test]
    fn test_rounding_follows_simplification_by_default() {
        let raw = samples(&[(0, 0.0), (100, 33.0), (200, 100.0), (300, 0.0)]);

        let plain = CurveBuilder::new(CurveConfig::raw(), 10.0).process(&raw);
        assert_eq!(plain[1].1, 33.0);

        let config = CurveConfig {
            rounding: Rounding::WithSimplification,
            simplify: Some(SimplifyConfig { factor: 0.0 }),
            ..CurveConfig::raw()
        };
        let rounded = CurveBuilder::new(config, 10.0).process(&raw);
        assert_eq!(rounded[1].1, 35.0);
    }

    #[test]
    fn test_flat_signal_normalizes_to_top() {
        let raw = samples(&[(0, 40.0), (100, 40.0), (200, 40.0)]);
        let points = CurveBuilder::new(CurveConfig::raw(), 10.0).process(&raw);
        assert!(points.iter().all(|p| p.1 == 100.0));
    }

    #[test]
    fn test_defaults_produce_valid_script() {
        let raw: Vec<RawSample> = (0..600u64)
            .map(|i| {
                let phase = (i as f64 / 15.0).sin();
                RawSample::from_frame(i, 30.0, 50.0 + 45.0 * phase)
            })
            .collect();
        let builder = CurveBuilder::new(CurveConfig::default(), 30.0);
        let script = builder.build(&raw, "tester");

        assert!(script.validate().is_ok());
        assert!(script.actions.len() < raw.len());
        assert!(script.actions.iter().all(|a| a.pos <= 100));
        assert!(script.actions.iter().all(|a| a.pos % 5 == 0));
    }
}
