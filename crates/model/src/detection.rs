//! Detection classes, boxes, and the compact persisted record.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Axis-aligned rectangle in detection-frame pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl Rect {
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> f64 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f64 {
        self.y2 - self.y1
    }

    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    pub fn mid_y(&self) -> f64 {
        (self.y1 + self.y2) / 2.0
    }

    /// Whether the rectangles touch or intersect. Shared edges count.
    pub fn overlaps(&self, other: &Rect) -> bool {
        !(self.x2 < other.x1 || other.x2 < self.x1 || self.y2 < other.y1 || other.y2 < self.y1)
    }

    /// Area of the intersection, zero when disjoint.
    pub fn intersection_area(&self, other: &Rect) -> f64 {
        let w = self.x2.min(other.x2) - self.x1.max(other.x1);
        let h = self.y2.min(other.y2) - self.y1.max(other.y1);
        if w <= 0.0 || h <= 0.0 {
            return 0.0;
        }
        w * h
    }

    /// Percentage of this rectangle's area covered by `other`.
    pub fn overlap_pct(&self, other: &Rect) -> f64 {
        let area = self.area();
        if area <= 0.0 {
            return 0.0;
        }
        self.intersection_area(other) / area * 100.0
    }
}

/// The fixed detector vocabulary.
///
/// Ids are the detector's class indices and are what the detection log stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionClass {
    /// Primary tracked object; its stabilized box anchors every distance.
    Reference,
    /// Marker signalling the reference object is fully extended.
    Tip,
    /// Secondary region whose contact selects the front mode.
    FrontRegion,
    /// Large containing region whose contact selects the rear mode.
    RearRegion,
    RearDetail,
    /// Proxy region used while every contact is occluded.
    Torso,
    Midsection,
    Hand,
    Face,
    Foot,
    HipAnchor,
}

impl DetectionClass {
    pub const ALL: [DetectionClass; 11] = [
        DetectionClass::Reference,
        DetectionClass::Tip,
        DetectionClass::FrontRegion,
        DetectionClass::RearRegion,
        DetectionClass::RearDetail,
        DetectionClass::Torso,
        DetectionClass::Midsection,
        DetectionClass::Hand,
        DetectionClass::Face,
        DetectionClass::Foot,
        DetectionClass::HipAnchor,
    ];

    pub fn id(self) -> u8 {
        match self {
            Self::Reference => 0,
            Self::Tip => 1,
            Self::FrontRegion => 2,
            Self::RearRegion => 3,
            Self::RearDetail => 4,
            Self::Torso => 5,
            Self::Midsection => 6,
            Self::Hand => 7,
            Self::Face => 8,
            Self::Foot => 9,
            Self::HipAnchor => 10,
        }
    }

    pub fn from_id(id: u8) -> Option<Self> {
        Self::ALL.get(id as usize).copied()
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Reference => "reference",
            Self::Tip => "tip",
            Self::FrontRegion => "front_region",
            Self::RearRegion => "rear_region",
            Self::RearDetail => "rear_detail",
            Self::Torso => "torso",
            Self::Midsection => "midsection",
            Self::Hand => "hand",
            Self::Face => "face",
            Self::Foot => "foot",
            Self::HipAnchor => "hip_anchor",
        }
    }

    /// Sort key for a frame's boxes: lower is analyzed first.
    pub fn priority(self) -> u8 {
        match self {
            Self::Tip => 0,
            Self::Reference => 1,
            Self::Torso => 2,
            Self::Midsection => 3,
            Self::FrontRegion => 4,
            Self::RearRegion => 5,
            Self::Face => 6,
            Self::Hand | Self::Foot | Self::RearDetail | Self::HipAnchor => 7,
        }
    }

    /// Limb-like classes get a tighter reference height and a near-miss filter.
    pub fn is_limb(self) -> bool {
        matches!(self, Self::Hand | Self::Foot)
    }
}

impl fmt::Display for DetectionClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DetectionClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace([' ', '-'], "_");
        Self::ALL
            .iter()
            .copied()
            .find(|class| class.name() == normalized)
            .ok_or_else(|| format!("unknown detection class: {s}"))
    }
}

/// One detector output for one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionBox {
    pub rect: Rect,

    /// Detector confidence in `[0, 1]`.
    pub confidence: f64,

    pub class: DetectionClass,

    /// Stable object identity from the detector, 0 when it has none.
    pub track_id: u32,
}

impl DetectionBox {
    pub fn new(rect: Rect, confidence: f64, class: DetectionClass, track_id: u32) -> Self {
        Self {
            rect,
            confidence,
            class,
            track_id,
        }
    }
}

/// Sort a frame's boxes by class priority, most confident first within a class.
pub fn sort_by_priority(boxes: &mut [DetectionBox]) {
    boxes.sort_by(|a, b| {
        a.class
            .priority()
            .cmp(&b.class.priority())
            .then(a.class.id().cmp(&b.class.id()))
            .then(b.confidence.total_cmp(&a.confidence))
    });
}

type RecordTuple = (u64, u8, f64, i32, i32, i32, i32, u32);

/// Persisted detection: `(frame_index, class_id, confidence, x1, y1, x2, y2, track_id)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "RecordTuple", into = "RecordTuple")]
pub struct DetectionRecord {
    pub frame_index: u64,
    pub class_id: u8,
    pub confidence: f64,
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
    pub track_id: u32,
}

impl DetectionRecord {
    /// Flatten a detection; coordinates are truncated to whole pixels and
    /// confidence to two decimals.
    pub fn from_detection(frame_index: u64, detection: &DetectionBox) -> Self {
        Self {
            frame_index,
            class_id: detection.class.id(),
            confidence: (detection.confidence.clamp(0.0, 1.0) * 100.0).round() / 100.0,
            x1: detection.rect.x1 as i32,
            y1: detection.rect.y1 as i32,
            x2: detection.rect.x2 as i32,
            y2: detection.rect.y2 as i32,
            track_id: detection.track_id,
        }
    }

    pub fn class(&self) -> Option<DetectionClass> {
        DetectionClass::from_id(self.class_id)
    }

    pub fn rect(&self) -> Rect {
        Rect::new(self.x1 as f64, self.y1 as f64, self.x2 as f64, self.y2 as f64)
    }

    /// Rebuild the detection, `None` for class ids outside the vocabulary.
    pub fn to_detection(&self) -> Option<DetectionBox> {
        Some(DetectionBox::new(
            self.rect(),
            self.confidence,
            self.class()?,
            self.track_id,
        ))
    }
}

impl From<RecordTuple> for DetectionRecord {
    fn from(t: RecordTuple) -> Self {
        Self {
            frame_index: t.0,
            class_id: t.1,
            confidence: t.2,
            x1: t.3,
            y1: t.4,
            x2: t.5,
            y2: t.6,
            track_id: t.7,
        }
    }
}

impl From<DetectionRecord> for RecordTuple {
    fn from(r: DetectionRecord) -> Self {
        (
            r.frame_index,
            r.class_id,
            r.confidence,
            r.x1,
            r.y1,
            r.x2,
            r.y2,
            r.track_id,
        )
    }
}
