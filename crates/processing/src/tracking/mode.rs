//! Interaction modes and the majority-vote history that smooths them.

use std::collections::VecDeque;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// What kind of contact the tracker currently believes is happening.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionMode {
    #[default]
    NotRelevant,
    CloseUp,
    FrontContact,
    RearContact,
    HandOrFace,
    Foot,
    Torso,
}

impl InteractionMode {
    pub fn label(self) -> &'static str {
        match self {
            Self::NotRelevant => "Not relevant",
            Self::CloseUp => "Close up",
            Self::FrontContact => "Front contact",
            Self::RearContact => "Rear contact",
            Self::HandOrFace => "Hand or face",
            Self::Foot => "Foot",
            Self::Torso => "Torso",
        }
    }

    /// Modes with no contact to measure.
    pub fn is_idle(self) -> bool {
        matches!(self, Self::NotRelevant | Self::CloseUp)
    }
}

impl fmt::Display for InteractionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A change of the smoothed mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModeChange {
    pub frame_index: u64,
    pub mode: InteractionMode,
    pub reason: String,
}

/// Sliding window of per-frame mode votes.
#[derive(Debug, Clone)]
pub struct ModeHistory {
    votes: VecDeque<InteractionMode>,
    capacity: usize,
    current: InteractionMode,
    reason: String,
    changes: Vec<ModeChange>,
}

impl ModeHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            votes: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
            current: InteractionMode::NotRelevant,
            reason: String::new(),
            changes: Vec::new(),
        }
    }

    /// Add a vote and return the resulting majority mode.
    pub fn vote(
        &mut self,
        frame_index: u64,
        mode: InteractionMode,
        reason: impl Into<String>,
    ) -> InteractionMode {
        if self.votes.len() == self.capacity {
            self.votes.pop_front();
        }
        self.votes.push_back(mode);

        let winner = self.majority();
        if winner != self.current {
            let reason = reason.into();
            debug!(
                frame = frame_index,
                from = %self.current,
                to = %winner,
                reason = %reason,
                "Interaction mode changed"
            );
            self.current = winner;
            self.reason = reason.clone();
            self.changes.push(ModeChange {
                frame_index,
                mode: winner,
                reason,
            });
        }
        self.current
    }

    /// Most frequent vote; ties go to the mode that entered the window first.
    fn majority(&self) -> InteractionMode {
        let mut counts: Vec<(InteractionMode, usize)> = Vec::new();
        for &mode in &self.votes {
            match counts.iter_mut().find(|(m, _)| *m == mode) {
                Some((_, n)) => *n += 1,
                None => counts.push((mode, 1)),
            }
        }
        let mut best = (self.current, 0);
        for (mode, n) in counts {
            if n > best.1 {
                best = (mode, n);
            }
        }
        best.0
    }

    pub fn current(&self) -> InteractionMode {
        self.current
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn changes(&self) -> &[ModeChange] {
        &self.changes
    }

    pub fn into_changes(self) -> Vec<ModeChange> {
        self.changes
    }
}
