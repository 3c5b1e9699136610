//! Motion script file: the final `(at, pos)` keyframe track.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ModelError;
use crate::io::{read_json, write_json};
use crate::version::{version_is_less_than, SCRIPT_VERSION};

/// One keyframe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptAction {
    /// Milliseconds from the start of the video.
    pub at: u64,

    /// Position in `[0, 100]`.
    pub pos: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MotionScript {
    pub version: String,
    pub inverted: bool,
    pub range: u32,
    pub author: String,
    pub actions: Vec<ScriptAction>,
}

/// What already sits at a script destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExistingScript {
    Missing,
    /// Written by us; `outdated` when its version is older than ours.
    Ours { outdated: bool },
    /// Written by someone else, or not readable as a script.
    Foreign,
}

/// Result of copying a script to a secondary location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportOutcome {
    Written { backup: Option<PathBuf> },
    SkippedForeign,
}

impl MotionScript {
    /// Build a script from `(at_ms, pos)` points.
    ///
    /// Positions are clamped to `[0, 100]` and truncated, any point not
    /// strictly after its predecessor is dropped, and a `(0, 100)` anchor is
    /// prepended unless the first point is at 0.
    pub fn from_points<I>(author: impl Into<String>, points: I) -> Self
    where
        I: IntoIterator<Item = (f64, f64)>,
    {
        let mut actions: Vec<ScriptAction> = Vec::new();
        for (at, pos) in points {
            let at = at.max(0.0) as u64;
            let pos = pos.clamp(0.0, 100.0) as u8;
            if actions.is_empty() && at != 0 {
                actions.push(ScriptAction { at: 0, pos: 100 });
            }
            if actions.last().map_or(true, |last| at > last.at) {
                actions.push(ScriptAction { at, pos });
            }
        }
        if actions.is_empty() {
            actions.push(ScriptAction { at: 0, pos: 100 });
        }

        Self {
            version: SCRIPT_VERSION.to_string(),
            inverted: false,
            range: 100,
            author: author.into(),
            actions,
        }
    }

    /// Check strictly increasing timestamps and the position range.
    pub fn validate(&self) -> Result<(), ModelError> {
        for pair in self.actions.windows(2) {
            if pair[1].at <= pair[0].at {
                return Err(ModelError::validation(format!(
                    "action at {}ms does not follow {}ms",
                    pair[1].at, pair[0].at
                )));
            }
        }
        if let Some(action) = self.actions.iter().find(|a| a.pos > 100) {
            return Err(ModelError::validation(format!(
                "action at {}ms has position {}",
                action.at, action.pos
            )));
        }
        Ok(())
    }

    /// Duration covered by the script.
    pub fn duration_ms(&self) -> u64 {
        self.actions.last().map_or(0, |a| a.at)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ModelError> {
        let script: MotionScript = read_json(path.as_ref())?;
        script.validate()?;
        Ok(script)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ModelError> {
        self.validate()?;
        write_json(path.as_ref(), self, false)
    }

    /// Classify the file at `path` relative to `author`.
    pub fn inspect_existing(path: impl AsRef<Path>, author: &str) -> ExistingScript {
        let path = path.as_ref();
        if !path.exists() {
            return ExistingScript::Missing;
        }
        match read_json::<serde_json::Value>(path) {
            Ok(value) => {
                if value.get("author").and_then(|a| a.as_str()) != Some(author) {
                    return ExistingScript::Foreign;
                }
                let version = value.get("version").and_then(|v| v.as_str()).unwrap_or("0");
                ExistingScript::Ours {
                    outdated: version_is_less_than(version, SCRIPT_VERSION),
                }
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Unreadable script at destination");
                ExistingScript::Foreign
            }
        }
    }

    /// Write the script to `dest`, keeping foreign scripts untouched.
    ///
    /// When `dest` holds one of our scripts and `make_backup` is set, it is
    /// renamed to `<stem>_<timestamp>.funscript.bak` first.
    pub fn export_to(&self, dest: impl AsRef<Path>, make_backup: bool) -> Result<ExportOutcome, ModelError> {
        let dest = dest.as_ref();
        let backup = match Self::inspect_existing(dest, &self.author) {
            ExistingScript::Foreign => {
                tracing::warn!(path = %dest.display(), "Existing script is not ours, leaving it alone");
                return Ok(ExportOutcome::SkippedForeign);
            }
            ExistingScript::Ours { .. } if make_backup => {
                let backup = backup_path(dest);
                std::fs::rename(dest, &backup).map_err(|e| ModelError::IoError {
                    path: backup.clone(),
                    source: e,
                })?;
                tracing::info!(backup = %backup.display(), "Backed up previous script");
                Some(backup)
            }
            _ => None,
        };

        self.save(dest)?;
        Ok(ExportOutcome::Written { backup })
    }
}

fn backup_path(dest: &Path) -> PathBuf {
    let stem = dest
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "script".to_string());
    let timestamp = chrono::Local::now().format("%Y-%m-%d_%H-%M-%S%.3f");
    dest.with_file_name(format!("{stem}_{timestamp}.funscript.bak"))
}
