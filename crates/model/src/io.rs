//! File helpers shared by the model's loaders and writers.

use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::ModelError;

pub(crate) fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, ModelError> {
    let content = std::fs::read_to_string(path).map_err(|e| ModelError::IoError {
        path: path.to_path_buf(),
        source: e,
    })?;
    serde_json::from_str(&content).map_err(|e| ModelError::ParseError {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Serialize `value` and replace `path` in one rename, so readers never see a
/// half-written file.
pub(crate) fn write_json<T: Serialize>(path: &Path, value: &T, pretty: bool) -> Result<(), ModelError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| ModelError::IoError {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }

    let json = if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    }
    .map_err(|e| ModelError::ParseError {
        path: path.to_path_buf(),
        source: e,
    })?;

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = std::path::PathBuf::from(tmp);

    std::fs::write(&tmp, json).map_err(|e| ModelError::IoError {
        path: tmp.clone(),
        source: e,
    })?;
    std::fs::rename(&tmp, path).map_err(|e| ModelError::IoError {
        path: path.to_path_buf(),
        source: e,
    })
}
