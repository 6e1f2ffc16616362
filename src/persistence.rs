//! RON file helpers shared by the tuning loader and the best-time save file.
//!
//! Everything here returns `PersistError`; callers decide whether a failure means "fall back to
//! defaults" (tuning) or "start with an empty record" (save data). Nothing in gameplay treats a
//! persistence failure as fatal.

use std::fs;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("i/o error on '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("could not parse '{path}': {source}")]
    Parse {
        path: String,
        #[source]
        source: ron::error::SpannedError,
    },
    #[error("could not serialize data for '{path}': {source}")]
    Serialize {
        path: String,
        #[source]
        source: ron::Error,
    },
}

pub fn load_ron<T: DeserializeOwned>(path: &Path) -> Result<T, PersistError> {
    let display = path.display().to_string();
    let text = fs::read_to_string(path).map_err(|source| PersistError::Io {
        path: display.clone(),
        source,
    })?;

    ron::from_str(&text).map_err(|source| PersistError::Parse {
        path: display,
        source,
    })
}

/// Writes `value` as pretty RON, creating parent directories as needed.
pub fn save_ron<T: Serialize>(path: &Path, value: &T) -> Result<(), PersistError> {
    let display = path.display().to_string();

    let text = ron::ser::to_string_pretty(value, ron::ser::PrettyConfig::default()).map_err(
        |source| PersistError::Serialize {
            path: display.clone(),
            source,
        },
    )?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| PersistError::Io {
            path: display.clone(),
            source,
        })?;
    }

    fs::write(path, text).map_err(|source| PersistError::Io {
        path: display,
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let result: Result<Vec<f32>, _> = load_ron(&dir.path().join("nope.ron"));
        assert!(matches!(result, Err(PersistError::Io { .. })));
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.ron");
        fs::write(&path, "[1.0, oops").unwrap();

        let result: Result<Vec<f32>, _> = load_ron(&path);
        assert!(matches!(result, Err(PersistError::Parse { .. })));
    }

    #[test]
    fn save_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/deeper/times.ron");

        save_ron(&path, &vec![1.5_f32, 2.25]).unwrap();
        let loaded: Vec<f32> = load_ron(&path).unwrap();
        assert_eq!(loaded, vec![1.5, 2.25]);
    }
}
