//! Hierarchical key-value archive for inputs and results.
//!
//! An [`Archive`] holds named groups, each a flat map of named datasets
//! (scalars, float arrays or text). Archives persist as pretty-printed JSON
//! so downstream tooling (plotting, comparison against ground truth) can read
//! them without linking against this crate.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from reading or writing archives.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Group '{0}' not found in archive")]
    MissingGroup(String),

    #[error("Dataset '{0}' not found in group")]
    MissingDataset(String),

    #[error("Dataset '{key}' is not a {expected}")]
    TypeMismatch { key: String, expected: &'static str },

    #[error("Invalid archive contents: {0}")]
    Invalid(String),
}

/// A single value stored under a key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Dataset {
    Scalar(f64),
    Array(Vec<f64>),
    Text(String),
}

impl From<f64> for Dataset {
    fn from(value: f64) -> Self {
        Dataset::Scalar(value)
    }
}

impl From<Vec<f64>> for Dataset {
    fn from(value: Vec<f64>) -> Self {
        Dataset::Array(value)
    }
}

impl From<String> for Dataset {
    fn from(value: String) -> Self {
        Dataset::Text(value)
    }
}

impl From<&str> for Dataset {
    fn from(value: &str) -> Self {
        Dataset::Text(value.to_owned())
    }
}

/// A named collection of datasets.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArchiveGroup {
    datasets: BTreeMap<String, Dataset>,
}

impl ArchiveGroup {
    /// Insert or overwrite a dataset.
    pub fn insert(&mut self, key: &str, value: impl Into<Dataset>) {
        self.datasets.insert(key.to_owned(), value.into());
    }

    pub fn contains(&self, key: &str) -> bool {
        self.datasets.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Result<&Dataset, ArchiveError> {
        self.datasets
            .get(key)
            .ok_or_else(|| ArchiveError::MissingDataset(key.to_owned()))
    }

    pub fn scalar(&self, key: &str) -> Result<f64, ArchiveError> {
        match self.get(key)? {
            Dataset::Scalar(v) => Ok(*v),
            _ => Err(ArchiveError::TypeMismatch {
                key: key.to_owned(),
                expected: "scalar",
            }),
        }
    }

    pub fn array(&self, key: &str) -> Result<&[f64], ArchiveError> {
        match self.get(key)? {
            Dataset::Array(v) => Ok(v),
            _ => Err(ArchiveError::TypeMismatch {
                key: key.to_owned(),
                expected: "array",
            }),
        }
    }

    pub fn text(&self, key: &str) -> Result<&str, ArchiveError> {
        match self.get(key)? {
            Dataset::Text(v) => Ok(v),
            _ => Err(ArchiveError::TypeMismatch {
                key: key.to_owned(),
                expected: "text",
            }),
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.datasets.keys().map(String::as_str)
    }
}

/// Top-level archive: a map from group name to group.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Archive {
    groups: BTreeMap<String, ArchiveGroup>,
}

impl Archive {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the named group, creating it if absent.
    pub fn require_group(&mut self, name: &str) -> &mut ArchiveGroup {
        self.groups.entry(name.to_owned()).or_default()
    }

    pub fn group(&self, name: &str) -> Result<&ArchiveGroup, ArchiveError> {
        self.groups
            .get(name)
            .ok_or_else(|| ArchiveError::MissingGroup(name.to_owned()))
    }

    pub fn group_names(&self) -> impl Iterator<Item = &str> {
        self.groups.keys().map(String::as_str)
    }

    /// Write the archive as JSON, creating parent directories as needed.
    pub fn save(&self, path: &Path) -> Result<(), ArchiveError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, ArchiveError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_group_is_idempotent() {
        let mut archive = Archive::new();
        archive.require_group("reconstruction").insert("a", 1.0);
        archive.require_group("reconstruction").insert("b", vec![1.0, 2.0]);

        let group = archive.group("reconstruction").unwrap();
        assert_eq!(group.scalar("a").unwrap(), 1.0);
        assert_eq!(group.array("b").unwrap(), &[1.0, 2.0]);
        assert_eq!(archive.group_names().count(), 1);
    }

    #[test]
    fn test_typed_access_errors() {
        let mut archive = Archive::new();
        let group = archive.require_group("g");
        group.insert("label", "fista");

        assert_eq!(group.text("label").unwrap(), "fista");
        assert!(matches!(
            group.scalar("label"),
            Err(ArchiveError::TypeMismatch { expected: "scalar", .. })
        ));
        assert!(matches!(
            group.array("missing"),
            Err(ArchiveError::MissingDataset(_))
        ));
        assert!(matches!(
            archive.group("other"),
            Err(ArchiveError::MissingGroup(_))
        ));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("archive.json");

        let mut archive = Archive::new();
        let group = archive.require_group("reconstruction");
        group.insert("amplitude", vec![0.0, -1.5, 2.25]);
        group.insert("time_step_coarse", 1e-3);
        group.insert("variant", "ista");

        archive.save(&path).unwrap();
        let loaded = Archive::load(&path).unwrap();
        assert_eq!(loaded, archive);
    }
}
