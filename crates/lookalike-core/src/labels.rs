//! Class index → display name mapping, loaded once at startup.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LabelMapError {
    #[error("label map not found: {0}")]
    NotFound(String),
    #[error("failed to read label map: {0}")]
    Io(#[from] std::io::Error),
    #[error("label map is not a JSON object of index → name: {0}")]
    Json(#[from] serde_json::Error),
    #[error("label map key {0:?} is not a class index")]
    InvalidIndex(String),
    #[error("label map index {0} appears more than once")]
    DuplicateIndex(usize),
    #[error("label map indices are not contiguous: expected {expected}, found {found}")]
    Gap { expected: usize, found: usize },
    #[error("label map is empty")]
    Empty,
}

/// Ordered, immutable index → name table. Indices are always `0..len`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelMap {
    names: Vec<String>,
}

impl LabelMap {
    /// Build from names already in class-index order.
    pub fn from_names<I, S>(names: I) -> Result<Self, LabelMapError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        if names.is_empty() {
            return Err(LabelMapError::Empty);
        }
        Ok(Self { names })
    }

    /// Parse the `{"0": "Name", "1": "Name", ...}` artifact format.
    pub fn from_json_str(json: &str) -> Result<Self, LabelMapError> {
        let raw: HashMap<String, String> = serde_json::from_str(json)?;

        let mut indexed = BTreeMap::new();
        for (key, name) in raw {
            let index = parse_index(&key).ok_or_else(|| LabelMapError::InvalidIndex(key.clone()))?;
            if indexed.insert(index, name).is_some() {
                return Err(LabelMapError::DuplicateIndex(index));
            }
        }

        for (expected, &found) in indexed.keys().enumerate() {
            if expected != found {
                return Err(LabelMapError::Gap { expected, found });
            }
        }

        Self::from_names(indexed.into_values())
    }

    /// Load the label-map artifact from disk.
    pub fn load(path: &Path) -> Result<Self, LabelMapError> {
        if !path.exists() {
            return Err(LabelMapError::NotFound(path.display().to_string()));
        }
        let json = std::fs::read_to_string(path)?;
        let map = Self::from_json_str(&json)?;
        tracing::info!(path = %path.display(), classes = map.len(), "loaded label map");
        Ok(map)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }

    /// Display name for `index`, or a placeholder for an out-of-range index.
    pub fn name_or_unknown(&self, index: usize) -> String {
        self.get(index)
            .map(str::to_owned)
            .unwrap_or_else(|| format!("Unknown ({index})"))
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }
}

/// Plain decimal digits only; `usize::from_str` alone would also take `"+1"`.
fn parse_index(key: &str) -> Option<usize> {
    if key.is_empty() || !key.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    key.parse().ok()
}
