use log::{info, warn};
use serde_json::Value;
use std::path::Path;

use crate::errors::InferenceError;

/// Class order of the FER-style training set
pub const DEFAULT_LABELS: [&str; 7] = ["angry", "disgust", "fear", "happy", "neutral", "sad", "surprise"];

/// Class names indexed by model output position
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmotionLabels {
    names: Vec<String>,
}

impl Default for EmotionLabels {
    fn default() -> Self {
        Self {
            names: DEFAULT_LABELS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl EmotionLabels {
    /// Build from an explicit list
    pub fn new(names: Vec<String>) -> Result<Self, InferenceError> {
        if names.is_empty() {
            return Err(InferenceError::ModelLoad("label list is empty".to_string()));
        }
        Ok(Self { names })
    }

    /// Parse either `["angry", ...]` or `{"0": "angry", ...}`
    pub fn from_json_str(json: &str) -> Result<Self, InferenceError> {
        let value: Value = serde_json::from_str(json)
            .map_err(|e| InferenceError::ModelLoad(format!("invalid labels JSON: {}", e)))?;

        match value {
            Value::Array(items) => {
                let names = items
                    .into_iter()
                    .map(|item| match item {
                        Value::String(s) => Ok(s),
                        other => Err(InferenceError::ModelLoad(format!("label is not a string: {}", other))),
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Self::new(names)
            }
            Value::Object(map) => {
                let mut indexed = map
                    .into_iter()
                    .map(|(key, item)| {
                        let index: usize = key
                            .parse()
                            .map_err(|_| InferenceError::ModelLoad(format!("label index '{}' is not a number", key)))?;
                        match item {
                            Value::String(s) => Ok((index, s)),
                            other => Err(InferenceError::ModelLoad(format!("label is not a string: {}", other))),
                        }
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                indexed.sort_by_key(|(index, _)| *index);

                if indexed.iter().enumerate().any(|(pos, (index, _))| pos != *index) {
                    return Err(InferenceError::ModelLoad(
                        "label indices must be contiguous from 0".to_string(),
                    ));
                }

                Self::new(indexed.into_iter().map(|(_, name)| name).collect())
            }
            _ => Err(InferenceError::ModelLoad(
                "labels must be a JSON array or object".to_string(),
            )),
        }
    }

    /// Load labels from a file, using the built-in order when it does not exist
    pub fn load(path: &Path) -> Result<Self, InferenceError> {
        if !path.exists() {
            info!("Labels file {:?} not found, using built-in labels", path);
            return Ok(Self::default());
        }

        let json = std::fs::read_to_string(path)
            .map_err(|e| InferenceError::ModelLoad(format!("failed to read {:?}: {}", path, e)))?;
        let labels = Self::from_json_str(&json)?;

        if labels.len() != DEFAULT_LABELS.len() {
            warn!("Labels file {:?} defines {} classes", path, labels.len());
        }

        Ok(labels)
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

    pub fn names(&self) -> &[String] {
        &self.names
    }
}
