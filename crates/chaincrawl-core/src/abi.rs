//! ABI handle: the parts of a contract ABI the crawler looks at.
//!
//! The ABI file itself stays opaque. The engine only needs its `name`
//! (checkpoint key) and, when the configuration names no events, the list of
//! event identifiers the ABI declares.

use std::path::Path;

use serde::Deserialize;

use crate::config::ConfigError;

/// A loaded contract ABI.
#[derive(Debug, Clone)]
pub struct AbiHandle {
    /// ABI name (`"name"` field of the ABI JSON).
    pub name: String,
    /// Identifiers of the events declared by the ABI, in declaration order.
    pub event_identifiers: Vec<String>,
    /// The full ABI document.
    pub raw: serde_json::Value,
}

#[derive(Deserialize)]
struct AbiHeader {
    #[serde(default)]
    name: String,
    #[serde(default)]
    events: Vec<AbiEvent>,
}

#[derive(Deserialize)]
struct AbiEvent {
    identifier: String,
}

impl AbiHandle {
    /// Handle with just a name, for callers that never read the ABI file.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            event_identifiers: vec![],
            raw: serde_json::Value::Null,
        }
    }

    /// Parse an ABI JSON document.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let raw: serde_json::Value = serde_json::from_str(json)?;
        let header = AbiHeader::deserialize(&raw)?;
        Ok(Self {
            name: header.name,
            event_identifiers: header.events.into_iter().map(|e| e.identifier).collect(),
            raw,
        })
    }

    /// Load and parse an ABI JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let abi_err = |reason: String| ConfigError::Abi {
            path: path.display().to_string(),
            reason,
        };

        let content = std::fs::read_to_string(path).map_err(|e| abi_err(e.to_string()))?;
        let handle = Self::from_json(&content).map_err(|e| abi_err(e.to_string()))?;
        if handle.name.is_empty() {
            return Err(abi_err("ABI has no name".into()));
        }
        Ok(handle)
    }
}
