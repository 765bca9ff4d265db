//! Read-only sample model handed over by an external profile decoder.

use serde::{Deserialize, Serialize};

use std::collections::BTreeMap;
use std::path::Path;

use crate::ProflensResult;

/// Label keys consulted for a sample's type name, in priority order.
pub const TYPE_LABEL_KEYS: [&str; 2] = ["type", "object"];

/// Type name charged when a sample carries none of [`TYPE_LABEL_KEYS`].
pub const UNKNOWN_TYPE: &str = "unknown";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Profile {
    #[serde(rename = "sampleTypes")]
    pub sample_types: Vec<ValueType>,
    #[serde(default)]
    pub samples: Vec<Sample>,
    #[serde(rename = "durationNanos", default, skip_serializing_if = "Option::is_none")]
    pub duration_nanos: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueType {
    #[serde(rename = "type")]
    pub name: String,
    pub unit: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Sample {
    pub values: Vec<i64>,
    /// Call stack; the innermost frame is stored at `stack[0]`.
    #[serde(default)]
    pub stack: Vec<Location>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Location {
    #[serde(default)]
    pub id: u64,
    #[serde(default)]
    pub address: u64,
    /// More than one line only when calls were inlined.
    #[serde(default)]
    pub lines: Vec<Line>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Line {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<Function>,
    #[serde(default)]
    pub line: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Function {
    #[serde(default)]
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub filename: String,
}

impl ValueType {
    pub fn new(name: &str, unit: &str) -> Self {
        Self {
            name: name.to_string(),
            unit: unit.to_string(),
        }
    }

    pub fn is(&self, name: &str, unit: &str) -> bool {
        self.name == name && self.unit == unit
    }
}

impl Profile {
    pub fn read_json(path: &Path) -> ProflensResult<Self> {
        let bytes = std::fs::read(path)?;
        Self::from_json_slice(&bytes)
    }

    pub fn from_json_slice(bytes: &[u8]) -> ProflensResult<Self> {
        let p: Profile = serde_json::from_slice(bytes)?;
        Ok(p)
    }

    pub fn sample_type(&self, index: usize) -> Option<&ValueType> {
        self.sample_types.get(index)
    }
}

impl Sample {
    pub fn value_at(&self, index: usize) -> Option<i64> {
        self.values.get(index).copied()
    }

    /// First value of a label; multi-valued labels keep only their first entry.
    pub fn first_label(&self, key: &str) -> Option<&str> {
        self.labels
            .get(key)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    /// Type name from the first present key in [`TYPE_LABEL_KEYS`].
    pub fn type_label(&self) -> Option<&str> {
        TYPE_LABEL_KEYS.iter().find_map(|key| self.first_label(key))
    }

    pub fn type_label_or_unknown(&self) -> &str {
        self.type_label().unwrap_or(UNKNOWN_TYPE)
    }

    pub fn innermost(&self) -> Option<&Location> {
        self.stack.first()
    }
}

impl Location {
    /// The first line carrying a function, together with that function.
    pub fn first_function_line(&self) -> Option<(&Function, &Line)> {
        self.lines
            .iter()
            .find_map(|line| line.function.as_ref().map(|f| (f, line)))
    }
}
