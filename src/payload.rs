// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Helpers for picking values out of Tasmota JSON payloads.
//!
//! Tasmota state payloads are loosely shaped: the same quantity may appear
//! at different nesting depths depending on firmware and sensor family.
//! Lookups here never fail hard; a missing key, a wrong type or an
//! out-of-range index is simply "no value".

use std::fmt;

use serde_json::Value;

/// One step in a JSON payload path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathNode {
    /// Object member lookup by key.
    Key(String),
    /// Array element lookup by index.
    Index(usize),
}

impl PathNode {
    /// Convenience constructor for a key node.
    #[must_use]
    pub fn key(key: impl Into<String>) -> Self {
        Self::Key(key.into())
    }
}

impl fmt::Display for PathNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key(key) => write!(f, "{key}"),
            Self::Index(idx) => write!(f, "{idx}"),
        }
    }
}

impl From<&str> for PathNode {
    fn from(key: &str) -> Self {
        Self::Key(key.to_string())
    }
}

impl From<usize> for PathNode {
    fn from(idx: usize) -> Self {
        Self::Index(idx)
    }
}

/// A path into a nested JSON payload.
pub type SensorPath = Vec<PathNode>;

/// Parses a raw payload string as JSON.
///
/// Returns `None` on malformed input; the caller decides whether to log.
#[must_use]
pub fn parse_json(payload: &str) -> Option<Value> {
    serde_json::from_str(payload).ok()
}

/// Walks `value` along `path`, returning the value at the end.
///
/// Returns `None` if any step finds a missing key, a non-container where a
/// container is expected, or an index past the end of an array.
#[must_use]
pub fn get_value_by_path<'a>(value: &'a Value, path: &[PathNode]) -> Option<&'a Value> {
    let mut current = value;
    for node in path {
        current = match node {
            PathNode::Key(key) => current.as_object()?.get(key)?,
            PathNode::Index(idx) => current.as_array()?.get(*idx)?,
        };
    }
    Some(current)
}

/// Parses a raw payload and walks it along `path` in one step.
#[must_use]
pub fn get_value_by_path_str(payload: &str, path: &[PathNode]) -> Option<Value> {
    let value = parse_json(payload)?;
    get_value_by_path(&value, path).cloned()
}

/// Extracts the power state literal for relay `idx` from a payload.
///
/// Tasmota reports single-relay devices under `POWER` and multi-relay
/// devices under `POWER1`..`POWER8`. For index 0 both spellings are
/// accepted, with the bare key taking precedence.
#[must_use]
pub fn get_state_power(value: &Value, idx: usize) -> Option<String> {
    let object = value.as_object()?;
    if idx == 0
        && let Some(state) = object.get("POWER")
    {
        return state.as_str().map(ToString::to_string);
    }
    object
        .get(&format!("POWER{}", idx + 1))?
        .as_str()
        .map(ToString::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn path_walks_objects() {
        let value = json!({"ENERGY": {"Total": 0.017}});
        let path = vec![PathNode::key("ENERGY"), PathNode::key("Total")];
        assert_eq!(get_value_by_path(&value, &path), Some(&json!(0.017)));
    }

    #[test]
    fn path_walks_arrays() {
        let value = json!({"ENERGY": {"TotalTariff": [0.0, 0.017]}});
        let path = vec![
            PathNode::key("ENERGY"),
            PathNode::key("TotalTariff"),
            PathNode::Index(1),
        ];
        assert_eq!(get_value_by_path(&value, &path), Some(&json!(0.017)));
    }

    #[test]
    fn path_missing_key_is_none() {
        let value = json!({"ENERGY": {"Total": 0.017}});
        let path = vec![PathNode::key("ENERGY"), PathNode::key("Voltage")];
        assert_eq!(get_value_by_path(&value, &path), None);
    }

    #[test]
    fn path_index_out_of_range_is_none() {
        let value = json!({"Tariff": [0.0]});
        let path = vec![PathNode::key("Tariff"), PathNode::Index(3)];
        assert_eq!(get_value_by_path(&value, &path), None);
    }

    #[test]
    fn path_wrong_type_is_none() {
        let value = json!({"Total": 0.017});
        let path = vec![PathNode::key("Total"), PathNode::key("Nested")];
        assert_eq!(get_value_by_path(&value, &path), None);
    }

    #[test]
    fn parse_json_rejects_garbage() {
        assert!(parse_json("not json").is_none());
        assert!(parse_json("").is_none());
    }

    #[test]
    fn state_power_single_relay() {
        let value = json!({"POWER": "ON"});
        assert_eq!(get_state_power(&value, 0), Some("ON".to_string()));
    }

    #[test]
    fn state_power_indexed_relay() {
        let value = json!({"POWER2": "OFF"});
        assert_eq!(get_state_power(&value, 1), Some("OFF".to_string()));
    }

    #[test]
    fn state_power_index_zero_prefers_bare_key() {
        let value = json!({"POWER": "ON", "POWER1": "OFF"});
        assert_eq!(get_state_power(&value, 0), Some("ON".to_string()));
    }

    #[test]
    fn state_power_missing_is_none() {
        let value = json!({"Dimmer": 50});
        assert_eq!(get_state_power(&value, 0), None);
    }
}
