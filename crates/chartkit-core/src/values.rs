//! Value tables with dotted-path lookup and deep merge support
//!
//! A [`Values`] is always backed by a JSON object map, so lookups never have
//! to deal with a missing store: an absent key is reported as a typed
//! [`CoreError::NoTable`] or [`CoreError::NoValue`] naming the segment that
//! failed to resolve.

use serde::{Serialize, Serializer};
use serde_json::{Map, Value as JsonValue};
use std::io::Write;
use std::path::Path;

use crate::error::{CoreError, Result};
use crate::json::{Lossless, serialize_table};

/// A table of configuration values (a YAML mapping)
///
/// Numbers keep their literal digits; serializing emits them as native
/// integers and floats.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Values(Map<String, JsonValue>);

impl Values {
    /// Create an empty table
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Load values from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    /// Parse values from a YAML document
    ///
    /// An empty document (or an explicit `null`) yields an empty table.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        if yaml.trim().is_empty() {
            return Ok(Self::new());
        }
        let Lossless(value) = serde_yaml::from_str(yaml)?;
        Self::try_from(value)
    }

    /// Parse values from a JSON document
    pub fn from_json(json: &str) -> Result<Self> {
        if json.trim().is_empty() {
            return Ok(Self::new());
        }
        let value: JsonValue = serde_json::from_str(json)?;
        Self::try_from(value)
    }

    /// Serialize the table as a YAML document
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Write the YAML serialization of the table to `w`
    pub fn encode<W: Write>(&self, mut w: W) -> Result<()> {
        w.write_all(self.to_yaml()?.as_bytes())?;
        Ok(())
    }

    /// Get the table found at a dotted path
    ///
    /// `foo.bar` is evaluated as "the table bar inside the table foo". The
    /// error names the first segment that is missing or is not a table.
    pub fn table(&self, path: &str) -> Result<Values> {
        let segments = parse_path(path);
        table_at(&self.0, &segments).map(|map| Values(map.clone()))
    }

    /// Get the non-table value found at a dotted path
    ///
    /// Given `chapter: {one: {title: Loomings}}`, the value at
    /// `chapter.one.title` is `"Loomings"`. Requesting a path that resolves
    /// to a table is an error, as is an empty path.
    pub fn path_value(&self, path: &str) -> Result<&JsonValue> {
        if path.is_empty() {
            return Err(CoreError::EmptyPath);
        }

        let segments = parse_path(path);
        let Some((key, parents)) = segments.split_last() else {
            return Err(CoreError::EmptyPath);
        };

        let table = if parents.is_empty() {
            &self.0
        } else {
            table_at(&self.0, parents).map_err(|_| CoreError::NoValue {
                key: key.to_string(),
            })?
        };

        match table.get(*key) {
            Some(value) if !is_table(value) => Ok(value),
            _ => Err(CoreError::NoValue {
                key: key.to_string(),
            }),
        }
    }

    /// Get a top-level entry
    pub fn get(&self, key: &str) -> Option<&JsonValue> {
        self.0.get(key)
    }

    /// Insert a top-level entry, returning the previous one
    pub fn insert(&mut self, key: impl Into<String>, value: JsonValue) -> Option<JsonValue> {
        self.0.insert(key.into(), value)
    }

    /// Borrow the backing map
    pub fn as_map(&self) -> &Map<String, JsonValue> {
        &self.0
    }

    /// Convert into the backing map
    pub fn into_inner(self) -> Map<String, JsonValue> {
        self.0
    }

    /// Convert into a JSON object value
    pub fn into_json(self) -> JsonValue {
        JsonValue::Object(self.0)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Deep merge another table into this one
    ///
    /// Rules:
    /// - Tables: recursive merge
    /// - Scalars and lists: overlay replaces base
    pub fn merge(&mut self, overlay: &Values) {
        for (key, overlay_value) in &overlay.0 {
            match self.0.get_mut(key) {
                Some(base_value) => deep_merge(base_value, overlay_value),
                None => {
                    self.0.insert(key.clone(), overlay_value.clone());
                }
            }
        }
    }
}

impl TryFrom<JsonValue> for Values {
    type Error = CoreError;

    fn try_from(value: JsonValue) -> Result<Self> {
        match value {
            JsonValue::Null => Ok(Self::new()),
            JsonValue::Object(map) => Ok(Self(map)),
            other => Err(CoreError::InvalidValues {
                message: format!("expected a mapping at the document root, found {}", kind_of(&other)),
            }),
        }
    }
}

impl Serialize for Values {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serialize_table(&self.0, serializer)
    }
}

impl From<Map<String, JsonValue>> for Values {
    fn from(map: Map<String, JsonValue>) -> Self {
        Self(map)
    }
}

impl From<Values> for JsonValue {
    fn from(values: Values) -> Self {
        values.into_json()
    }
}

/// Split a dotted path into its segments
pub fn parse_path(path: &str) -> Vec<&str> {
    path.split('.').collect()
}

/// Join path segments with dots
pub fn join_path<S: AsRef<str>>(segments: &[S]) -> String {
    segments
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(".")
}

/// Whether a value has the shape of a YAML table
pub fn is_table(value: &JsonValue) -> bool {
    value.is_object()
}

fn table_at<'a>(
    root: &'a Map<String, JsonValue>,
    segments: &[&str],
) -> Result<&'a Map<String, JsonValue>> {
    let mut table = root;
    for segment in segments {
        table = match table.get(*segment) {
            Some(JsonValue::Object(next)) => next,
            _ => {
                return Err(CoreError::NoTable {
                    key: segment.to_string(),
                });
            }
        };
    }
    Ok(table)
}

fn deep_merge(base: &mut JsonValue, overlay: &JsonValue) {
    match (base, overlay) {
        (JsonValue::Object(base_map), JsonValue::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                match base_map.get_mut(key) {
                    Some(base_value) => deep_merge(base_value, overlay_value),
                    None => {
                        base_map.insert(key.clone(), overlay_value.clone());
                    }
                }
            }
        }
        (base, overlay) => {
            *base = overlay.clone();
        }
    }
}

fn kind_of(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "a boolean",
        JsonValue::Number(_) => "a number",
        JsonValue::String(_) => "a string",
        JsonValue::Array(_) => "a list",
        JsonValue::Object(_) => "a mapping",
    }
}
