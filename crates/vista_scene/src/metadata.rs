//! Typed per-node metadata
//!
//! A [`MetadataTable`] maps string keys to one of six typed slots. Reads are
//! type-strict: asking for a key with a different type than the one stored
//! returns the caller's default instead of converting. Absence and type
//! mismatch are not errors, so partially synced or schema-drifted data can
//! still be read.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use vista_core::{SceneError, SceneResult};

/// A single typed metadata value
///
/// Serialized externally tagged (`{"double": 0.05}`) so the type survives a
/// round trip through JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetadataValue {
    Int32(i32),
    #[serde(rename = "uint32")]
    UInt32(u32),
    Int64(i64),
    Double(f64),
    Bool(bool),
    String(String),
}

impl MetadataValue {
    /// Get the type tag of this value
    pub fn kind(&self) -> MetadataKind {
        match self {
            Self::Int32(_) => MetadataKind::Int32,
            Self::UInt32(_) => MetadataKind::UInt32,
            Self::Int64(_) => MetadataKind::Int64,
            Self::Double(_) => MetadataKind::Double,
            Self::Bool(_) => MetadataKind::Bool,
            Self::String(_) => MetadataKind::String,
        }
    }
}

impl From<i32> for MetadataValue {
    fn from(v: i32) -> Self {
        Self::Int32(v)
    }
}

impl From<u32> for MetadataValue {
    fn from(v: u32) -> Self {
        Self::UInt32(v)
    }
}

impl From<i64> for MetadataValue {
    fn from(v: i64) -> Self {
        Self::Int64(v)
    }
}

impl From<f64> for MetadataValue {
    fn from(v: f64) -> Self {
        Self::Double(v)
    }
}

impl From<bool> for MetadataValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<String> for MetadataValue {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<&str> for MetadataValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

/// Type tag of a metadata slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetadataKind {
    Int32,
    UInt32,
    Int64,
    Double,
    Bool,
    String,
}

impl fmt::Display for MetadataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Int32 => "int32",
            Self::UInt32 => "uint32",
            Self::Int64 => "int64",
            Self::Double => "double",
            Self::Bool => "bool",
            Self::String => "string",
        };
        f.write_str(name)
    }
}

/// Key/value store owned by a single scene node
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetadataTable {
    entries: BTreeMap<String, MetadataValue>,
}

impl MetadataTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite a value; the stored type follows the new value
    ///
    /// Doubles must be finite, since JSON has no spelling for NaN or infinity.
    pub fn set(&mut self, key: &str, value: impl Into<MetadataValue>) -> SceneResult<()> {
        if key.is_empty() {
            return Err(SceneError::invalid("metadata key must not be empty"));
        }
        let value = value.into();
        if let MetadataValue::Double(v) = value {
            if !v.is_finite() {
                return Err(SceneError::invalid(format!(
                    "metadata '{}' must be finite, got {}",
                    key, v
                )));
            }
        }
        self.entries.insert(key.to_string(), value);
        Ok(())
    }

    pub fn set_int(&mut self, key: &str, value: i32) -> SceneResult<()> {
        self.set(key, MetadataValue::Int32(value))
    }

    pub fn set_uint(&mut self, key: &str, value: u32) -> SceneResult<()> {
        self.set(key, MetadataValue::UInt32(value))
    }

    pub fn set_int64(&mut self, key: &str, value: i64) -> SceneResult<()> {
        self.set(key, MetadataValue::Int64(value))
    }

    pub fn set_double(&mut self, key: &str, value: f64) -> SceneResult<()> {
        self.set(key, MetadataValue::Double(value))
    }

    pub fn set_bool(&mut self, key: &str, value: bool) -> SceneResult<()> {
        self.set(key, MetadataValue::Bool(value))
    }

    pub fn set_string(&mut self, key: &str, value: impl Into<String>) -> SceneResult<()> {
        self.set(key, MetadataValue::String(value.into()))
    }

    /// Get the raw value stored under `key`
    pub fn get(&self, key: &str) -> Option<&MetadataValue> {
        self.entries.get(key)
    }

    pub fn get_int(&self, key: &str, default: i32) -> i32 {
        match self.entries.get(key) {
            Some(MetadataValue::Int32(v)) => *v,
            _ => default,
        }
    }

    pub fn get_uint(&self, key: &str, default: u32) -> u32 {
        match self.entries.get(key) {
            Some(MetadataValue::UInt32(v)) => *v,
            _ => default,
        }
    }

    pub fn get_int64(&self, key: &str, default: i64) -> i64 {
        match self.entries.get(key) {
            Some(MetadataValue::Int64(v)) => *v,
            _ => default,
        }
    }

    pub fn get_double(&self, key: &str, default: f64) -> f64 {
        match self.entries.get(key) {
            Some(MetadataValue::Double(v)) => *v,
            _ => default,
        }
    }

    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.entries.get(key) {
            Some(MetadataValue::Bool(v)) => *v,
            _ => default,
        }
    }

    pub fn get_string<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        match self.entries.get(key) {
            Some(MetadataValue::String(v)) => v,
            _ => default,
        }
    }

    /// Remove a key, returning its value if it was present
    pub fn remove(&mut self, key: &str) -> Option<MetadataValue> {
        self.entries.remove(key)
    }

    /// Check if a key is present (of any type)
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over `(key, type)` pairs in key order
    ///
    /// The iterator borrows the table, so it is finite and can be restarted
    /// by calling `iter` again.
    pub fn iter(&self) -> impl Iterator<Item = (&str, MetadataKind)> + '_ {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.kind()))
    }

    /// Iterate over `(key, value)` pairs in key order
    pub fn entries(&self) -> impl Iterator<Item = (&str, &MetadataValue)> + '_ {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}
