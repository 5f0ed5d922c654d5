// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Stream catalog.
//!
//! A [`Catalog`] is the ordered set of streams a run may replicate. It is
//! built once per run, either by discovery against the data source or by
//! loading the JSON a previous discovery run persisted.
//!
//! # Wire Format
//!
//! ```text
//! {"streams": [
//!   {
//!     "stream": "demo_users",
//!     "tap_stream_id": "demo_users",
//!     "replication_method": "INCREMENTAL",
//!     "key_properties": ["id"],
//!     "bookmark_properties": ["updated_at"],     # only when INCREMENTAL
//!     "auto_add_new_fields": false,
//!     "metadata": [
//!       {"breadcrumb": [], "metadata": {"selected": true, "inclusion": "available"}},
//!       {"breadcrumb": ["properties", "id"], "metadata": {"inclusion": "available"}}
//!     ],
//!     "schema": {"type": "object", "properties": {...}},
//!     "replication_key": "updated_at"
//!   }
//! ]}
//! ```
//!
//! Entries are validated when the catalog is constructed: a missing
//! `streams` array, a non-object entry, a missing `tap_stream_id` or a
//! duplicate `tap_stream_id` all fail with
//! [`ReplicationError::MalformedCatalog`]. The replication method is *not*
//! rejected here; unknown methods are kept verbatim and refused when the
//! stream is dispatched.

use crate::error::{ReplicationError, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{json, Map, Value};
use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use tracing::debug;

/// Root metadata key that marks a stream for replication.
pub const SELECTED: &str = "selected";

/// Metadata key/value marking a field or stream as available for selection.
pub const INCLUSION: &str = "inclusion";
pub const INCLUSION_AVAILABLE: &str = "available";

// ═══════════════════════════════════════════════════════════════════════════════
// ReplicationMethod
// ═══════════════════════════════════════════════════════════════════════════════

/// How a stream is replicated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum ReplicationMethod {
    /// Re-read the whole stream every run.
    #[default]
    FullTable,
    /// Read only records past the stream's bookmark.
    Incremental,
    /// Follow the source's change log; the position is owned by the source.
    LogBased,
    /// Anything else, kept verbatim so the catalog round-trips.
    Unsupported(String),
}

impl ReplicationMethod {
    /// Parse a method name. Never fails; unknown names become `Unsupported`.
    pub fn parse(s: &str) -> Self {
        match s.trim() {
            "FULL_TABLE" => Self::FullTable,
            "INCREMENTAL" => Self::Incremental,
            "LOG_BASED" => Self::LogBased,
            other => Self::Unsupported(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::FullTable => "FULL_TABLE",
            Self::Incremental => "INCREMENTAL",
            Self::LogBased => "LOG_BASED",
            Self::Unsupported(raw) => raw,
        }
    }

    pub fn is_supported(&self) -> bool {
        !matches!(self, Self::Unsupported(_))
    }

    pub fn is_incremental(&self) -> bool {
        matches!(self, Self::Incremental)
    }
}

impl fmt::Display for ReplicationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ReplicationMethod {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ReplicationMethod {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::parse(&raw))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Metadata
// ═══════════════════════════════════════════════════════════════════════════════

/// Path to the schema node a metadata entry applies to.
///
/// The root breadcrumb (`[]`) addresses the stream itself;
/// `["properties", "id"]` addresses the `id` field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Breadcrumb(Vec<String>);

impl Breadcrumb {
    pub fn root() -> Self {
        Self(Vec::new())
    }

    pub fn property(name: &str) -> Self {
        Self(vec!["properties".to_string(), name.to_string()])
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }
}

/// One breadcrumb → attributes pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataEntry {
    pub breadcrumb: Breadcrumb,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl MetadataEntry {
    pub fn new(breadcrumb: Breadcrumb, metadata: Map<String, Value>) -> Self {
        Self {
            breadcrumb,
            metadata,
        }
    }

    /// `{"inclusion": "available"}` for a single property.
    fn available_property(name: &str) -> Self {
        let mut metadata = Map::new();
        metadata.insert(INCLUSION.to_string(), json!(INCLUSION_AVAILABLE));
        Self::new(Breadcrumb::property(name), metadata)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Schema
// ═══════════════════════════════════════════════════════════════════════════════

/// JSON-Schema-like description of a stream's records.
///
/// Property order is the declaration order of the source document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Schema(Value);

impl Default for Schema {
    fn default() -> Self {
        Self(json!({"type": "object", "properties": {}}))
    }
}

impl Schema {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    /// Build an object schema from `(name, property schema)` pairs.
    pub fn object<K, I>(properties: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        let properties: Map<String, Value> = properties
            .into_iter()
            .map(|(name, schema)| (name.into(), schema))
            .collect();
        Self(json!({"properties": properties, "type": "object"}))
    }

    /// Property names in declaration order.
    pub fn property_names(&self) -> impl Iterator<Item = &str> {
        self.0
            .get("properties")
            .and_then(Value::as_object)
            .into_iter()
            .flat_map(|props| props.keys().map(String::as_str))
    }

    pub fn property(&self, name: &str) -> Option<&Value> {
        self.0.get("properties").and_then(|props| props.get(name))
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }
}

/// Replication hints a data source can attach to a discovered stream.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StreamHints {
    pub replication_method: ReplicationMethod,
    pub key_properties: Vec<String>,
    pub valid_replication_keys: Vec<String>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// CatalogEntry
// ═══════════════════════════════════════════════════════════════════════════════

/// Descriptor of a single replicable stream.
///
/// `tap_stream_id` is fixed at construction; everything else is plain data.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogEntry {
    tap_stream_id: String,
    /// Display name of the stream.
    pub stream: String,
    pub replication_method: ReplicationMethod,
    /// Primary key fields.
    pub key_properties: Vec<String>,
    /// Fields forming the bookmark; only meaningful for INCREMENTAL.
    pub bookmark_properties: Vec<String>,
    pub auto_add_new_fields: bool,
    pub unique_conflict_method: Option<String>,
    pub unique_constraints: Option<Vec<String>>,
    pub metadata: Vec<MetadataEntry>,
    pub schema: Schema,
}

/// Deserialization shape, validated into a [`CatalogEntry`].
#[derive(Deserialize)]
struct RawCatalogEntry {
    tap_stream_id: Option<String>,
    #[serde(default)]
    stream: Option<String>,
    #[serde(default)]
    replication_method: Option<ReplicationMethod>,
    #[serde(default)]
    key_properties: Option<Vec<String>>,
    #[serde(default)]
    bookmark_properties: Option<Vec<String>>,
    #[serde(default)]
    auto_add_new_fields: Option<bool>,
    #[serde(default)]
    unique_conflict_method: Option<String>,
    #[serde(default)]
    unique_constraints: Option<Vec<String>>,
    #[serde(default)]
    metadata: Option<Vec<MetadataEntry>>,
    #[serde(default)]
    schema: Option<Schema>,
}

impl CatalogEntry {
    /// Create a FULL_TABLE entry with no metadata and an empty object schema.
    pub fn new(tap_stream_id: impl Into<String>, stream: impl Into<String>) -> Self {
        Self {
            tap_stream_id: tap_stream_id.into(),
            stream: stream.into(),
            replication_method: ReplicationMethod::FullTable,
            key_properties: Vec::new(),
            bookmark_properties: Vec::new(),
            auto_add_new_fields: false,
            unique_conflict_method: None,
            unique_constraints: None,
            metadata: Vec::new(),
            schema: Schema::default(),
        }
    }

    /// Build the catalog entry for a freshly discovered stream.
    ///
    /// Produces one root metadata entry (not selected, inclusion available)
    /// followed by one `inclusion: available` entry per schema property.
    pub fn discovered(stream_id: &str, schema: Schema, hints: &StreamHints) -> Self {
        let mut root = Map::new();
        root.insert(
            "forced-replication-method".to_string(),
            json!(hints.replication_method.as_str()),
        );
        root.insert(INCLUSION.to_string(), json!(INCLUSION_AVAILABLE));
        root.insert("schema-name".to_string(), json!(stream_id));
        root.insert(SELECTED.to_string(), json!(false));
        root.insert("table-key-properties".to_string(), json!(hints.key_properties));
        root.insert(
            "valid-replication-keys".to_string(),
            json!(hints.valid_replication_keys),
        );

        let mut metadata = vec![MetadataEntry::new(Breadcrumb::root(), root)];
        metadata.extend(schema.property_names().map(MetadataEntry::available_property));

        let bookmark_properties = if hints.replication_method.is_incremental() {
            hints.valid_replication_keys.clone()
        } else {
            Vec::new()
        };

        Self {
            replication_method: hints.replication_method.clone(),
            key_properties: hints.key_properties.clone(),
            bookmark_properties,
            metadata,
            schema,
            ..Self::new(stream_id, stream_id)
        }
    }

    /// Validate and build an entry from its JSON form.
    pub fn from_value(value: Value) -> Result<Self> {
        if !value.is_object() {
            return Err(ReplicationError::MalformedCatalog(
                "catalog entry is not an object".to_string(),
            ));
        }
        let raw: RawCatalogEntry = serde_json::from_value(value)
            .map_err(|e| ReplicationError::MalformedCatalog(e.to_string()))?;
        let tap_stream_id = raw.tap_stream_id.ok_or_else(|| {
            ReplicationError::MalformedCatalog("catalog entry lacks tap_stream_id".to_string())
        })?;

        Ok(Self {
            stream: raw.stream.unwrap_or_else(|| tap_stream_id.clone()),
            tap_stream_id,
            replication_method: raw.replication_method.unwrap_or_default(),
            key_properties: raw.key_properties.unwrap_or_default(),
            bookmark_properties: raw.bookmark_properties.unwrap_or_default(),
            auto_add_new_fields: raw.auto_add_new_fields.unwrap_or_default(),
            unique_conflict_method: raw.unique_conflict_method,
            unique_constraints: raw.unique_constraints,
            metadata: raw.metadata.unwrap_or_default(),
            schema: raw.schema.unwrap_or_default(),
        })
    }

    pub fn with_replication_method(mut self, method: ReplicationMethod) -> Self {
        self.replication_method = method;
        self
    }

    pub fn with_key_properties(mut self, key_properties: Vec<String>) -> Self {
        self.key_properties = key_properties;
        self
    }

    pub fn with_bookmark_properties(mut self, bookmark_properties: Vec<String>) -> Self {
        self.bookmark_properties = bookmark_properties;
        self
    }

    pub fn with_schema(mut self, schema: Schema) -> Self {
        self.schema = schema;
        self
    }

    pub fn with_metadata(mut self, metadata: Vec<MetadataEntry>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn tap_stream_id(&self) -> &str {
        &self.tap_stream_id
    }

    /// Metadata attached to the root breadcrumb, if any.
    pub fn root_metadata(&self) -> Option<&Map<String, Value>> {
        self.metadata
            .iter()
            .find(|entry| entry.breadcrumb.is_root())
            .map(|entry| &entry.metadata)
    }

    /// True when the root metadata has `selected: true`.
    pub fn is_selected(&self) -> bool {
        self.root_metadata()
            .and_then(|md| md.get(SELECTED))
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// Mark the stream (un)selected, creating root metadata if missing.
    pub fn set_selected(&mut self, selected: bool) {
        match self.metadata.iter_mut().find(|entry| entry.breadcrumb.is_root()) {
            Some(root) => {
                root.metadata.insert(SELECTED.to_string(), json!(selected));
            }
            None => {
                let mut md = Map::new();
                md.insert(SELECTED.to_string(), json!(selected));
                self.metadata.insert(0, MetadataEntry::new(Breadcrumb::root(), md));
            }
        }
    }

    /// First bookmark property for INCREMENTAL streams, otherwise empty.
    pub fn replication_key(&self) -> &str {
        if self.replication_method.is_incremental() {
            self.bookmark_properties.first().map(String::as_str).unwrap_or("")
        } else {
            ""
        }
    }

    /// JSON form, with the conditional keys omitted when they don't apply.
    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        map.insert("stream".to_string(), json!(self.stream));
        map.insert("tap_stream_id".to_string(), json!(self.tap_stream_id));
        map.insert(
            "replication_method".to_string(),
            json!(self.replication_method.as_str()),
        );
        map.insert("key_properties".to_string(), json!(self.key_properties));
        if self.replication_method.is_incremental() {
            map.insert(
                "bookmark_properties".to_string(),
                json!(self.bookmark_properties),
            );
        }
        map.insert(
            "auto_add_new_fields".to_string(),
            json!(self.auto_add_new_fields),
        );
        if let Some(method) = &self.unique_conflict_method {
            map.insert("unique_conflict_method".to_string(), json!(method));
        }
        if let Some(constraints) = &self.unique_constraints {
            map.insert("unique_constraints".to_string(), json!(constraints));
        }
        map.insert("metadata".to_string(), json!(self.metadata));
        map.insert("schema".to_string(), self.schema.as_value().clone());
        map.insert("replication_key".to_string(), json!(self.replication_key()));
        Value::Object(map)
    }
}

impl Serialize for CatalogEntry {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for CatalogEntry {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_value(value).map_err(serde::de::Error::custom)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Catalog
// ═══════════════════════════════════════════════════════════════════════════════

/// Ordered collection of stream descriptors, unique by `tap_stream_id`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Catalog {
    streams: Vec<CatalogEntry>,
}

impl Catalog {
    /// Build a catalog from entries, rejecting duplicate stream ids.
    pub fn new(streams: Vec<CatalogEntry>) -> Result<Self> {
        let mut seen = HashSet::with_capacity(streams.len());
        for entry in &streams {
            if !seen.insert(entry.tap_stream_id()) {
                return Err(ReplicationError::MalformedCatalog(format!(
                    "duplicate tap_stream_id: {}",
                    entry.tap_stream_id()
                )));
            }
        }
        Ok(Self { streams })
    }

    /// Parse `{"streams": [...]}`.
    pub fn from_value(raw: Value) -> Result<Self> {
        let streams = match raw {
            Value::Object(mut map) => map.remove("streams"),
            _ => None,
        };
        let streams = match streams {
            Some(Value::Array(streams)) => streams,
            Some(_) => {
                return Err(ReplicationError::MalformedCatalog(
                    "streams is not an array".to_string(),
                ))
            }
            None => {
                return Err(ReplicationError::MalformedCatalog(
                    "missing streams".to_string(),
                ))
            }
        };

        let entries = streams
            .into_iter()
            .enumerate()
            .map(|(i, raw)| {
                CatalogEntry::from_value(raw).map_err(|e| match e {
                    ReplicationError::MalformedCatalog(msg) => {
                        ReplicationError::MalformedCatalog(format!("streams[{}]: {}", i, msg))
                    }
                    other => other,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Self::new(entries)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let raw: Value = serde_json::from_str(json)
            .map_err(|e| ReplicationError::MalformedCatalog(e.to_string()))?;
        Self::from_value(raw)
    }

    /// Load a catalog persisted by a previous discovery run.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = tokio::fs::read_to_string(path).await.map_err(|e| {
            ReplicationError::Config(format!("Cannot read catalog {}: {}", path.display(), e))
        })?;
        let catalog = Self::from_json(&contents)?;
        debug!(path = %path.display(), streams = catalog.len(), "Loaded catalog");
        Ok(catalog)
    }

    pub fn to_value(&self) -> Value {
        json!({ "streams": self.streams })
    }

    /// Entries selected at the root breadcrumb, in catalog order.
    pub fn get_selected_streams(&self) -> Vec<&CatalogEntry> {
        self.streams.iter().filter(|entry| entry.is_selected()).collect()
    }

    pub fn get_stream(&self, tap_stream_id: &str) -> Option<&CatalogEntry> {
        self.streams
            .iter()
            .find(|entry| entry.tap_stream_id() == tap_stream_id)
    }

    pub fn get_stream_mut(&mut self, tap_stream_id: &str) -> Option<&mut CatalogEntry> {
        self.streams
            .iter_mut()
            .find(|entry| entry.tap_stream_id() == tap_stream_id)
    }

    pub fn stream_ids(&self) -> Vec<String> {
        self.streams
            .iter()
            .map(|entry| entry.tap_stream_id().to_string())
            .collect()
    }

    pub fn streams(&self) -> &[CatalogEntry] {
        &self.streams
    }

    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }
}

impl Serialize for Catalog {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Catalog {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_value(value).map_err(serde::de::Error::custom)
    }
}
