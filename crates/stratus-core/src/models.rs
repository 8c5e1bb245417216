//! Domain models: keyed records and the write batches sent to a store.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::AppError;

/// Maximum number of operations a store accepts in one atomic batch.
pub const MAX_BATCH_OPS: usize = 500;

/// Maximum document id length in bytes.
pub const MAX_KEY_BYTES: usize = 1500;

/// A natural document key.
///
/// Keys are derived from record content, never generated, so the same
/// entity maps to the same document on every run. Construction replaces
/// `/` and spaces with `_` and truncates to [`MAX_KEY_BYTES`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DocumentKey(String);

impl DocumentKey {
    /// Sanitizes `raw` into a document key.
    ///
    /// # Errors
    ///
    /// Returns `AppError::InvalidKey` if the key is empty.
    pub fn new(raw: impl AsRef<str>) -> Result<Self, AppError> {
        let raw = raw.as_ref();
        let mut key: String = raw
            .chars()
            .map(|c| if c == '/' || c == ' ' { '_' } else { c })
            .collect();

        if key.len() > MAX_KEY_BYTES {
            let mut end = MAX_KEY_BYTES;
            while !key.is_char_boundary(end) {
                end -= 1;
            }
            key.truncate(end);
        }

        if key.is_empty() {
            return Err(AppError::InvalidKey(raw.to_string()));
        }
        Ok(Self(key))
    }

    /// Wraps an id read back from a store, without sanitizing it.
    ///
    /// Stored ids may predate sanitization, so they must be addressed
    /// exactly as the store returned them.
    ///
    /// # Errors
    ///
    /// Returns `AppError::InvalidKey` if the id is empty.
    pub fn from_stored(id: impl Into<String>) -> Result<Self, AppError> {
        let id = id.into();
        if id.is_empty() {
            return Err(AppError::InvalidKey(id));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for DocumentKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for DocumentKey {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        DocumentKey::new(value)
    }
}

impl From<DocumentKey> for String {
    fn from(key: DocumentKey) -> Self {
        key.0
    }
}

/// A keyed record: a required natural key plus an open field map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub key: DocumentKey,
    #[serde(default)]
    pub fields: Map<String, Value>,
}

impl Record {
    pub fn new(key: DocumentKey, fields: Map<String, Value>) -> Self {
        Self { key, fields }
    }

    /// Returns a field value, if present.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Sets a field, overwriting any previous value.
    pub fn set(&mut self, field: impl Into<String>, value: Value) {
        self.fields.insert(field.into(), value);
    }
}

fn default_separator() -> String {
    "_".to_string()
}

/// Describes how a natural key is built from record fields.
///
/// # Example
///
/// ```toml
/// [key]
/// fields = ["billing_account_id", "date", "project_id", "service"]
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeySpec {
    /// Fields whose values form the key, in order.
    pub fields: Vec<String>,
    /// Joins the field values. Defaults to `_`.
    #[serde(default = "default_separator")]
    pub separator: String,
}

impl KeySpec {
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
            separator: default_separator(),
        }
    }

    /// Derives the natural key for a field map.
    ///
    /// Strings are used verbatim; numbers and booleans use their JSON text.
    ///
    /// # Errors
    ///
    /// `AppError::MissingKey` if a key field is absent or null,
    /// `AppError::InvalidKey` if it is not a scalar or the key is empty.
    pub fn key_for(&self, fields: &Map<String, Value>) -> Result<DocumentKey, AppError> {
        let mut parts = Vec::with_capacity(self.fields.len());
        for name in &self.fields {
            let part = match fields.get(name) {
                None | Some(Value::Null) => return Err(AppError::MissingKey(name.clone())),
                Some(Value::String(s)) => s.clone(),
                Some(Value::Number(n)) => n.to_string(),
                Some(Value::Bool(b)) => b.to_string(),
                Some(_) => {
                    return Err(AppError::InvalidKey(format!(
                        "field '{}' is not a scalar",
                        name
                    )));
                }
            };
            parts.push(part);
        }
        DocumentKey::new(parts.join(&self.separator))
    }

    /// Builds a [`Record`] from a field map, deriving its key.
    pub fn record(&self, fields: Map<String, Value>) -> Result<Record, AppError> {
        let key = self.key_for(&fields)?;
        Ok(Record::new(key, fields))
    }
}

/// A single operation inside a [`WriteBatch`].
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    /// Create or update a document.
    ///
    /// With `merge` set, only the given top-level fields are written and
    /// other fields of an existing document are kept.
    Set {
        key: DocumentKey,
        fields: Map<String, Value>,
        merge: bool,
    },
    /// Remove a document. Deleting a missing document is not an error.
    Delete { key: DocumentKey },
}

impl WriteOp {
    pub fn key(&self) -> &DocumentKey {
        match self {
            WriteOp::Set { key, .. } | WriteOp::Delete { key } => key,
        }
    }
}

/// An ordered group of writes committed atomically against one collection.
///
/// Committing the same batch twice leaves the store in the same state as
/// committing it once, since every op is keyed.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteBatch {
    collection: String,
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            ops: Vec::new(),
        }
    }

    /// Builds a batch of set operations from records.
    pub fn from_records(collection: impl Into<String>, records: Vec<Record>, merge: bool) -> Self {
        let ops = records
            .into_iter()
            .map(|r| WriteOp::Set {
                key: r.key,
                fields: r.fields,
                merge,
            })
            .collect();
        Self {
            collection: collection.into(),
            ops,
        }
    }

    /// Builds a batch of delete operations.
    pub fn deletes(collection: impl Into<String>, keys: Vec<DocumentKey>) -> Self {
        Self {
            collection: collection.into(),
            ops: keys.into_iter().map(|key| WriteOp::Delete { key }).collect(),
        }
    }

    pub fn set(&mut self, key: DocumentKey, fields: Map<String, Value>, merge: bool) -> &mut Self {
        self.ops.push(WriteOp::Set { key, fields, merge });
        self
    }

    pub fn delete(&mut self, key: DocumentKey) -> &mut Self {
        self.ops.push(WriteOp::Delete { key });
        self
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Keys touched by this batch, in op order.
    pub fn keys(&self) -> Vec<DocumentKey> {
        self.ops.iter().map(|op| op.key().clone()).collect()
    }
}
