//! Records: system-managed fields plus free-form domain fields.

use crate::error::CoreResult;
use crate::types::Timestamp;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::borrow::Cow;

/// Domain fields of a record.
pub type Fields = Map<String, Value>;

/// Field name of the record id.
pub const ID_FIELD: &str = "id";
/// Field name of the creation timestamp.
pub const CREATED_AT_FIELD: &str = "created_at";
/// Field name of the last-modification timestamp.
pub const UPDATED_AT_FIELD: &str = "updated_at";
/// Field name of the mutation counter.
pub const VERSION_FIELD: &str = "_version";
/// Field indexed by `byStatus`.
pub const STATUS_FIELD: &str = "status";

/// Fields owned by the store; callers cannot set them through create/update.
pub const SYSTEM_FIELDS: [&str; 4] = [ID_FIELD, CREATED_AT_FIELD, UPDATED_AT_FIELD, VERSION_FIELD];

/// One entity instance stored in a table.
///
/// Serializes as a flat JSON object: the system fields next to the domain
/// fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Unique id within the table.
    pub id: String,
    /// Creation time, immutable after creation.
    pub created_at: String,
    /// Last mutation time.
    pub updated_at: String,
    /// Starts at 1, incremented on every update.
    #[serde(rename = "_version")]
    pub version: u64,
    /// Caller-supplied fields.
    #[serde(flatten)]
    pub fields: Fields,
}

impl Record {
    /// Creates a fresh record stamped with `now` at version 1.
    #[must_use]
    pub fn new(id: impl Into<String>, fields: Fields, now: Timestamp) -> Self {
        let stamp = now.to_string();
        Self {
            id: id.into(),
            created_at: stamp.clone(),
            updated_at: stamp,
            version: 1,
            fields,
        }
    }

    /// Returns the value of any field, system fields included.
    #[must_use]
    pub fn value(&self, field: &str) -> Option<Cow<'_, Value>> {
        match field {
            ID_FIELD => Some(Cow::Owned(Value::String(self.id.clone()))),
            CREATED_AT_FIELD => Some(Cow::Owned(Value::String(self.created_at.clone()))),
            UPDATED_AT_FIELD => Some(Cow::Owned(Value::String(self.updated_at.clone()))),
            VERSION_FIELD => Some(Cow::Owned(Value::from(self.version))),
            _ => self.fields.get(field).map(Cow::Borrowed),
        }
    }

    /// Returns a domain field.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Returns a domain field as a string slice.
    #[must_use]
    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(Value::as_str)
    }

    /// Returns the `status` field when it is a string.
    #[must_use]
    pub fn status(&self) -> Option<&str> {
        self.get_str(STATUS_FIELD)
    }

    /// The values the `byStatus` index files this record under: the status
    /// string, or each distinct string element of an array status.
    #[must_use]
    pub fn status_keys(&self) -> Vec<&str> {
        match self.fields.get(STATUS_FIELD) {
            Some(Value::String(s)) => vec![s.as_str()],
            Some(Value::Array(items)) => {
                let mut keys: Vec<&str> = Vec::new();
                for key in items.iter().filter_map(Value::as_str) {
                    if !keys.contains(&key) {
                        keys.push(key);
                    }
                }
                keys
            }
            _ => Vec::new(),
        }
    }

    /// Merges `patch` over the domain fields.
    ///
    /// Keys absent from `patch` are untouched; system keys in `patch` are
    /// ignored.
    pub fn merge(&mut self, mut patch: Fields) {
        strip_system_fields(&mut patch);
        patch.remove(ID_FIELD);
        self.fields.extend(patch);
    }

    /// Marks the record as modified: new `updated_at`, version + 1.
    pub fn touch(&mut self) {
        self.updated_at = Timestamp::next_after(Some(&self.updated_at)).to_string();
        self.version += 1;
    }

    /// Converts the whole record, system fields included, into a JSON value.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_value(&self) -> CoreResult<Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Deserializes the record into a typed entity.
    ///
    /// # Errors
    ///
    /// Returns an error if the record does not match the entity's shape.
    pub fn to_entity<T: DeserializeOwned>(&self) -> CoreResult<T> {
        Ok(serde_json::from_value(self.to_value()?)?)
    }

    /// Serializes a typed entity into domain fields, dropping system keys.
    ///
    /// # Errors
    ///
    /// Returns a format error if the entity does not serialize to an object.
    pub fn fields_from<T: Serialize>(entity: &T) -> CoreResult<Fields> {
        match serde_json::to_value(entity)? {
            Value::Object(mut map) => {
                strip_system_fields(&mut map);
                map.remove(ID_FIELD);
                Ok(map)
            }
            other => Err(crate::CoreError::format(format!(
                "entity serialized to {other}, expected an object"
            ))),
        }
    }

    /// Rebuilds a record from loosely shaped JSON.
    ///
    /// Used when salvaging legacy or drifted tables and when importing. The
    /// value must be an object with a non-empty string (or numeric) `id`;
    /// anything else is rejected. Missing system fields are filled in:
    /// `_version` defaults to 1, `created_at` falls back to `createdAt`,
    /// `date`, then `now`, and `updated_at` falls back to `updatedAt`, then
    /// `created_at`. Timestamps are normalized to the store's format.
    #[must_use]
    pub fn salvage(value: Value, now: Timestamp) -> Option<Self> {
        let Value::Object(mut map) = value else {
            return None;
        };

        let id = match map.remove(ID_FIELD)? {
            Value::String(s) if !s.trim().is_empty() => s,
            Value::Number(n) => n.to_string(),
            _ => return None,
        };

        let stamp = |map: &mut Fields, system: &str, fallbacks: &[&str]| -> Option<Timestamp> {
            let own = map.remove(system);
            own.as_ref()
                .and_then(Value::as_str)
                .and_then(Timestamp::parse)
                .or_else(|| {
                    fallbacks.iter().find_map(|f| {
                        map.get(*f).and_then(Value::as_str).and_then(Timestamp::parse)
                    })
                })
        };

        let created = stamp(&mut map, CREATED_AT_FIELD, &["createdAt", "date"]).unwrap_or(now);
        let updated = stamp(&mut map, UPDATED_AT_FIELD, &["updatedAt"]).unwrap_or(created);
        let version = map
            .remove(VERSION_FIELD)
            .and_then(|v| v.as_u64())
            .filter(|v| *v >= 1)
            .unwrap_or(1);

        Some(Self {
            id,
            created_at: created.to_string(),
            updated_at: updated.to_string(),
            version,
            fields: map,
        })
    }
}

/// Removes the store-owned timestamp and version keys from `fields`.
///
/// `id` is left in place; callers decide whether a supplied id is honored.
pub fn strip_system_fields(fields: &mut Fields) {
    fields.remove(CREATED_AT_FIELD);
    fields.remove(UPDATED_AT_FIELD);
    fields.remove(VERSION_FIELD);
}

/// Builds a [`Fields`] map from a `serde_json::json!` object literal.
///
/// Non-object values yield an empty map.
#[must_use]
pub fn fields(value: Value) -> Fields {
    match value {
        Value::Object(map) => map,
        _ => Fields::new(),
    }
}
