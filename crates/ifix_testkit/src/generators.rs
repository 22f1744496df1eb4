//! Property-based test generators using proptest.
//!
//! Provides strategies for generating random test data
//! that maintains required invariants.

use ifix_core::{Fields, SYSTEM_FIELDS, STATUS_FIELD};
use proptest::prelude::*;
use serde_json::{json, Value};

/// Statuses used by generated status changes.
pub const STATUSES: [&str; 4] = ["aberta", "em_execucao", "concluida", "cancelada"];

/// Strategy for generating valid table names.
pub fn table_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[A-Z][A-Z0-9_-]{0,15}")
        .expect("Invalid regex")
        .prop_filter("Table name must not contain the snapshot infix", |s| {
            !s.contains("_backup_")
        })
}

/// Strategy for generating domain field names: never a system field and
/// never `status`, which has its own operation.
pub fn field_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-zA-Z]{0,8}")
        .expect("Invalid regex")
        .prop_filter("Field name must not be reserved", |s| {
            !SYSTEM_FIELDS.contains(&s.as_str()) && s != STATUS_FIELD
        })
}

/// Strategy for generating text, including characters that need quoting in
/// CSV and strings that look like numbers or JSON literals.
pub fn text_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        4 => prop::string::string_regex("[a-zA-Z0-9 ,.\"\n()-]{0,16}").expect("Invalid regex"),
        1 => Just(String::new()),
        1 => prop::sample::select(vec!["123", "01310", "true", "null", "[1]", "-4.5", " 7 "])
            .prop_map(str::to_string),
    ]
}

/// Strategy for generating field values that survive a CSV round trip:
/// strings, integers, booleans and arrays of strings. No nulls, which CSV
/// cannot tell apart from a missing field.
pub fn field_value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        4 => text_strategy().prop_map(Value::String),
        2 => (-100_000i64..100_000).prop_map(|n| json!(n)),
        1 => any::<bool>().prop_map(Value::Bool),
        1 => prop::collection::vec(text_strategy(), 0..3).prop_map(|v| json!(v)),
    ]
}

/// Strategy for generating record fields.
pub fn fields_strategy() -> impl Strategy<Value = Fields> {
    prop::collection::btree_map(field_name_strategy(), field_value_strategy(), 0..5)
        .prop_map(|map| map.into_iter().collect())
}

/// Strategy for generating arbitrary JSON, nulls and floats included.
pub fn any_json_strategy() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(|n| json!(n)),
        (-1.0e6f64..1.0e6).prop_map(|f| json!(f)),
        "[a-z_ ]{0,8}".prop_map(Value::String),
        prop::sample::select(vec![
            "id",
            "created_at",
            "2024-05-01",
            "2024-05-01T10:00:00.000Z",
        ])
        .prop_map(|s| Value::String(s.to_string())),
    ];
    leaf.prop_recursive(4, 48, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
            prop::collection::btree_map(
                prop::sample::select(vec![
                    "id", "data", "meta", "indexes", "stats", "status", "created_at",
                    "_version", "version", "byId", "name",
                ])
                .prop_map(str::to_string),
                inner,
                0..6,
            )
            .prop_map(|map| Value::Object(map.into_iter().collect())),
        ]
    })
}

/// A mutation applied to a table in property tests.
///
/// Operations address existing records by `slot`, taken modulo the number
/// of live records; they are skipped while the table is empty.
#[derive(Debug, Clone)]
pub enum RecordOperation {
    /// Create a record
    Create {
        /// Record fields
        fields: Fields,
    },
    /// Merge fields onto a record
    Update {
        /// Record slot
        slot: usize,
        /// Patch
        fields: Fields,
    },
    /// Change the status of a record
    SetStatus {
        /// Record slot
        slot: usize,
        /// New status
        status: &'static str,
    },
    /// Delete a record
    Delete {
        /// Record slot
        slot: usize,
    },
}

/// Strategy for generating record operations.
pub fn record_operation_strategy() -> impl Strategy<Value = RecordOperation> {
    prop_oneof![
        4 => fields_strategy().prop_map(|fields| RecordOperation::Create { fields }),
        2 => (any::<usize>(), fields_strategy())
            .prop_map(|(slot, fields)| RecordOperation::Update { slot, fields }),
        2 => (any::<usize>(), prop::sample::select(STATUSES.to_vec()))
            .prop_map(|(slot, status)| RecordOperation::SetStatus { slot, status }),
        1 => any::<usize>().prop_map(|slot| RecordOperation::Delete { slot }),
    ]
}

/// Strategy for generating a sequence of operations.
pub fn operation_sequence_strategy(
    min_ops: usize,
    max_ops: usize,
) -> impl Strategy<Value = Vec<RecordOperation>> {
    prop::collection::vec(record_operation_strategy(), min_ops..max_ops)
}

/// Strategy for generating damaged table blobs: random text, random JSON,
/// and envelope-shaped JSON with wrong parts.
pub fn corrupt_blob_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        1 => ".{0,64}",
        2 => any_json_strategy().prop_map(|v| v.to_string()),
        2 => (
            prop::collection::vec(any_json_strategy(), 0..8),
            any_json_strategy(),
            any_json_strategy(),
        )
            .prop_map(|(data, meta, indexes)| {
                json!({"meta": meta, "data": data, "indexes": indexes}).to_string()
            }),
        1 => prop::collection::vec(any_json_strategy(), 0..8)
            .prop_map(|items| Value::Array(items).to_string()),
    ]
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Creates a configuration for thorough tests.
    #[must_use]
    pub fn thorough() -> Self {
        Self {
            cases: 1024,
            max_shrink_iters: 10000,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}
