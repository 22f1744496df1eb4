//! Indexes stay consistent with the records under random operation
//! sequences, and status queries agree with a full scan.

use ifix_core::migration::{decode, Decoded};
use ifix_core::{Condition, Fields, FindOptions, Timestamp};
use ifix_testkit::prelude::*;
use proptest::prelude::*;
use serde_json::json;

struct Model {
    records: Vec<(String, Fields, String)>,
}

impl Model {
    fn slot(&self, slot: usize) -> Option<usize> {
        (!self.records.is_empty()).then(|| slot % self.records.len())
    }
}

proptest! {
    #![proptest_config(PropTestConfig::quick().to_proptest_config())]

    #[test]
    fn indexes_follow_every_mutation(ops in operation_sequence_strategy(1, 40)) {
        let test_db = TestDatabase::memory();
        let store = test_db.table("ITEMS").unwrap();
        let mut model = Model { records: Vec::new() };

        for op in ops {
            match op {
                RecordOperation::Create { fields } => {
                    let record = store.create(fields.clone()).unwrap();
                    prop_assert_eq!(record.version, 1);
                    prop_assert_eq!(&record.created_at, &record.updated_at);
                    model.records.push((record.id, fields, record.updated_at));
                }
                RecordOperation::Update { slot, fields } => {
                    let Some(i) = model.slot(slot) else { continue };
                    let record = store.update(&model.records[i].0, fields.clone()).unwrap();
                    prop_assert!(record.updated_at > model.records[i].2);
                    let entry = &mut model.records[i];
                    entry.1.extend(fields);
                    entry.2 = record.updated_at;
                }
                RecordOperation::SetStatus { slot, status } => {
                    let Some(i) = model.slot(slot) else { continue };
                    let patch: Fields = [("status".to_string(), json!(status))].into_iter().collect();
                    let record = store.update(&model.records[i].0, patch.clone()).unwrap();
                    let entry = &mut model.records[i];
                    entry.1.extend(patch);
                    entry.2 = record.updated_at;
                }
                RecordOperation::Delete { slot } => {
                    let Some(i) = model.slot(slot) else { continue };
                    let (id, _, _) = model.records.remove(i);
                    prop_assert!(store.delete(&id).unwrap());
                    prop_assert!(store.find_by_id(&id).is_none());
                }
            }

            let raw = test_db.raw("ITEMS").unwrap();
            let decoded = decode(&raw, Timestamp::now());
            prop_assert!(matches!(decoded, Decoded::Current(_)), "stored indexes drifted: {:?}", decoded);
        }

        let records = store.find_all(&FindOptions::new());
        prop_assert_eq!(records.len(), model.records.len());
        for (record, (id, fields, _)) in records.iter().zip(&model.records) {
            prop_assert_eq!(&record.id, id);
            prop_assert_eq!(&record.fields, fields);
        }

        for status in STATUSES {
            let indexed: Vec<String> = store
                .find_where(&[Condition::eq("status", status)], &FindOptions::new())
                .into_iter()
                .map(|r| r.id)
                .collect();
            let scanned: Vec<String> = model
                .records
                .iter()
                .filter(|(_, fields, _)| fields.get("status") == Some(&json!(status)))
                .map(|(id, _, _)| id.clone())
                .collect();
            prop_assert_eq!(indexed, scanned);
        }

        let recent = store.find_recent(5);
        prop_assert_eq!(recent.len(), model.records.len().min(5));
        for pair in recent.windows(2) {
            prop_assert!(pair[0].created_at >= pair[1].created_at);
        }
    }
}

#[test]
fn delete_shifts_later_positions() {
    let test_db = TestDatabase::memory();
    let records = scenarios::populate(&test_db, "ITEMS", 6);
    let store = test_db.table("ITEMS").unwrap();

    store.delete(&records[2].id).unwrap();

    let raw: serde_json::Value = serde_json::from_str(&test_db.raw("ITEMS").unwrap()).unwrap();
    let by_id = &raw["indexes"]["byId"];
    assert_eq!(by_id[&records[1].id], json!(1));
    assert_eq!(by_id[&records[3].id], json!(2));
    assert_eq!(by_id[&records[5].id], json!(4));
    assert!(by_id.get(&records[2].id).is_none());
    assert_eq!(raw["indexes"]["byStatus"]["closed"], json!([4]));
}
