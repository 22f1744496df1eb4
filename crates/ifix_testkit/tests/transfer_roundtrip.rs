//! Exported tables import back to the same records.

use ifix_core::{Format, FindOptions, ImportOptions, Record};
use ifix_testkit::prelude::*;
use proptest::prelude::*;
use serde_json::json;

fn round_trip(rows: Vec<ifix_core::Fields>, format: Format) -> Result<(), TestCaseError> {
    let test_db = TestDatabase::memory();
    let source = test_db.table("SOURCE").unwrap();
    for fields in rows {
        source.create(fields).unwrap();
    }
    let original: Vec<Record> = source.find_all(&FindOptions::new());
    let exported = source.export(format).unwrap();

    let copy = test_db.table("COPY").unwrap();
    let report = copy
        .import(&exported, ImportOptions::new(format).clear_before_import(true))
        .unwrap();
    prop_assert_eq!(report.imported, original.len());
    prop_assert_eq!(report.skipped, 0, "errors: {:?}", report.errors);
    prop_assert_eq!(copy.find_all(&FindOptions::new()), original.clone());

    let again = source
        .import(&exported, ImportOptions::new(format).clear_before_import(true))
        .unwrap();
    prop_assert_eq!(again.imported, original.len());
    prop_assert_eq!(source.find_all(&FindOptions::new()), original);
    Ok(())
}

proptest! {
    #![proptest_config(PropTestConfig::quick().to_proptest_config())]

    #[test]
    fn json_round_trip(rows in prop::collection::vec(fields_strategy(), 0..12)) {
        round_trip(rows, Format::Json)?;
    }

    #[test]
    fn csv_round_trip(rows in prop::collection::vec(fields_strategy(), 0..12)) {
        round_trip(rows, Format::Csv)?;
    }
}

#[test]
fn import_merges_onto_existing_ids() {
    with_temp_db(|db| {
        let table = db.table("CUSTOMERS").unwrap();
        let ana = table
            .create(ifix_core::fields(json!({"name": "Ana", "phone": "123"})))
            .unwrap();

        let payload = json!([
            {"id": ana.id, "phone": "456"},
            {"name": "Bruno"},
            "not a record",
        ])
        .to_string();
        let report = table
            .import(&payload, ImportOptions::new(Format::Json))
            .unwrap();

        assert_eq!(report.merged, 1);
        assert_eq!(report.imported, 1);
        assert_eq!(report.skipped, 1);
        let merged = table.find_by_id(&ana.id).unwrap();
        assert_eq!(merged.get_str("name"), Some("Ana"));
        assert_eq!(merged.get_str("phone"), Some("456"));
        assert_eq!(table.count(), 2);
    });
}

#[test]
fn unparsable_payload_changes_nothing() {
    with_temp_db(|db| {
        let table = db.table("T").unwrap();
        table.create(ifix_core::fields(json!({"n": 1}))).unwrap();
        let before = table.find_all(&FindOptions::new());

        assert!(table
            .import("{oops", ImportOptions::new(Format::Json).clear_before_import(true))
            .is_err());
        assert!(table
            .import("a,b\n1,\"2", ImportOptions::new(Format::Csv).clear_before_import(true))
            .is_err());
        assert_eq!(table.find_all(&FindOptions::new()), before);
    });
}
