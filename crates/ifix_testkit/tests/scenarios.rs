//! End-to-end scenarios over file-backed and in-memory databases.

use ifix_core::entities::{NewPart, OrderStatus, PaymentStatus};
use ifix_core::{
    fields, Condition, Config, CoreError, Database, FindOptions, Format, StoreEvent,
};
use ifix_storage::InMemoryStore;
use ifix_testkit::prelude::*;
use serde_json::json;

#[test]
fn create_update_delete_on_disk() {
    with_file_db(|db, path| {
        let customers = db.table("CUSTOMERS").unwrap();
        let ana = customers
            .create(fields(json!({"name": "Ana", "phone": "123"})))
            .unwrap();
        assert!(!ana.id.is_empty());
        assert_eq!(ana.created_at, ana.updated_at);
        assert_eq!(ana.version, 1);

        let updated = customers
            .update(&ana.id, fields(json!({"phone": "456"})))
            .unwrap();
        assert_eq!(updated.get_str("name"), Some("Ana"));
        assert_eq!(updated.get_str("phone"), Some("456"));
        assert_eq!(updated.version, 2);
        assert!(updated.updated_at > ana.updated_at);
        assert_eq!(updated.created_at, ana.created_at);

        let reopened = Database::open(path);
        // The directory stays locked while `db` is alive.
        assert!(reopened.is_err());

        let before = customers.count();
        assert!(customers.delete(&ana.id).unwrap());
        assert!(customers.find_by_id(&ana.id).is_none());
        assert_eq!(customers.count(), before - 1);
        assert!(matches!(
            customers.update(&ana.id, fields(json!({"phone": "789"}))),
            Err(CoreError::NotFound { .. })
        ));
    });
}

#[test]
fn status_index_tracks_changes() {
    with_temp_db(|db| {
        let tickets = db.table("TICKETS").unwrap();
        let ids: Vec<String> = (0..3)
            .map(|i| {
                tickets
                    .create(fields(json!({"n": i, "status": "open"})))
                    .unwrap()
                    .id
            })
            .collect();

        let open = [Condition::eq("status", "open")];
        let found: Vec<String> = tickets
            .find_where(&open, &FindOptions::new())
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(found, ids);

        tickets
            .update(&ids[1], fields(json!({"status": "closed"})))
            .unwrap();
        assert_eq!(tickets.count_where(&open), 2);
        assert_eq!(tickets.find_by_field("status", "closed").len(), 1);
    });
}

#[test]
fn repair_shop_day() {
    with_temp_db(|db| {
        let (customer_ids, order_ids) = scenarios::shop(db, 2);
        let orders = db.orders().unwrap();
        let customers = db.customers().unwrap();

        let id = &order_ids[0];
        orders
            .add_part(
                id,
                NewPart {
                    name: "Tela OLED".into(),
                    quantity: 1,
                    cost: 200.0,
                    notes: String::new(),
                },
            )
            .unwrap();
        for status in [
            OrderStatus::Diagnostico,
            OrderStatus::AguardandoAprovacao,
            OrderStatus::EmExecucao,
            OrderStatus::Concluida,
        ] {
            orders.set_status(id, status).unwrap();
        }
        orders
            .update_payment(id, PaymentStatus::Pago, Some("pix"))
            .unwrap();
        let delivered = orders.set_status(id, OrderStatus::Entregue).unwrap();
        assert_eq!(delivered.total_value, 300.0);
        assert!(delivered.delivered_at.is_some());

        let customer = customers.get(&customer_ids[0]).unwrap();
        assert_eq!(customer.total_spent, 300.0);
        assert_eq!(customer.services_count, 1);
        assert!(customer.last_service.is_some());

        orders.cancel_order(&order_ids[1], Some("sem peça")).unwrap();
        let stats = orders.stats();
        assert_eq!(stats.delivered, 1);
        assert_eq!(stats.cancelled, 1);
        assert_eq!(stats.pending, 0);

        let price = db
            .catalog()
            .unwrap()
            .price("IPHONE 11", "TROCA DE TELA")
            .unwrap();
        assert!(price.avista < price.parcelado);

        let csv = customers.store().export(Format::Csv).unwrap();
        assert_eq!(csv.lines().count(), 3);
        assert!(db.table_names().unwrap().contains(&"ORDERS".to_string()));
    });
}

#[test]
fn soft_limit_evicts_oldest_records() {
    let config = Config::new().soft_limit_bytes(6_000);
    let test_db = TestDatabase::memory_with(InMemoryStore::new(), config);
    let events = test_db.subscribe();
    let log = test_db.table("LOG").unwrap();

    let first = log
        .create(fields(json!({"line": "x".repeat(200)})))
        .unwrap();
    for _ in 0..40 {
        log.create(fields(json!({"line": "x".repeat(200)}))).unwrap();
    }

    assert!(log.find_by_id(&first.id).is_none());
    assert!(log.count() < 41);
    assert!(test_db.raw("LOG").unwrap().len() <= 6_000);
    assert!(events
        .try_iter()
        .any(|e| matches!(e, StoreEvent::Evicted { .. })));
    assert!(test_db.metrics().evictions > 0);
}

#[test]
fn hard_quota_is_reported() {
    let test_db = TestDatabase::memory_with(InMemoryStore::with_quota(2_000), Config::default());
    let notes = test_db.table("NOTES").unwrap();

    let err = notes
        .create(fields(json!({"text": "y".repeat(5_000)})))
        .unwrap_err();
    assert!(matches!(err, CoreError::StorageQuota { .. }));
    assert_eq!(notes.count(), 0);
    notes.create(fields(json!({"text": "short"}))).unwrap();
    assert_eq!(notes.count(), 1);
}
