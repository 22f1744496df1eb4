//! Customer registry.

use super::{digits, mentions, null_as_default, typed};
use crate::database::Database;
use crate::error::{CoreError, CoreResult};
use crate::query::{Condition, FindOptions, SortOrder};
use crate::record::{Fields, Record};
use crate::store::RecordStore;
use crate::table::TableSchema;
use crate::types::Timestamp;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tracing::info;

const TABLE: &str = "CUSTOMERS";
const ID_PREFIX: &str = "cust";

const STATUS_ACTIVE: &str = "active";
const STATUS_INACTIVE: &str = "inactive";
const CATEGORY_REGULAR: &str = "regular";
const CATEGORY_PREMIUM: &str = "premium";
const TAG_VIP: &str = "vip";

/// Total spend at which a customer becomes `premium` and gains the `vip` tag.
const PREMIUM_THRESHOLD: f64 = 5000.0;
/// Total spend at which a customer is (re)classified as `regular`.
const REGULAR_THRESHOLD: f64 = 1000.0;
/// Total spend above which an active customer counts as VIP.
const VIP_SPEND: f64 = 2000.0;
/// Services after which a customer counts as frequent.
const FREQUENT_SERVICES: u64 = 3;

/// Postal address.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct Address {
    #[serde(default, deserialize_with = "null_as_default")]
    pub street: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub neighborhood: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub city: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub state: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub zip_code: String,
}

/// A stored customer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    /// Record id.
    pub id: String,
    /// Creation time.
    #[serde(rename = "created_at")]
    pub created_at: String,
    /// Last modification time.
    #[serde(rename = "updated_at")]
    pub updated_at: String,
    /// Record version.
    #[serde(rename = "_version")]
    pub version: u64,
    /// Full name.
    pub name: String,
    /// Main phone, formatted when it has 10 or 11 digits.
    pub phone: String,
    /// Secondary phone.
    #[serde(default, deserialize_with = "null_as_default")]
    pub phone2: String,
    /// E-mail address.
    #[serde(default, deserialize_with = "null_as_default")]
    pub email: String,
    /// CPF or CNPJ.
    #[serde(default, deserialize_with = "null_as_default")]
    pub document: String,
    /// Birth date as entered.
    #[serde(default, deserialize_with = "null_as_default")]
    pub birth_date: String,
    /// Postal address.
    #[serde(default, deserialize_with = "null_as_default")]
    pub address: Address,
    /// Free-form notes.
    #[serde(default, deserialize_with = "null_as_default")]
    pub notes: String,
    /// Labels such as `vip` or `corporate`.
    #[serde(default, deserialize_with = "null_as_default")]
    pub tags: Vec<String>,
    /// `regular`, `premium`, `corporate`...
    #[serde(default = "default_category")]
    pub category: String,
    /// Sum of completed service values.
    #[serde(default, deserialize_with = "null_as_default")]
    pub total_spent: f64,
    /// Number of completed services.
    #[serde(default, deserialize_with = "null_as_default")]
    pub services_count: u64,
    /// When the last service was completed.
    #[serde(default)]
    pub last_service: Option<String>,
    /// `active` or `inactive`.
    #[serde(default = "default_status")]
    pub status: String,
    /// When the customer was soft-deleted.
    #[serde(default)]
    pub deleted_at: Option<String>,
}

fn default_category() -> String {
    CATEGORY_REGULAR.to_string()
}

fn default_status() -> String {
    STATUS_ACTIVE.to_string()
}

impl Customer {
    /// Returns `true` unless the customer was soft-deleted.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == STATUS_ACTIVE
    }

    /// Returns `true` if the customer carries `tag`.
    #[must_use]
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

/// Input for [`CustomerStore::create_customer`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct NewCustomer {
    pub name: String,
    pub phone: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone2: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub birth_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<Address>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl NewCustomer {
    /// Creates an input with the two required fields.
    #[must_use]
    pub fn new(name: impl Into<String>, phone: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            phone: phone.into(),
            ..Self::default()
        }
    }
}

/// Filters for [`CustomerStore::search`].
#[derive(Debug, Clone, PartialEq)]
pub struct CustomerSearch {
    /// Only customers with this status.
    pub status: Option<String>,
    /// Only customers in this category.
    pub category: Option<String>,
    /// Minimum total spend.
    pub min_total_spent: f64,
    /// Maximum total spend.
    pub max_total_spent: f64,
    /// Page size.
    pub limit: usize,
    /// Results to skip.
    pub offset: usize,
}

impl Default for CustomerSearch {
    fn default() -> Self {
        Self {
            status: None,
            category: None,
            min_total_spent: 0.0,
            max_total_spent: f64::INFINITY,
            limit: 50,
            offset: 0,
        }
    }
}

/// Aggregate figures over all customers.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct CustomerStats {
    pub total: usize,
    pub active: usize,
    pub inactive: usize,
    pub total_spent: f64,
    pub average_spent: f64,
    pub total_services: u64,
    pub average_services: f64,
    pub by_category: BTreeMap<String, usize>,
    pub vip_count: usize,
    pub frequent_count: usize,
}

/// Formats Brazilian phone numbers: 11 digits as `(XX) XXXXX-XXXX`, 10 digits
/// as `(XX) XXXX-XXXX`. Anything else is returned unchanged.
#[must_use]
pub fn format_phone(phone: &str) -> String {
    let d = digits(phone);
    match d.len() {
        11 => format!("({}) {}-{}", &d[..2], &d[2..7], &d[7..]),
        10 => format!("({}) {}-{}", &d[..2], &d[2..6], &d[6..]),
        _ => phone.to_string(),
    }
}

/// Checks the `local@domain.tld` shape: no whitespace, exactly one `@`, and
/// a dot inside the domain.
#[must_use]
pub fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    let clean = |s: &str| !s.is_empty() && !s.contains('@') && !s.chars().any(char::is_whitespace);
    clean(local)
        && clean(domain)
        && domain
            .char_indices()
            .any(|(i, c)| c == '.' && i > 0 && i + 1 < domain.len())
}

/// Accepts CPF (11 digits) or CNPJ (14 digits), ignoring punctuation.
#[must_use]
pub fn is_valid_document(document: &str) -> bool {
    matches!(digits(document).len(), 11 | 14)
}

/// Typed access to the `CUSTOMERS` table.
#[derive(Debug, Clone)]
pub struct CustomerStore {
    store: RecordStore,
}

impl CustomerStore {
    /// Opens the table with its schema.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the table cannot be initialized.
    pub fn open(db: &Database) -> CoreResult<Self> {
        let schema = TableSchema::required(["name", "phone"]).with_optional([
            "email",
            "phone2",
            "address",
            "document",
            "birthDate",
            "notes",
            "tags",
            "category",
            "totalSpent",
            "servicesCount",
            "lastService",
            "status",
        ]);
        let store = db.table_with_schema(TABLE, schema)?.with_id_prefix(ID_PREFIX);
        Ok(Self { store })
    }

    /// The underlying record store.
    #[must_use]
    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    /// Registers a customer.
    ///
    /// Phones are formatted, e-mail and document checked. If a customer with
    /// the same phone or e-mail exists, the input is merged onto it instead.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for a missing name or phone, or a malformed
    /// e-mail or document.
    pub fn create_customer(&self, mut input: NewCustomer) -> CoreResult<Customer> {
        input.name = input.name.trim().to_string();
        if input.name.is_empty() || input.phone.trim().is_empty() {
            return Err(CoreError::validation(TABLE, "name and phone are required"));
        }
        input.phone = format_phone(input.phone.trim());
        input.phone2 = input.phone2.as_deref().map(format_phone);
        check_contact(input.email.as_deref(), input.document.as_deref())?;

        let existing = self
            .find_by_phone_or_email(&input.phone, input.email.as_deref())
            .into_iter()
            .next();
        if let Some(existing) = existing {
            info!(id = %existing.id, "customer already registered, merging");
            return self.update_customer(&existing.id, Record::fields_from(&input)?);
        }

        let address = serde_json::to_value(input.address.unwrap_or_default())?;
        let value = json!({
            "name": input.name,
            "phone": input.phone,
            "phone2": input.phone2.unwrap_or_default(),
            "email": input.email.unwrap_or_default(),
            "document": input.document.unwrap_or_default(),
            "birthDate": input.birth_date.unwrap_or_default(),
            "address": address,
            "notes": input.notes.unwrap_or_default(),
            "tags": input.tags,
            "category": input.category.unwrap_or_else(default_category),
            "totalSpent": 0,
            "servicesCount": 0,
            "lastService": null,
            "status": STATUS_ACTIVE,
        });
        let record = self.store.create(crate::record::fields(value))?;
        info!(id = %record.id, "customer created");
        Ok(record.to_entity()?)
    }

    /// Merges `patch` onto a customer, formatting and checking contact fields.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown id and `Validation` for malformed
    /// contact fields.
    pub fn update_customer(&self, id: &str, patch: Fields) -> CoreResult<Customer> {
        self.apply(id, None, patch)
    }

    fn apply(&self, id: &str, expected: Option<u64>, mut patch: Fields) -> CoreResult<Customer> {
        normalize(&mut patch)?;
        let record = match expected {
            Some(version) => self.store.update_versioned(id, version, patch)?,
            None => self.store.update(id, patch)?,
        };
        Ok(record.to_entity()?)
    }

    fn require(&self, id: &str) -> CoreResult<Customer> {
        self.get(id).ok_or_else(|| CoreError::not_found(TABLE, id))
    }

    /// Looks up a customer.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Customer> {
        self.store.find_by_id(id).and_then(|r| r.to_entity().ok())
    }

    /// All customers in registration order.
    #[must_use]
    pub fn list(&self) -> Vec<Customer> {
        typed(TABLE, self.store.find_all(&FindOptions::new()))
    }

    /// Customers whose phone, secondary phone or (case-insensitive) e-mail
    /// matches.
    #[must_use]
    pub fn find_by_phone_or_email(&self, phone: &str, email: Option<&str>) -> Vec<Customer> {
        let email = email.filter(|e| !e.is_empty());
        self.list()
            .into_iter()
            .filter(|c| {
                let phone_match = c.phone == phone || (!c.phone2.is_empty() && c.phone2 == phone);
                let email_match = email.is_some_and(|e| {
                    !c.email.is_empty() && c.email.eq_ignore_ascii_case(e)
                });
                phone_match || email_match
            })
            .collect()
    }

    /// The customer with this CPF/CNPJ, compared by digits.
    #[must_use]
    pub fn find_by_document(&self, document: &str) -> Option<Customer> {
        let wanted = digits(document);
        if wanted.is_empty() {
            return None;
        }
        self.list().into_iter().find(|c| digits(&c.document) == wanted)
    }

    /// Customers with this status.
    #[must_use]
    pub fn by_status(&self, status: &str) -> Vec<Customer> {
        typed(
            TABLE,
            self.store
                .find_where(&[Condition::eq("status", status)], &FindOptions::new()),
        )
    }

    /// Active customers in this category.
    #[must_use]
    pub fn by_category(&self, category: &str) -> Vec<Customer> {
        let conditions = [
            Condition::eq("status", STATUS_ACTIVE),
            Condition::eq("category", category),
        ];
        typed(TABLE, self.store.find_where(&conditions, &FindOptions::new()))
    }

    /// Active customers tagged `vip`, in the premium category, or above the
    /// VIP spend, highest spend first.
    #[must_use]
    pub fn vip_customers(&self) -> Vec<Customer> {
        let conditions = [
            Condition::eq("status", STATUS_ACTIVE),
            Condition::any(vec![
                Condition::contains("tags", TAG_VIP),
                Condition::eq("category", CATEGORY_PREMIUM),
                Condition::gt("totalSpent", VIP_SPEND),
            ]),
        ];
        let options = FindOptions::new().sort_by("totalSpent", SortOrder::Desc);
        typed(TABLE, self.store.find_where(&conditions, &options))
    }

    /// Active customers with at least `min_services` services, most first.
    #[must_use]
    pub fn frequent_customers(&self, min_services: u64) -> Vec<Customer> {
        let conditions = [
            Condition::eq("status", STATUS_ACTIVE),
            Condition::gte("servicesCount", min_services),
        ];
        let options = FindOptions::new().sort_by("servicesCount", SortOrder::Desc);
        typed(TABLE, self.store.find_where(&conditions, &options))
    }

    /// Records a completed service worth `value`.
    ///
    /// Reaching the premium threshold moves the customer to `premium` and
    /// adds the `vip` tag; reaching the regular threshold moves it to
    /// `regular`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown id, or `VersionConflict` if the
    /// customer changed concurrently.
    pub fn record_service(&self, id: &str, value: f64) -> CoreResult<Customer> {
        let customer = self.require(id)?;
        let total = customer.total_spent + value;

        let mut patch = Fields::new();
        patch.insert("totalSpent".into(), json!(total));
        patch.insert("servicesCount".into(), json!(customer.services_count + 1));
        patch.insert("lastService".into(), json!(Timestamp::now().to_string()));
        if total >= PREMIUM_THRESHOLD {
            patch.insert("category".into(), json!(CATEGORY_PREMIUM));
            if !customer.has_tag(TAG_VIP) {
                let mut tags = customer.tags.clone();
                tags.push(TAG_VIP.to_string());
                patch.insert("tags".into(), json!(tags));
            }
        } else if total >= REGULAR_THRESHOLD {
            patch.insert("category".into(), json!(CATEGORY_REGULAR));
        }
        self.apply(id, Some(customer.version), patch)
    }

    /// Adds `tag` if the customer does not have it yet.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown id.
    pub fn add_tag(&self, id: &str, tag: &str) -> CoreResult<Customer> {
        let customer = self.require(id)?;
        if customer.has_tag(tag) {
            return Ok(customer);
        }
        let mut tags = customer.tags.clone();
        tags.push(tag.to_string());
        self.apply(id, Some(customer.version), tag_patch(tags))
    }

    /// Removes `tag` if present.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown id.
    pub fn remove_tag(&self, id: &str, tag: &str) -> CoreResult<Customer> {
        let customer = self.require(id)?;
        if !customer.has_tag(tag) {
            return Ok(customer);
        }
        let tags: Vec<String> = customer.tags.iter().filter(|t| *t != tag).cloned().collect();
        self.apply(id, Some(customer.version), tag_patch(tags))
    }

    /// Marks a customer inactive, keeping the record.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown id.
    pub fn soft_delete(&self, id: &str) -> CoreResult<Customer> {
        let mut patch = Fields::new();
        patch.insert("status".into(), json!(STATUS_INACTIVE));
        patch.insert("deletedAt".into(), json!(Timestamp::now().to_string()));
        self.update_customer(id, patch)
    }

    /// Reactivates a soft-deleted customer.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown id.
    pub fn restore(&self, id: &str) -> CoreResult<Customer> {
        let mut patch = Fields::new();
        patch.insert("status".into(), json!(STATUS_ACTIVE));
        patch.insert("deletedAt".into(), Value::Null);
        self.update_customer(id, patch)
    }

    /// Removes the record. Returns `false` if it did not exist.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the table cannot be written.
    pub fn delete_permanently(&self, id: &str) -> CoreResult<bool> {
        self.store.delete(id)
    }

    /// Customers matching `term` in any field (case-insensitive) and the
    /// filters, sorted by name.
    #[must_use]
    pub fn search(&self, term: &str, filters: &CustomerSearch) -> Vec<Customer> {
        let term = term.trim().to_lowercase();
        let records = self
            .store
            .find_all(&FindOptions::new().filter(|r| term.is_empty() || mentions(r, &term)));

        let mut customers: Vec<Customer> = typed::<Customer>(TABLE, records)
            .into_iter()
            .filter(|c| filters.status.as_ref().map_or(true, |s| *s == c.status))
            .filter(|c| filters.category.as_ref().map_or(true, |k| *k == c.category))
            .filter(|c| {
                c.total_spent >= filters.min_total_spent && c.total_spent <= filters.max_total_spent
            })
            .collect();
        customers.sort_by_cached_key(|c| c.name.to_lowercase());
        customers
            .into_iter()
            .skip(filters.offset)
            .take(filters.limit)
            .collect()
    }

    /// The `limit` active customers with the highest total spend.
    #[must_use]
    pub fn top_by_spend(&self, limit: usize) -> Vec<Customer> {
        let mut customers: Vec<Customer> =
            self.list().into_iter().filter(Customer::is_active).collect();
        customers.sort_by(|a, b| b.total_spent.total_cmp(&a.total_spent));
        customers.truncate(limit);
        customers
    }

    /// Active customers whose last service is older than `cutoff`, longest
    /// absent first.
    #[must_use]
    pub fn inactive_since(&self, cutoff: Timestamp) -> Vec<Customer> {
        let mut dormant: Vec<(Timestamp, Customer)> = self
            .list()
            .into_iter()
            .filter(Customer::is_active)
            .filter_map(|c| {
                let last = c.last_service.as_deref().and_then(Timestamp::parse)?;
                (last < cutoff).then_some((last, c))
            })
            .collect();
        dormant.sort_by(|a, b| a.0.cmp(&b.0));
        dormant.into_iter().map(|(_, c)| c).collect()
    }

    /// Aggregate figures.
    #[must_use]
    pub fn stats(&self) -> CustomerStats {
        let customers = self.list();
        let mut stats = CustomerStats {
            total: customers.len(),
            ..CustomerStats::default()
        };
        for c in &customers {
            match c.status.as_str() {
                STATUS_ACTIVE => stats.active += 1,
                STATUS_INACTIVE => stats.inactive += 1,
                _ => {}
            }
            stats.total_spent += c.total_spent;
            stats.total_services += c.services_count;
            *stats.by_category.entry(c.category.clone()).or_default() += 1;
            if c.has_tag(TAG_VIP) {
                stats.vip_count += 1;
            }
            if c.services_count >= FREQUENT_SERVICES {
                stats.frequent_count += 1;
            }
        }
        if stats.total > 0 {
            #[allow(clippy::cast_precision_loss)]
            let total = stats.total as f64;
            stats.average_spent = stats.total_spent / total;
            #[allow(clippy::cast_precision_loss)]
            let services = stats.total_services as f64;
            stats.average_services = services / total;
        }
        stats
    }
}

fn tag_patch(tags: Vec<String>) -> Fields {
    let mut patch = Fields::new();
    patch.insert("tags".into(), json!(tags));
    patch
}

fn check_contact(email: Option<&str>, document: Option<&str>) -> CoreResult<()> {
    if let Some(email) = email.filter(|e| !e.is_empty()) {
        if !is_valid_email(email) {
            return Err(CoreError::validation(TABLE, format!("invalid e-mail: {email}")));
        }
    }
    if let Some(document) = document.filter(|d| !d.is_empty()) {
        if !is_valid_document(document) {
            return Err(CoreError::validation(
                TABLE,
                format!("invalid document: {document}"),
            ));
        }
    }
    Ok(())
}

/// Trims the name, formats phones and checks contact fields of a patch.
fn normalize(patch: &mut Fields) -> CoreResult<()> {
    if let Some(Value::String(name)) = patch.get_mut("name") {
        *name = name.trim().to_string();
        if name.is_empty() {
            return Err(CoreError::validation(TABLE, "name must not be empty"));
        }
    }
    for key in ["phone", "phone2"] {
        if let Some(Value::String(phone)) = patch.get_mut(key) {
            *phone = format_phone(phone.trim());
        }
    }
    check_contact(
        patch.get("email").and_then(Value::as_str),
        patch.get("document").and_then(Value::as_str),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::fields;
    use ifix_storage::{InMemoryStore, KeyValueStore};
    use std::sync::Arc;

    fn customers() -> CustomerStore {
        Database::in_memory().customers().unwrap()
    }

    fn ana() -> NewCustomer {
        NewCustomer {
            email: Some("ana@example.com".into()),
            ..NewCustomer::new("  Ana Souza ", "11999998888")
        }
    }

    #[test]
    fn phone_formatting() {
        assert_eq!(format_phone("11999998888"), "(11) 99999-8888");
        assert_eq!(format_phone("(11) 9 9999-8888"), "(11) 99999-8888");
        assert_eq!(format_phone("1133334444"), "(11) 3333-4444");
        assert_eq!(format_phone("123"), "123");
    }

    #[test]
    fn email_and_document_checks() {
        assert!(is_valid_email("a@b.co"));
        assert!(is_valid_email("joao.silva@email.com"));
        assert!(!is_valid_email("a@b"));
        assert!(!is_valid_email("a b@c.d"));
        assert!(!is_valid_email("@b.c"));
        assert!(!is_valid_email("a@.c"));
        assert!(!is_valid_email("a@b@c.d"));

        assert!(is_valid_document("123.456.789-00"));
        assert!(is_valid_document("12.345.678/0001-90"));
        assert!(!is_valid_document("123"));
    }

    #[test]
    fn create_applies_defaults() {
        let store = customers();
        let ana = store.create_customer(ana()).unwrap();

        assert!(ana.id.starts_with("cust_"));
        assert_eq!(ana.name, "Ana Souza");
        assert_eq!(ana.phone, "(11) 99999-8888");
        assert_eq!(ana.category, "regular");
        assert_eq!(ana.status, "active");
        assert_eq!(ana.total_spent, 0.0);
        assert_eq!(ana.services_count, 0);
        assert!(ana.last_service.is_none());
        assert_eq!(store.get(&ana.id), Some(ana));
    }

    #[test]
    fn create_rejects_bad_input() {
        let store = customers();
        assert!(matches!(
            store.create_customer(NewCustomer::new("", "119")),
            Err(CoreError::Validation { .. })
        ));
        let bad_email = NewCustomer {
            email: Some("nope".into()),
            ..NewCustomer::new("Ana", "11999998888")
        };
        assert!(store.create_customer(bad_email).is_err());
        let bad_doc = NewCustomer {
            document: Some("12".into()),
            ..NewCustomer::new("Ana", "11999998888")
        };
        assert!(store.create_customer(bad_doc).is_err());
        assert_eq!(store.store().count(), 0);
    }

    #[test]
    fn same_phone_or_email_merges() {
        let store = customers();
        let first = store.create_customer(ana()).unwrap();

        let again = store
            .create_customer(NewCustomer::new("Ana S.", "(11) 99999-8888"))
            .unwrap();
        assert_eq!(again.id, first.id);
        assert_eq!(again.name, "Ana S.");
        assert_eq!(again.email, "ana@example.com");
        assert_eq!(again.version, 2);

        let by_email = NewCustomer {
            email: Some("ANA@example.com".into()),
            ..NewCustomer::new("Ana", "21988887777")
        };
        assert_eq!(store.create_customer(by_email).unwrap().id, first.id);
        assert_eq!(store.store().count(), 1);
    }

    #[test]
    fn services_promote_customers() {
        let store = customers();
        let id = store.create_customer(ana()).unwrap().id;

        let c = store.record_service(&id, 1200.0).unwrap();
        assert_eq!(c.services_count, 1);
        assert_eq!(c.category, "regular");
        assert!(c.last_service.is_some());
        assert!(store.vip_customers().is_empty());

        let c = store.record_service(&id, 4000.0).unwrap();
        assert_eq!(c.total_spent, 5200.0);
        assert_eq!(c.category, "premium");
        assert!(c.has_tag("vip"));

        let c = store.record_service(&id, 10.0).unwrap();
        assert_eq!(c.tags.iter().filter(|t| *t == "vip").count(), 1);
        assert_eq!(store.vip_customers().len(), 1);
        assert_eq!(store.frequent_customers(3).len(), 1);

        assert!(matches!(
            store.record_service("missing", 1.0),
            Err(CoreError::NotFound { .. })
        ));
    }

    #[test]
    fn soft_delete_and_restore() {
        let store = customers();
        let id = store.create_customer(ana()).unwrap().id;

        let gone = store.soft_delete(&id).unwrap();
        assert!(!gone.is_active());
        assert!(gone.deleted_at.is_some());
        assert!(store.top_by_spend(10).is_empty());
        assert_eq!(store.by_status("inactive").len(), 1);

        let back = store.restore(&id).unwrap();
        assert!(back.is_active());
        assert!(back.deleted_at.is_none());

        assert!(store.delete_permanently(&id).unwrap());
        assert!(store.get(&id).is_none());
    }

    #[test]
    fn tags_are_set_like() {
        let store = customers();
        let id = store.create_customer(ana()).unwrap().id;

        store.add_tag(&id, "corporate").unwrap();
        let c = store.add_tag(&id, "corporate").unwrap();
        assert_eq!(c.tags, vec!["corporate"]);
        assert_eq!(c.version, 2);

        let c = store.remove_tag(&id, "corporate").unwrap();
        assert!(c.tags.is_empty());
        assert_eq!(store.remove_tag(&id, "corporate").unwrap().version, 3);
    }

    #[test]
    fn search_and_rankings() {
        let store = customers();
        let ana = store.create_customer(ana()).unwrap();
        let bruno = store
            .create_customer(NewCustomer {
                category: Some("corporate".into()),
                address: Some(Address {
                    city: "Curitiba".into(),
                    ..Address::default()
                }),
                ..NewCustomer::new("Bruno Lima", "41966666666")
            })
            .unwrap();
        store.record_service(&bruno.id, 300.0).unwrap();

        let found = store.search("SOUZA", &CustomerSearch::default());
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, ana.id);
        assert_eq!(store.search("curitiba", &CustomerSearch::default()).len(), 1);

        let corporate = CustomerSearch {
            category: Some("corporate".into()),
            ..CustomerSearch::default()
        };
        assert_eq!(store.search("", &corporate).len(), 1);
        let names: Vec<_> = store
            .search("", &CustomerSearch::default())
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["Ana Souza", "Bruno Lima"]);

        assert_eq!(store.top_by_spend(1)[0].id, bruno.id);
        assert_eq!(store.by_category("corporate").len(), 1);
        assert_eq!(store.find_by_document("").map(|c| c.id), None);

        let stats = store.stats();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.active, 2);
        assert_eq!(stats.total_services, 1);
        assert_eq!(stats.by_category.get("corporate"), Some(&1));
        assert_eq!(stats.average_spent, 150.0);

        let future = Timestamp::now().plus_millis(60_000);
        assert_eq!(store.inactive_since(future).len(), 1);
    }

    #[test]
    fn legacy_rows_are_read_and_meta_rows_skipped() {
        let storage = Arc::new(InMemoryStore::new());
        storage
            .set(
                "IFIX_CUSTOMERS",
                r#"[
                    {"id": "customers_meta", "type": "metadata", "version": "2.0.0"},
                    {"id": "cust_001", "name": "João Silva Santos", "phone": "(11) 99999-9999",
                     "document": "123.456.789-00", "tags": ["vip", "frequent"],
                     "totalSpent": 2850.5, "servicesCount": 8, "lastService": null,
                     "status": "active", "createdAt": "2024-01-10T12:00:00.000Z"}
                ]"#,
            )
            .unwrap();
        let db = Database::with_storage(storage, crate::Config::default());
        let store = db.customers().unwrap();

        assert_eq!(store.store().count(), 2);
        let list = store.list();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].created_at, "2024-01-10T12:00:00.000Z");
        assert_eq!(
            store.find_by_document("12345678900").map(|c| c.id),
            Some("cust_001".to_string())
        );

        let updated = store
            .update_customer("cust_001", fields(json!({"phone2": "1133334444"})))
            .unwrap();
        assert_eq!(updated.phone2, "(11) 3333-4444");
    }
}
