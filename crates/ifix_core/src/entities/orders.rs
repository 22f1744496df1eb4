//! Service orders and their status workflow.

use super::customers::CustomerStore;
use super::{mentions, null_as_default, typed};
use crate::database::Database;
use crate::error::{CoreError, CoreResult};
use crate::query::{Condition, FindOptions, SortOrder};
use crate::record::{fields, Fields};
use crate::store::RecordStore;
use crate::table::TableSchema;
use crate::types::{generate_id, Timestamp};
use chrono::Datelike;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tracing::{info, warn};

const TABLE: &str = "ORDERS";
const ID_PREFIX: &str = "order";

const DEFAULT_WARRANTY_DAYS: u32 = 90;

/// Steps of the default checklist, all initially unchecked.
const CHECKLIST: [&str; 9] = [
    "recebimento",
    "backup",
    "diagnostico",
    "orcamento",
    "aprovacao",
    "reparo",
    "teste",
    "limpeza",
    "entrega",
];

/// Where an order stands in the repair workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Received, not yet looked at.
    #[default]
    Aberta,
    /// Being diagnosed.
    Diagnostico,
    /// Waiting for parts.
    AguardandoPecas,
    /// Waiting for the customer to approve the quote.
    AguardandoAprovacao,
    /// Repair in progress.
    EmExecucao,
    /// Repair finished, device not yet picked up.
    Concluida,
    /// Delivered to the customer.
    Entregue,
    /// Cancelled.
    Cancelada,
}

impl OrderStatus {
    /// Every status, in workflow order.
    pub const ALL: [Self; 8] = [
        Self::Aberta,
        Self::Diagnostico,
        Self::AguardandoPecas,
        Self::AguardandoAprovacao,
        Self::EmExecucao,
        Self::Concluida,
        Self::Entregue,
        Self::Cancelada,
    ];

    /// Stored name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Aberta => "aberta",
            Self::Diagnostico => "diagnostico",
            Self::AguardandoPecas => "aguardando_pecas",
            Self::AguardandoAprovacao => "aguardando_aprovacao",
            Self::EmExecucao => "em_execucao",
            Self::Concluida => "concluida",
            Self::Entregue => "entregue",
            Self::Cancelada => "cancelada",
        }
    }

    /// Statuses reachable in one step.
    #[must_use]
    pub const fn next(self) -> &'static [Self] {
        match self {
            Self::Aberta => &[Self::Diagnostico, Self::Cancelada],
            Self::Diagnostico => &[
                Self::AguardandoPecas,
                Self::AguardandoAprovacao,
                Self::Cancelada,
            ],
            Self::AguardandoPecas | Self::AguardandoAprovacao => {
                &[Self::EmExecucao, Self::Cancelada]
            }
            Self::EmExecucao => &[Self::Concluida, Self::Cancelada],
            Self::Concluida => &[Self::Entregue],
            Self::Entregue | Self::Cancelada => &[],
        }
    }

    /// Returns `true` if the workflow allows moving to `to`. Staying put is
    /// always allowed.
    #[must_use]
    pub fn can_move_to(self, to: Self) -> bool {
        self == to || self.next().contains(&to)
    }

    /// Returns `true` while work on the order is still outstanding.
    #[must_use]
    pub const fn is_pending(self) -> bool {
        !matches!(self, Self::Concluida | Self::Entregue | Self::Cancelada)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| CoreError::validation(TABLE, format!("unknown order status: {s}")))
    }
}

/// Order priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[allow(missing_docs)]
pub enum Priority {
    Baixa,
    #[default]
    Normal,
    Alta,
    Urgente,
}

impl Priority {
    /// Stored name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Baixa => "baixa",
            Self::Normal => "normal",
            Self::Alta => "alta",
            Self::Urgente => "urgente",
        }
    }

    /// Queue rank: urgent orders first.
    #[must_use]
    pub const fn rank(self) -> u8 {
        match self {
            Self::Urgente => 0,
            Self::Alta => 1,
            Self::Normal => 2,
            Self::Baixa => 3,
        }
    }
}

/// Payment state of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[allow(missing_docs)]
pub enum PaymentStatus {
    #[default]
    Pendente,
    Parcial,
    Pago,
    Cancelado,
}

impl PaymentStatus {
    /// Stored name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pendente => "pendente",
            Self::Parcial => "parcial",
            Self::Pago => "pago",
            Self::Cancelado => "cancelado",
        }
    }
}

/// A part needed for a repair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    /// Part id, empty for parts entered with the order.
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: String,
    /// Description.
    pub name: String,
    /// Units needed.
    #[serde(default = "one")]
    pub quantity: u32,
    /// Unit cost.
    #[serde(default, deserialize_with = "null_as_default")]
    pub cost: f64,
    /// Free-form notes.
    #[serde(default, deserialize_with = "null_as_default")]
    pub notes: String,
}

const fn one() -> u32 {
    1
}

impl Part {
    /// Cost times quantity.
    #[must_use]
    pub fn total(&self) -> f64 {
        self.cost * f64::from(self.quantity)
    }
}

/// Input for [`OrderStore::add_part`].
#[derive(Debug, Clone, Default, PartialEq)]
#[allow(missing_docs)]
pub struct NewPart {
    pub name: String,
    pub quantity: u32,
    pub cost: f64,
    pub notes: String,
}

/// A stored service order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct Order {
    pub id: String,
    #[serde(rename = "created_at")]
    pub created_at: String,
    #[serde(rename = "updated_at")]
    pub updated_at: String,
    #[serde(rename = "_version")]
    pub version: u64,
    /// `OS-YYYY-MM-NNN`.
    pub order_number: String,
    pub customer_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub customer_name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub customer_phone: String,
    pub device_model: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub device_serial: String,
    pub service: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub issue_description: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub diagnosis: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub parts_required: Vec<Part>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub labor_cost: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub parts_cost: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub total_value: f64,
    /// Free text such as `3 horas`; the first number is read as hours.
    #[serde(default, deserialize_with = "null_as_default")]
    pub estimated_time: String,
    #[serde(default)]
    pub actual_time: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub technician: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub priority: Priority,
    #[serde(default, deserialize_with = "null_as_default")]
    pub status: OrderStatus,
    #[serde(default = "default_warranty")]
    pub warranty_days: u32,
    #[serde(default)]
    pub payment_method: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub payment_status: PaymentStatus,
    #[serde(default, deserialize_with = "null_as_default")]
    pub notes: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub checklist: BTreeMap<String, bool>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub photos: Vec<String>,
    #[serde(default)]
    pub started_at: Option<String>,
    #[serde(default)]
    pub completed_at: Option<String>,
    #[serde(default)]
    pub delivered_at: Option<String>,
}

const fn default_warranty() -> u32 {
    DEFAULT_WARRANTY_DAYS
}

impl Order {
    /// Hours parsed from the first number in `estimated_time`.
    #[must_use]
    pub fn estimated_hours(&self) -> Option<i64> {
        let start = self.estimated_time.find(|c: char| c.is_ascii_digit())?;
        let digits: String = self.estimated_time[start..]
            .chars()
            .take_while(char::is_ascii_digit)
            .collect();
        digits.parse().ok()
    }

    /// When the order should be done: `started_at` plus the estimate.
    #[must_use]
    pub fn due_at(&self) -> Option<Timestamp> {
        let started = self.started_at.as_deref().and_then(Timestamp::parse)?;
        Some(started.plus_millis(self.estimated_hours()? * 3_600_000))
    }
}

/// Input for [`OrderStore::create_order`].
#[derive(Debug, Clone, Default, PartialEq)]
#[allow(missing_docs)]
pub struct NewOrder {
    pub customer_id: String,
    pub customer_name: String,
    pub customer_phone: String,
    pub device_model: String,
    pub device_serial: String,
    pub service: String,
    pub issue_description: String,
    pub parts_required: Vec<Part>,
    pub labor_cost: f64,
    pub parts_cost: f64,
    /// Defaults to labor plus parts.
    pub total_value: Option<f64>,
    pub estimated_time: String,
    pub technician: String,
    pub priority: Priority,
    pub warranty_days: Option<u32>,
    pub payment_method: Option<String>,
    pub notes: String,
    /// Defaults to the next number of the current month.
    pub order_number: Option<String>,
}

impl NewOrder {
    /// Creates an input with the required fields.
    #[must_use]
    pub fn new(
        customer_id: impl Into<String>,
        device_model: impl Into<String>,
        service: impl Into<String>,
    ) -> Self {
        Self {
            customer_id: customer_id.into(),
            device_model: device_model.into(),
            service: service.into(),
            ..Self::default()
        }
    }
}

/// Aggregate figures over all orders.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct OrderStats {
    pub total: usize,
    pub by_status: BTreeMap<String, usize>,
    pub by_priority: BTreeMap<String, usize>,
    pub by_payment_status: BTreeMap<String, usize>,
    pub pending: usize,
    pub completed: usize,
    pub delivered: usize,
    pub cancelled: usize,
    /// Value of completed orders.
    pub revenue: f64,
    pub delivered_revenue: f64,
    pub pending_revenue: f64,
    pub parts_revenue: f64,
    pub labor_revenue: f64,
    pub avg_order_value: f64,
    /// Mean hours from start to completion of completed orders.
    pub avg_time_hours: f64,
}

/// A window over `created_at`. Open ends are `None`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateRange {
    /// First instant included.
    pub start: Option<Timestamp>,
    /// Last instant included.
    pub end: Option<Timestamp>,
}

impl DateRange {
    /// Every order.
    pub const ALL: Self = Self {
        start: None,
        end: None,
    };

    /// Parses optional bounds. A bare `YYYY-MM-DD` end covers that whole day.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if a bound is not a date.
    pub fn parse(start: Option<&str>, end: Option<&str>) -> CoreResult<Self> {
        let start = start.map(parse_bound).transpose()?;
        let end = match end {
            Some(raw) if is_bare_date(raw) => Some(parse_bound(raw)?.plus_millis(DAY_MILLIS - 1)),
            Some(raw) => Some(parse_bound(raw)?),
            None => None,
        };
        Ok(Self { start, end })
    }

    /// Whether the stamp `created_at` falls inside. Unparsable stamps only
    /// fall inside the unbounded range.
    #[must_use]
    pub fn contains(&self, created_at: &str) -> bool {
        if self.start.is_none() && self.end.is_none() {
            return true;
        }
        let Some(at) = Timestamp::parse(created_at) else {
            return false;
        };
        self.start.map_or(true, |s| at >= s) && self.end.map_or(true, |e| at <= e)
    }
}

const DAY_MILLIS: i64 = 86_400_000;

fn is_bare_date(raw: &str) -> bool {
    raw.trim().len() == "YYYY-MM-DD".len()
}

fn parse_bound(raw: &str) -> CoreResult<Timestamp> {
    Timestamp::parse(raw).ok_or_else(|| CoreError::validation(TABLE, format!("invalid date: {raw}")))
}

/// Filters for [`OrderStore::search`].
#[derive(Debug, Clone, PartialEq)]
pub struct OrderSearch {
    /// Only orders in this status.
    pub status: Option<OrderStatus>,
    /// Only orders with this priority.
    pub priority: Option<Priority>,
    /// Only orders with this payment status.
    pub payment_status: Option<PaymentStatus>,
    /// Only orders assigned to this technician.
    pub technician: Option<String>,
    /// Only orders of this customer.
    pub customer_id: Option<String>,
    /// Creation window.
    pub created: DateRange,
    /// Stored field to sort by, `created_at` by default.
    pub sort_by: String,
    /// Newest first by default.
    pub order: SortOrder,
    /// Defaults to 100.
    pub limit: usize,
    /// Matches skipped before `limit` applies.
    pub offset: usize,
}

impl Default for OrderSearch {
    fn default() -> Self {
        Self {
            status: None,
            priority: None,
            payment_status: None,
            technician: None,
            customer_id: None,
            created: DateRange::ALL,
            sort_by: "created_at".to_string(),
            order: SortOrder::Desc,
            limit: 100,
            offset: 0,
        }
    }
}

impl OrderSearch {
    fn admits(&self, order: &Order) -> bool {
        self.status.map_or(true, |s| order.status == s)
            && self.priority.map_or(true, |p| order.priority == p)
            && self.payment_status.map_or(true, |p| order.payment_status == p)
            && self.technician.as_ref().map_or(true, |t| *t == order.technician)
            && self.customer_id.as_ref().map_or(true, |c| *c == order.customer_id)
            && self.created.contains(&order.created_at)
    }
}

/// Completed work in one calendar month.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct MonthStats {
    /// Orders created in the month.
    pub total: usize,
    pub completed: usize,
    /// Value of the completed orders.
    pub revenue: f64,
    pub avg_value: f64,
}

/// A name and how many orders carry it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[allow(missing_docs)]
pub struct RankedCount {
    pub name: String,
    pub count: usize,
}

/// Workload and results of one technician.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct TechnicianStats {
    pub total: usize,
    pub completed: usize,
    pub revenue: f64,
    /// Percentage of assigned orders that were completed.
    pub completion_rate: f64,
    pub avg_revenue: f64,
    pub avg_time_hours: f64,
}

/// One completed order in a [`RevenueReport`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct RevenueLine {
    pub order_number: String,
    pub customer_name: String,
    pub service: String,
    pub device_model: String,
    pub total_value: f64,
    pub payment_status: PaymentStatus,
    pub completed_at: Option<String>,
}

/// Revenue over a creation window.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct RevenueReport {
    pub start: Option<String>,
    pub end: Option<String>,
    pub summary: OrderStats,
    pub orders: Vec<RevenueLine>,
    pub top_services: Vec<RankedCount>,
    pub top_models: Vec<RankedCount>,
}

/// Typed access to the `ORDERS` table.
#[derive(Debug, Clone)]
pub struct OrderStore {
    store: RecordStore,
    customers: CustomerStore,
}

impl OrderStore {
    /// Opens the table with its schema.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the table cannot be initialized.
    pub fn open(db: &Database) -> CoreResult<Self> {
        let schema = TableSchema::required(["orderNumber", "customerId", "service", "deviceModel"])
            .with_optional([
                "customerName",
                "customerPhone",
                "deviceSerial",
                "issueDescription",
                "diagnosis",
                "partsRequired",
                "laborCost",
                "partsCost",
                "totalValue",
                "estimatedTime",
                "actualTime",
                "technician",
                "priority",
                "status",
                "warrantyDays",
                "paymentMethod",
                "paymentStatus",
                "notes",
                "checklist",
                "photos",
                "startedAt",
                "completedAt",
                "deliveredAt",
            ]);
        let store = db.table_with_schema(TABLE, schema)?.with_id_prefix(ID_PREFIX);
        Ok(Self {
            store,
            customers: db.customers()?,
        })
    }

    /// The underlying record store.
    #[must_use]
    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    /// The next order number for the month of `now`.
    #[must_use]
    pub fn next_order_number(&self, now: Timestamp) -> String {
        let month = now.as_datetime().format("%Y-%m").to_string();
        let prefix = format!("{month}-");
        let this_month = self
            .store
            .find_all(&FindOptions::new().filter(|r| r.created_at.starts_with(&prefix)))
            .len();
        format!("OS-{month}-{:03}", this_month + 1)
    }

    /// Opens an order.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if the customer, device model or service is
    /// missing.
    pub fn create_order(&self, input: NewOrder) -> CoreResult<Order> {
        let order_number = input
            .order_number
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| self.next_order_number(Timestamp::now()));
        let total_value = input
            .total_value
            .filter(|v| *v != 0.0)
            .unwrap_or(input.labor_cost + input.parts_cost);
        let checklist: BTreeMap<&str, bool> = CHECKLIST.iter().map(|step| (*step, false)).collect();

        let value = json!({
            "orderNumber": order_number,
            "customerId": input.customer_id.trim(),
            "customerName": input.customer_name,
            "customerPhone": input.customer_phone,
            "deviceModel": input.device_model.trim(),
            "deviceSerial": input.device_serial,
            "service": input.service.trim(),
            "issueDescription": input.issue_description,
            "diagnosis": "",
            "partsRequired": input.parts_required,
            "laborCost": input.labor_cost,
            "partsCost": input.parts_cost,
            "totalValue": total_value,
            "estimatedTime": input.estimated_time,
            "actualTime": null,
            "technician": input.technician,
            "priority": input.priority,
            "status": OrderStatus::Aberta,
            "warrantyDays": input.warranty_days.unwrap_or(DEFAULT_WARRANTY_DAYS),
            "paymentMethod": input.payment_method,
            "paymentStatus": PaymentStatus::Pendente,
            "notes": input.notes,
            "checklist": checklist,
            "photos": [],
            "startedAt": null,
            "completedAt": null,
            "deliveredAt": null,
        });
        let record = self.store.create(fields(value))?;
        let order: Order = record.to_entity()?;
        info!(
            id = %order.id,
            number = %order.order_number,
            device = %order.device_model,
            service = %order.service,
            "order created"
        );
        Ok(order)
    }

    /// Merges `patch` onto an order.
    ///
    /// A `status` change must follow the workflow. Changing `laborCost` or
    /// `partsCost` without `totalValue` recomputes the total. Entering
    /// `em_execucao`, `concluida` or `entregue` stamps `startedAt`,
    /// `completedAt` or `deliveredAt` unless set. Completing an order adds
    /// its value to the customer's history.
    ///
    /// # Errors
    ///
    /// Returns `NotFound`, `Validation` for an unknown status,
    /// `InvalidTransition` for a move the workflow forbids, or
    /// `VersionConflict` if the order changed concurrently.
    pub fn update_order(&self, id: &str, mut patch: Fields) -> CoreResult<Order> {
        let existing = self.require(id)?;

        let target = match patch.get("status") {
            Some(Value::String(s)) => s.parse::<OrderStatus>()?,
            Some(other) => {
                return Err(CoreError::validation(
                    TABLE,
                    format!("status must be a string, got {other}"),
                ))
            }
            None => existing.status,
        };
        if !existing.status.can_move_to(target) {
            return Err(CoreError::invalid_transition(existing.status.as_str(), target.as_str()));
        }

        if !patch.contains_key("totalValue")
            && (patch.contains_key("laborCost") || patch.contains_key("partsCost"))
        {
            let labor = number(&patch, "laborCost").unwrap_or(existing.labor_cost);
            let parts = number(&patch, "partsCost").unwrap_or(existing.parts_cost);
            patch.insert("totalValue".into(), json!(labor + parts));
        }

        if target != existing.status {
            let stamp = match target {
                OrderStatus::EmExecucao => Some(("startedAt", existing.started_at.is_none())),
                OrderStatus::Concluida => Some(("completedAt", existing.completed_at.is_none())),
                OrderStatus::Entregue => Some(("deliveredAt", existing.delivered_at.is_none())),
                _ => None,
            };
            if let Some((field, unset)) = stamp {
                if unset && !patch.contains_key(field) {
                    patch.insert(field.into(), json!(Timestamp::now().to_string()));
                }
            }
        }

        let record = self.store.update_versioned(id, existing.version, patch)?;
        let order: Order = record.to_entity()?;
        info!(id = %order.id, number = %order.order_number, version = order.version, "order updated");

        if order.status == OrderStatus::Concluida && existing.status != OrderStatus::Concluida {
            if let Err(e) = self.customers.record_service(&order.customer_id, order.total_value) {
                warn!(
                    order = %order.id,
                    customer = %order.customer_id,
                    error = %e,
                    "could not update customer after completion"
                );
            }
        }
        Ok(order)
    }

    /// Moves an order to `status`.
    ///
    /// # Errors
    ///
    /// Same as [`Self::update_order`].
    pub fn set_status(&self, id: &str, status: OrderStatus) -> CoreResult<Order> {
        self.update_order(id, fields(json!({ "status": status })))
    }

    /// Cancels an order, appending the reason to its notes.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` for delivered or already cancelled orders.
    pub fn cancel_order(&self, id: &str, reason: Option<&str>) -> CoreResult<Order> {
        let order = self.require(id)?;
        if !order.status.next().contains(&OrderStatus::Cancelada) {
            return Err(CoreError::invalid_transition(
                order.status.as_str(),
                OrderStatus::Cancelada.as_str(),
            ));
        }
        let note = match reason.map(str::trim).filter(|r| !r.is_empty()) {
            Some(reason) => format!("\n\nCancelada: {reason}"),
            None => "\n\nCancelada sem motivo informado.".to_string(),
        };
        self.update_order(
            id,
            fields(json!({
                "status": OrderStatus::Cancelada,
                "notes": format!("{}{note}", order.notes),
            })),
        )
    }

    /// Looks up an order.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Order> {
        self.store.find_by_id(id).and_then(|r| r.to_entity().ok())
    }

    fn require(&self, id: &str) -> CoreResult<Order> {
        self.get(id).ok_or_else(|| CoreError::not_found(TABLE, id))
    }

    /// All orders in creation order.
    #[must_use]
    pub fn list(&self) -> Vec<Order> {
        typed(TABLE, self.store.find_all(&FindOptions::new()))
    }

    /// Orders of a customer, newest first. Delivered and cancelled orders
    /// are left out unless `include_closed`.
    #[must_use]
    pub fn by_customer(&self, customer_id: &str, include_closed: bool) -> Vec<Order> {
        let options = FindOptions::new().sort_by("created_at", SortOrder::Desc);
        typed::<Order>(
            TABLE,
            self.store
                .find_where(&[Condition::eq("customerId", customer_id)], &options),
        )
        .into_iter()
        .filter(|o| include_closed || !matches!(o.status, OrderStatus::Entregue | OrderStatus::Cancelada))
        .collect()
    }

    /// Orders in `status`, oldest first.
    #[must_use]
    pub fn by_status(&self, status: OrderStatus) -> Vec<Order> {
        let options = FindOptions::new().sort_by("created_at", SortOrder::Asc);
        typed(
            TABLE,
            self.store
                .find_where(&[Condition::eq("status", status.as_str())], &options),
        )
    }

    /// Outstanding orders, most urgent first, then oldest first.
    #[must_use]
    pub fn pending(&self) -> Vec<Order> {
        let mut orders: Vec<Order> = self
            .list()
            .into_iter()
            .filter(|o| o.status.is_pending())
            .collect();
        orders.sort_by(|a, b| {
            a.priority
                .rank()
                .cmp(&b.priority.rank())
                .then_with(|| a.created_at.cmp(&b.created_at))
        });
        orders
    }

    /// Outstanding orders whose estimate has run out by `now`.
    #[must_use]
    pub fn overdue(&self, now: Timestamp) -> Vec<Order> {
        self.pending()
            .into_iter()
            .filter(|o| o.due_at().is_some_and(|due| due < now))
            .collect()
    }

    /// Sets the payment status and, if given, the payment method.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown id.
    pub fn update_payment(
        &self,
        id: &str,
        status: PaymentStatus,
        method: Option<&str>,
    ) -> CoreResult<Order> {
        let mut patch = fields(json!({ "paymentStatus": status }));
        if let Some(method) = method {
            patch.insert("paymentMethod".into(), json!(method));
        }
        self.update_order(id, patch)
    }

    /// Ticks or unticks a checklist step. When every step is ticked and the
    /// workflow allows it, the order is completed.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown id.
    pub fn update_checklist(&self, id: &str, step: &str, done: bool) -> CoreResult<Order> {
        let order = self.require(id)?;
        let mut checklist = order.checklist.clone();
        checklist.insert(step.to_string(), done);

        let mut patch = fields(json!({ "checklist": checklist }));
        if checklist.values().all(|v| *v) && order.status.can_move_to(OrderStatus::Concluida) {
            patch.insert("status".into(), json!(OrderStatus::Concluida));
        }
        self.update_order(id, patch)
    }

    /// Adds a part and recomputes parts cost and total.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown id.
    pub fn add_part(&self, id: &str, part: NewPart) -> CoreResult<Order> {
        let order = self.require(id)?;
        let mut parts = order.parts_required.clone();
        parts.push(Part {
            id: generate_id("part"),
            name: part.name,
            quantity: part.quantity.max(1),
            cost: part.cost,
            notes: part.notes,
        });
        self.replace_parts(&order, parts)
    }

    /// Removes the part `part_id` and recomputes parts cost and total.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown order.
    pub fn remove_part(&self, id: &str, part_id: &str) -> CoreResult<Order> {
        let order = self.require(id)?;
        let parts: Vec<Part> = order
            .parts_required
            .iter()
            .filter(|p| p.id != part_id)
            .cloned()
            .collect();
        if parts.len() == order.parts_required.len() {
            return Ok(order);
        }
        self.replace_parts(&order, parts)
    }

    fn replace_parts(&self, order: &Order, parts: Vec<Part>) -> CoreResult<Order> {
        let parts_cost: f64 = parts.iter().map(Part::total).sum();
        self.update_order(
            &order.id,
            fields(json!({
                "partsRequired": parts,
                "partsCost": parts_cost,
                "totalValue": order.labor_cost + parts_cost,
            })),
        )
    }

    /// Orders mentioning `term` in any field that pass `filters`. An empty
    /// term matches everything.
    #[must_use]
    pub fn search(&self, term: &str, filters: &OrderSearch) -> Vec<Order> {
        let term = term.trim().to_lowercase();
        let options = FindOptions::new()
            .filter(|r| term.is_empty() || mentions(r, &term))
            .sort_by(filters.sort_by.as_str(), filters.order);
        typed::<Order>(TABLE, self.store.find_all(&options))
            .into_iter()
            .filter(|o| filters.admits(o))
            .skip(filters.offset)
            .take(filters.limit)
            .collect()
    }

    /// Aggregate figures over all orders.
    #[must_use]
    pub fn stats(&self) -> OrderStats {
        self.stats_between(&DateRange::ALL)
    }

    /// Aggregate figures over orders created within `range`.
    #[must_use]
    pub fn stats_between(&self, range: &DateRange) -> OrderStats {
        let orders: Vec<Order> = self
            .list()
            .into_iter()
            .filter(|o| range.contains(&o.created_at))
            .collect();
        summarize(&orders)
    }

    /// Per-month figures for orders created in `year`, keyed `1..=12`.
    /// Months are taken in UTC.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn monthly_stats(&self, year: i32) -> BTreeMap<u32, MonthStats> {
        let mut months: BTreeMap<u32, MonthStats> =
            (1..=12).map(|m| (m, MonthStats::default())).collect();
        for o in self.list() {
            let Some(created) = Timestamp::parse(&o.created_at) else {
                continue;
            };
            let created = created.as_datetime();
            if created.year() != year {
                continue;
            }
            let Some(month) = months.get_mut(&created.month()) else {
                continue;
            };
            month.total += 1;
            if o.status == OrderStatus::Concluida {
                month.completed += 1;
                month.revenue += o.total_value;
            }
        }
        for month in months.values_mut().filter(|m| m.completed > 0) {
            month.avg_value = month.revenue / month.completed as f64;
        }
        months
    }

    /// The `limit` most requested services, most frequent first.
    #[must_use]
    pub fn top_services(&self, limit: usize) -> Vec<RankedCount> {
        tally(self.list().into_iter().map(|o| o.service), limit)
    }

    /// The `limit` most serviced device models, most frequent first.
    #[must_use]
    pub fn top_models(&self, limit: usize) -> Vec<RankedCount> {
        tally(self.list().into_iter().map(|o| o.device_model), limit)
    }

    /// Figures per technician. Orders without one are left out.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn technician_performance(&self) -> BTreeMap<String, TechnicianStats> {
        let mut hours: BTreeMap<String, Vec<f64>> = BTreeMap::new();
        let mut by_technician: BTreeMap<String, TechnicianStats> = BTreeMap::new();
        for o in self.list() {
            let technician = o.technician.trim();
            if technician.is_empty() {
                continue;
            }
            let entry = by_technician.entry(technician.to_string()).or_default();
            entry.total += 1;
            if o.status == OrderStatus::Concluida {
                entry.completed += 1;
                entry.revenue += o.total_value;
                if let Some(h) = turnaround_hours(&o) {
                    hours.entry(technician.to_string()).or_default().push(h);
                }
            }
        }
        for (name, stats) in &mut by_technician {
            stats.completion_rate = stats.completed as f64 / stats.total as f64 * 100.0;
            if stats.completed > 0 {
                stats.avg_revenue = stats.revenue / stats.completed as f64;
            }
            if let Some(h) = hours.get(name).filter(|h| !h.is_empty()) {
                stats.avg_time_hours = h.iter().sum::<f64>() / h.len() as f64;
            }
        }
        by_technician
    }

    /// Revenue figures and completed orders created within `range`, with
    /// the five leading services and models.
    #[must_use]
    pub fn revenue_report(&self, range: &DateRange) -> RevenueReport {
        let orders: Vec<Order> = self
            .list()
            .into_iter()
            .filter(|o| range.contains(&o.created_at))
            .collect();
        let lines = orders
            .iter()
            .filter(|o| o.status == OrderStatus::Concluida)
            .map(|o| RevenueLine {
                order_number: o.order_number.clone(),
                customer_name: o.customer_name.clone(),
                service: o.service.clone(),
                device_model: o.device_model.clone(),
                total_value: o.total_value,
                payment_status: o.payment_status,
                completed_at: o.completed_at.clone(),
            })
            .collect();
        RevenueReport {
            start: range.start.map(|t| t.to_string()),
            end: range.end.map(|t| t.to_string()),
            summary: summarize(&orders),
            orders: lines,
            top_services: tally(orders.iter().map(|o| o.service.clone()), 5),
            top_models: tally(orders.iter().map(|o| o.device_model.clone()), 5),
        }
    }
}

#[allow(clippy::cast_precision_loss)]
fn summarize(orders: &[Order]) -> OrderStats {
    let mut stats = OrderStats {
        total: orders.len(),
        ..OrderStats::default()
    };
    let mut hours = Vec::new();

    for o in orders {
        *stats.by_status.entry(o.status.to_string()).or_default() += 1;
        *stats
            .by_priority
            .entry(o.priority.as_str().to_string())
            .or_default() += 1;
        *stats
            .by_payment_status
            .entry(o.payment_status.as_str().to_string())
            .or_default() += 1;

        match o.status {
            OrderStatus::Concluida => {
                stats.completed += 1;
                stats.revenue += o.total_value;
                stats.parts_revenue += o.parts_cost;
                stats.labor_revenue += o.labor_cost;
                hours.extend(turnaround_hours(o));
            }
            OrderStatus::Entregue => {
                stats.delivered += 1;
                stats.delivered_revenue += o.total_value;
            }
            OrderStatus::Cancelada => stats.cancelled += 1,
            _ => {
                stats.pending += 1;
                stats.pending_revenue += o.total_value;
            }
        }
    }

    if stats.completed > 0 {
        stats.avg_order_value = stats.revenue / stats.completed as f64;
    }
    if !hours.is_empty() {
        stats.avg_time_hours = hours.iter().sum::<f64>() / hours.len() as f64;
    }
    stats
}

/// Hours from start to completion, when both are recorded.
#[allow(clippy::cast_precision_loss)]
fn turnaround_hours(order: &Order) -> Option<f64> {
    let started = order.started_at.as_deref().and_then(Timestamp::parse)?;
    let completed = order.completed_at.as_deref().and_then(Timestamp::parse)?;
    Some((completed.as_millis() - started.as_millis()) as f64 / 3_600_000.0)
}

/// Counts `values`, most frequent first, ties by name.
fn tally(values: impl Iterator<Item = String>, limit: usize) -> Vec<RankedCount> {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for value in values.filter(|v| !v.trim().is_empty()) {
        *counts.entry(value).or_default() += 1;
    }
    let mut ranked: Vec<RankedCount> = counts
        .into_iter()
        .map(|(name, count)| RankedCount { name, count })
        .collect();
    ranked.sort_by(|a, b| b.count.cmp(&a.count));
    ranked.truncate(limit);
    ranked
}

fn number(fields: &Fields, key: &str) -> Option<f64> {
    match fields.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::NewCustomer;
    use crate::transfer::{Format, ImportOptions};

    struct Fixture {
        db: Database,
        orders: OrderStore,
        customer: String,
    }

    fn fixture() -> Fixture {
        let db = Database::in_memory();
        let customer = db
            .customers()
            .unwrap()
            .create_customer(NewCustomer::new("Ana", "11999998888"))
            .unwrap()
            .id;
        let orders = db.orders().unwrap();
        Fixture { db, orders, customer }
    }

    fn screen(customer: &str) -> NewOrder {
        NewOrder {
            labor_cost: 350.0,
            parts_cost: 850.0,
            estimated_time: "3 horas".into(),
            ..NewOrder::new(customer, "IPHONE 13 PRO", "TROCA DE TELA")
        }
    }

    fn walk(orders: &OrderStore, id: &str, path: &[OrderStatus]) -> Order {
        let mut last = None;
        for status in path {
            last = Some(orders.set_status(id, *status).unwrap());
        }
        last.unwrap()
    }

    #[test]
    fn transitions() {
        use OrderStatus::*;
        assert!(Aberta.can_move_to(Diagnostico));
        assert!(Aberta.can_move_to(Cancelada));
        assert!(!Aberta.can_move_to(Concluida));
        assert!(Diagnostico.can_move_to(AguardandoAprovacao));
        assert!(AguardandoPecas.can_move_to(EmExecucao));
        assert!(Concluida.can_move_to(Entregue));
        assert!(!Concluida.can_move_to(Cancelada));
        assert!(!Entregue.can_move_to(Aberta));
        assert!(Cancelada.next().is_empty());
        assert!(Entregue.can_move_to(Entregue));
        assert_eq!("em_execucao".parse::<OrderStatus>().unwrap(), EmExecucao);
        assert!("fechada".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn create_fills_defaults() {
        let f = fixture();
        let order = f.orders.create_order(screen(&f.customer)).unwrap();

        let month = Timestamp::now().as_datetime().format("%Y-%m").to_string();
        assert_eq!(order.order_number, format!("OS-{month}-001"));
        assert!(order.id.starts_with("order_"));
        assert_eq!(order.status, OrderStatus::Aberta);
        assert_eq!(order.priority, Priority::Normal);
        assert_eq!(order.payment_status, PaymentStatus::Pendente);
        assert_eq!(order.warranty_days, 90);
        assert_eq!(order.total_value, 1200.0);
        assert_eq!(order.checklist.len(), 9);
        assert!(order.checklist.values().all(|v| !v));

        let second = f.orders.create_order(screen(&f.customer)).unwrap();
        assert_eq!(second.order_number, format!("OS-{month}-002"));
    }

    #[test]
    fn create_requires_fields() {
        let f = fixture();
        let err = f
            .orders
            .create_order(NewOrder::new(&f.customer, "", "TROCA DE TELA"))
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation { ref message, .. } if message.contains("deviceModel")));
    }

    #[test]
    fn workflow_is_enforced() {
        let f = fixture();
        let id = f.orders.create_order(screen(&f.customer)).unwrap().id;

        let err = f.orders.set_status(&id, OrderStatus::Concluida).unwrap_err();
        assert!(matches!(err, CoreError::InvalidTransition { .. }));
        assert!(matches!(
            f.orders.update_order(&id, fields(json!({"status": "fechada"}))),
            Err(CoreError::Validation { .. })
        ));

        let order = walk(
            &f.orders,
            &id,
            &[
                OrderStatus::Diagnostico,
                OrderStatus::AguardandoPecas,
                OrderStatus::EmExecucao,
            ],
        );
        assert!(order.started_at.is_some());

        let order = walk(&f.orders, &id, &[OrderStatus::Concluida, OrderStatus::Entregue]);
        assert!(order.completed_at.is_some());
        assert!(order.delivered_at.is_some());
        assert!(f.orders.cancel_order(&id, None).is_err());
    }

    #[test]
    fn completion_updates_customer() {
        let f = fixture();
        let id = f.orders.create_order(screen(&f.customer)).unwrap().id;
        walk(
            &f.orders,
            &id,
            &[
                OrderStatus::Diagnostico,
                OrderStatus::AguardandoAprovacao,
                OrderStatus::EmExecucao,
                OrderStatus::Concluida,
            ],
        );

        let customer = f.db.customers().unwrap().get(&f.customer).unwrap();
        assert_eq!(customer.total_spent, 1200.0);
        assert_eq!(customer.services_count, 1);
    }

    #[test]
    fn cancel_appends_reason() {
        let f = fixture();
        let id = f.orders.create_order(screen(&f.customer)).unwrap().id;
        let order = f.orders.cancel_order(&id, Some("cliente desistiu")).unwrap();
        assert_eq!(order.status, OrderStatus::Cancelada);
        assert!(order.notes.ends_with("Cancelada: cliente desistiu"));
        assert!(matches!(
            f.orders.cancel_order(&id, None),
            Err(CoreError::InvalidTransition { .. })
        ));
        assert!(f.orders.by_customer(&f.customer, false).is_empty());
        assert_eq!(f.orders.by_customer(&f.customer, true).len(), 1);
    }

    #[test]
    fn costs_and_parts() {
        let f = fixture();
        let id = f.orders.create_order(screen(&f.customer)).unwrap().id;

        let order = f
            .orders
            .update_order(&id, fields(json!({"laborCost": 400.0})))
            .unwrap();
        assert_eq!(order.total_value, 1250.0);

        let order = f
            .orders
            .add_part(
                &id,
                NewPart {
                    name: "Película".into(),
                    quantity: 2,
                    cost: 25.0,
                    notes: String::new(),
                },
            )
            .unwrap();
        assert_eq!(order.parts_required.len(), 1);
        assert_eq!(order.parts_cost, 50.0);
        assert_eq!(order.total_value, 450.0);

        let part_id = order.parts_required[0].id.clone();
        let order = f.orders.remove_part(&id, &part_id).unwrap();
        assert!(order.parts_required.is_empty());
        assert_eq!(order.total_value, 400.0);

        let order = f
            .orders
            .update_payment(&id, PaymentStatus::Pago, Some("pix"))
            .unwrap();
        assert_eq!(order.payment_status, PaymentStatus::Pago);
        assert_eq!(order.payment_method.as_deref(), Some("pix"));
    }

    #[test]
    fn pending_queue_and_overdue() {
        let f = fixture();
        let low = f
            .orders
            .create_order(NewOrder {
                priority: Priority::Baixa,
                ..screen(&f.customer)
            })
            .unwrap();
        let normal = f.orders.create_order(screen(&f.customer)).unwrap();
        let urgent = f
            .orders
            .create_order(NewOrder {
                priority: Priority::Urgente,
                ..screen(&f.customer)
            })
            .unwrap();
        f.orders.cancel_order(&normal.id, None).unwrap();

        let queue: Vec<_> = f.orders.pending().into_iter().map(|o| o.id).collect();
        assert_eq!(queue, vec![urgent.id.clone(), low.id.clone()]);

        f.orders
            .update_order(
                &urgent.id,
                fields(json!({"startedAt": "2024-01-01T08:00:00.000Z"})),
            )
            .unwrap();
        let overdue = f.orders.overdue(Timestamp::now());
        assert_eq!(overdue.len(), 1);
        assert_eq!(overdue[0].id, urgent.id);
        assert_eq!(overdue[0].estimated_hours(), Some(3));

        let stats = f.orders.stats();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.pending, 2);
        assert_eq!(stats.cancelled, 1);
        assert_eq!(stats.by_priority.get("urgente"), Some(&1));
        assert_eq!(f.orders.by_status(OrderStatus::Cancelada).len(), 1);
    }

    #[test]
    fn checklist_completes_running_orders() {
        let f = fixture();
        let id = f.orders.create_order(screen(&f.customer)).unwrap().id;

        for step in CHECKLIST {
            f.orders.update_checklist(&id, step, true).unwrap();
        }
        assert_eq!(f.orders.get(&id).unwrap().status, OrderStatus::Aberta);

        walk(
            &f.orders,
            &id,
            &[
                OrderStatus::Diagnostico,
                OrderStatus::AguardandoPecas,
                OrderStatus::EmExecucao,
            ],
        );
        f.orders.update_checklist(&id, "entrega", false).unwrap();
        let order = f.orders.update_checklist(&id, "entrega", true).unwrap();
        assert_eq!(order.status, OrderStatus::Concluida);
        assert!(order.completed_at.is_some());
    }

    /// Five orders with fixed creation dates, loaded through import so the
    /// stamps are kept.
    fn history() -> OrderStore {
        let db = Database::in_memory();
        let orders = db.orders().unwrap();
        let row = |n: u32, created_at: &str, extra: Value| {
            let mut row = json!({
                "id": format!("order_{n}"),
                "created_at": created_at,
                "orderNumber": format!("OS-2024-01-{n:03}"),
                "customerId": "customer_x",
                "customerName": "Ana",
                "service": "TROCA DE TELA",
                "deviceModel": "IPHONE 13 PRO",
            });
            if let (Some(map), Value::Object(extra)) = (row.as_object_mut(), extra) {
                map.extend(extra);
            }
            row
        };
        let rows = json!([
            row(1, "2024-01-10T10:00:00.000Z", json!({
                "status": "concluida", "technician": "Bruno", "paymentStatus": "pago",
                "laborCost": 350, "partsCost": 850, "totalValue": 1200,
                "startedAt": "2024-01-10T12:00:00.000Z", "completedAt": "2024-01-10T16:00:00.000Z",
            })),
            row(2, "2024-01-20T09:00:00.000Z", json!({
                "status": "concluida", "technician": "Bruno",
                "service": "TROCA DE BATERIA", "deviceModel": "IPHONE 11",
                "laborCost": 300, "partsCost": 100, "totalValue": 400,
                "startedAt": "2024-01-21T08:00:00.000Z", "completedAt": "2024-01-21T10:00:00.000Z",
            })),
            row(3, "2024-02-05T15:00:00.000Z", json!({
                "status": "aberta", "technician": "Carla", "priority": "urgente",
                "deviceModel": "IPHONE 11", "totalValue": 900,
            })),
            row(4, "2024-03-31T23:30:00.000Z", json!({
                "status": "cancelada", "deviceModel": "GALAXY S21", "totalValue": 0,
            })),
            row(5, "2023-12-15T10:00:00.000Z", json!({
                "status": "concluida", "technician": "Carla",
                "service": "LIMPEZA", "totalValue": 150,
            })),
        ]);
        let report = orders
            .store()
            .import(&rows.to_string(), ImportOptions::new(Format::Json))
            .unwrap();
        assert_eq!(report.imported, 5);
        orders
    }

    fn ids(orders: &[Order]) -> Vec<&str> {
        orders.iter().map(|o| o.id.as_str()).collect()
    }

    #[test]
    fn search_filters_sorts_and_pages() {
        let orders = history();
        let all = OrderSearch::default();

        assert_eq!(
            ids(&orders.search("", &all)),
            ["order_4", "order_3", "order_2", "order_1", "order_5"]
        );
        assert_eq!(ids(&orders.search("bateria", &all)), ["order_2"]);
        assert_eq!(ids(&orders.search(" iPhone 11 ", &all)), ["order_3", "order_2"]);

        let completed = OrderSearch {
            status: Some(OrderStatus::Concluida),
            ..OrderSearch::default()
        };
        assert_eq!(ids(&orders.search("", &completed)), ["order_2", "order_1", "order_5"]);

        let carla = OrderSearch {
            technician: Some("Carla".into()),
            ..OrderSearch::default()
        };
        assert_eq!(ids(&orders.search("", &carla)), ["order_3", "order_5"]);

        let urgent = OrderSearch {
            priority: Some(Priority::Urgente),
            ..OrderSearch::default()
        };
        assert_eq!(ids(&orders.search("", &urgent)), ["order_3"]);

        let paid = OrderSearch {
            payment_status: Some(PaymentStatus::Pago),
            ..OrderSearch::default()
        };
        assert_eq!(ids(&orders.search("", &paid)), ["order_1"]);

        let stranger = OrderSearch {
            customer_id: Some("customer_y".into()),
            ..OrderSearch::default()
        };
        assert!(orders.search("", &stranger).is_empty());

        let january = OrderSearch {
            created: DateRange::parse(Some("2024-01-01"), Some("2024-01-31")).unwrap(),
            ..OrderSearch::default()
        };
        assert_eq!(ids(&orders.search("", &january)), ["order_2", "order_1"]);

        let cheapest = OrderSearch {
            sort_by: "totalValue".into(),
            order: SortOrder::Asc,
            limit: 2,
            offset: 1,
            ..OrderSearch::default()
        };
        assert_eq!(ids(&orders.search("", &cheapest)), ["order_5", "order_2"]);
    }

    #[test]
    fn date_range_covers_the_whole_end_day() {
        let range = DateRange::parse(Some("2024-03-31"), Some("2024-03-31")).unwrap();
        assert_eq!(range.end.unwrap().to_string(), "2024-03-31T23:59:59.999Z");
        assert!(range.contains("2024-03-31T23:30:00.000Z"));
        assert!(!range.contains("2024-04-01T00:00:00.000Z"));
        assert!(!range.contains("garbage"));
        assert!(DateRange::ALL.contains("garbage"));

        let exact = DateRange::parse(None, Some("2024-03-31T12:00:00.000Z")).unwrap();
        assert!(!exact.contains("2024-03-31T23:30:00.000Z"));
        assert!(matches!(
            DateRange::parse(Some("ontem"), None),
            Err(CoreError::Validation { .. })
        ));
    }

    #[test]
    fn stats_over_a_window() {
        let orders = history();
        assert_eq!(orders.stats().total, 5);

        let january = DateRange::parse(Some("2024-01-01"), Some("2024-01-31")).unwrap();
        let stats = orders.stats_between(&january);
        assert_eq!(stats.total, 2);
        assert_eq!(stats.completed, 2);
        assert_eq!(stats.revenue, 1600.0);
        assert_eq!(stats.parts_revenue, 950.0);
        assert_eq!(stats.labor_revenue, 650.0);
        assert_eq!(stats.avg_order_value, 800.0);
        assert_eq!(stats.avg_time_hours, 3.0);

        let last_day = DateRange::parse(Some("2024-03-31"), Some("2024-03-31")).unwrap();
        let stats = orders.stats_between(&last_day);
        assert_eq!(stats.total, 1);
        assert_eq!(stats.cancelled, 1);
    }

    #[test]
    fn monthly_figures_count_completed_revenue() {
        let orders = history();
        let months = orders.monthly_stats(2024);
        assert_eq!(months.len(), 12);
        assert_eq!(
            months[&1],
            MonthStats {
                total: 2,
                completed: 2,
                revenue: 1600.0,
                avg_value: 800.0,
            }
        );
        assert_eq!(months[&2].total, 1);
        assert_eq!(months[&2].completed, 0);
        assert_eq!(months[&2].avg_value, 0.0);
        assert_eq!(months[&3].total, 1);
        assert_eq!(months[&12], MonthStats::default());

        assert_eq!(orders.monthly_stats(2023)[&12].revenue, 150.0);
    }

    #[test]
    fn top_services_and_models() {
        let orders = history();
        let ranked = |items: Vec<RankedCount>| -> Vec<(String, usize)> {
            items.into_iter().map(|r| (r.name, r.count)).collect()
        };

        assert_eq!(
            ranked(orders.top_services(10)),
            [
                ("TROCA DE TELA".to_string(), 3),
                ("LIMPEZA".to_string(), 1),
                ("TROCA DE BATERIA".to_string(), 1),
            ]
        );
        assert_eq!(orders.top_services(1).len(), 1);
        assert_eq!(
            ranked(orders.top_models(2)),
            [("IPHONE 11".to_string(), 2), ("IPHONE 13 PRO".to_string(), 2)]
        );
    }

    #[test]
    fn technician_figures() {
        let orders = history();
        let performance = orders.technician_performance();
        assert_eq!(performance.keys().collect::<Vec<_>>(), ["Bruno", "Carla"]);

        let bruno = &performance["Bruno"];
        assert_eq!(bruno.total, 2);
        assert_eq!(bruno.completed, 2);
        assert_eq!(bruno.revenue, 1600.0);
        assert_eq!(bruno.completion_rate, 100.0);
        assert_eq!(bruno.avg_revenue, 800.0);
        assert_eq!(bruno.avg_time_hours, 3.0);

        let carla = &performance["Carla"];
        assert_eq!(carla.total, 2);
        assert_eq!(carla.completion_rate, 50.0);
        assert_eq!(carla.avg_revenue, 150.0);
        assert_eq!(carla.avg_time_hours, 0.0);
    }

    #[test]
    fn revenue_report_lists_completed_orders() {
        let orders = history();
        let january = DateRange::parse(Some("2024-01-01"), Some("2024-01-31")).unwrap();
        let report = orders.revenue_report(&january);

        assert_eq!(report.start.as_deref(), Some("2024-01-01T00:00:00.000Z"));
        assert_eq!(report.end.as_deref(), Some("2024-01-31T23:59:59.999Z"));
        assert_eq!(report.summary.revenue, 1600.0);
        let numbers: Vec<_> = report.orders.iter().map(|l| l.order_number.as_str()).collect();
        assert_eq!(numbers.len(), 2);
        assert!(numbers.contains(&"OS-2024-01-001"));
        assert!(numbers.contains(&"OS-2024-01-002"));
        assert_eq!(report.top_services[0].name, "TROCA DE BATERIA");
        assert_eq!(report.top_models.len(), 2);

        let whole = orders.revenue_report(&DateRange::ALL);
        assert_eq!(whole.orders.len(), 3);
        assert!(whole.start.is_none());
        assert_eq!(whole.top_services[0].count, 3);
    }
}
