//! The price catalog: one document listing device models, services and the
//! price of each model/service pair.

use crate::database::Database;
use crate::error::CoreResult;
use crate::record::Record;
use crate::store::RecordStore;
use crate::table::TableSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{info, warn};

const TABLE: &str = "CATALOG";

/// Id of the single catalog record.
pub const CATALOG_ID: &str = "catalog";

const DEFAULT_MODELS: [&str; 13] = [
    "IPHONE 6",
    "IPHONE 7",
    "IPHONE 7 PLUS",
    "IPHONE 8",
    "IPHONE 8 PLUS",
    "IPHONE X",
    "IPHONE XR",
    "IPHONE 11",
    "IPHONE 12",
    "IPHONE 13",
    "IPHONE 13 PRO MAX",
    "IPHONE 14",
    "IPHONE 15 PRO MAX",
];

const DEFAULT_SERVICES: [&str; 5] = [
    "TROCA DE TELA",
    "TROCA DE BATERIA",
    "VIDRO TRASEIRO",
    "FACE ID",
    "CONECTOR DE CARGA",
];

const DEFAULT_PRICES: [(&str, &str, f64, f64); 4] = [
    ("IPHONE 11", "TROCA DE TELA", 330.00, 306.90),
    ("IPHONE 11", "TROCA DE BATERIA", 250.00, 232.50),
    ("IPHONE 13", "TROCA DE TELA", 1000.00, 930.00),
    ("IPHONE 13", "TROCA DE BATERIA", 350.00, 325.50),
];

/// Price of one service on one model.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Price {
    /// Price paid in installments.
    pub parcelado: f64,
    /// Price paid upfront.
    pub avista: f64,
}

impl Price {
    /// Creates a price.
    #[must_use]
    pub const fn new(parcelado: f64, avista: f64) -> Self {
        Self { parcelado, avista }
    }
}

/// The catalog document.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Catalog {
    /// Known device models.
    #[serde(default)]
    pub models: Vec<String>,
    /// Known services.
    #[serde(default)]
    pub services: Vec<String>,
    /// Prices by model, then service.
    #[serde(default)]
    pub prices: BTreeMap<String, BTreeMap<String, Price>>,
}

impl Catalog {
    /// The catalog a new shop starts with.
    #[must_use]
    pub fn seed() -> Self {
        let mut prices: BTreeMap<String, BTreeMap<String, Price>> = BTreeMap::new();
        for (model, service, parcelado, avista) in DEFAULT_PRICES {
            prices
                .entry(model.to_string())
                .or_default()
                .insert(service.to_string(), Price::new(parcelado, avista));
        }
        Self {
            models: DEFAULT_MODELS.iter().map(|m| (*m).to_string()).collect(),
            services: DEFAULT_SERVICES.iter().map(|s| (*s).to_string()).collect(),
            prices,
        }
    }

    /// Looks up a price.
    #[must_use]
    pub fn price(&self, model: &str, service: &str) -> Option<Price> {
        self.prices.get(model)?.get(service).copied()
    }

    /// Every priced pair as `(model, service, price)`, sorted by model then
    /// service.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &str, Price)> + '_ {
        self.prices.iter().flat_map(|(model, services)| {
            services
                .iter()
                .map(move |(service, price)| (model.as_str(), service.as_str(), *price))
        })
    }

    fn insert(&mut self, model: &str, service: &str, price: Price) {
        if !self.models.iter().any(|m| m == model) {
            self.models.push(model.to_string());
        }
        if !self.services.iter().any(|s| s == service) {
            self.services.push(service.to_string());
        }
        self.prices
            .entry(model.to_string())
            .or_default()
            .insert(service.to_string(), price);
    }

    fn remove(&mut self, model: &str, service: &str) -> bool {
        let Some(services) = self.prices.get_mut(model) else {
            return false;
        };
        let removed = services.remove(service).is_some();
        if services.is_empty() {
            self.prices.remove(model);
        }
        removed
    }
}

/// Typed access to the `CATALOG` table.
#[derive(Debug, Clone)]
pub struct CatalogStore {
    store: RecordStore,
}

impl CatalogStore {
    /// Opens the table, writing the seed catalog if the document is missing.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the table cannot be initialized or seeded.
    pub fn open(db: &Database) -> CoreResult<Self> {
        let schema = TableSchema::required(["models", "services", "prices"]);
        let store = db.table_with_schema(TABLE, schema)?;
        let catalog = Self { store };
        if catalog.store.find_by_id(CATALOG_ID).is_none() {
            catalog.write(&Catalog::seed())?;
            info!(table = TABLE, "seeded default catalog");
        }
        Ok(catalog)
    }

    /// The underlying record store.
    #[must_use]
    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    /// The current catalog. A missing or unreadable document reads as the
    /// seed catalog.
    #[must_use]
    pub fn catalog(&self) -> Catalog {
        let Some(record) = self.store.find_by_id(CATALOG_ID) else {
            return Catalog::seed();
        };
        record.to_entity().unwrap_or_else(|e| {
            warn!(table = TABLE, error = %e, "unreadable catalog document, using defaults");
            Catalog::seed()
        })
    }

    /// Looks up a price.
    #[must_use]
    pub fn price(&self, model: &str, service: &str) -> Option<Price> {
        self.catalog().price(model, service)
    }

    /// Sets the price of `service` on `model`, adding either to the lists if
    /// new.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the catalog cannot be written.
    pub fn set_price(&self, model: &str, service: &str, price: Price) -> CoreResult<Catalog> {
        let mut catalog = self.catalog();
        catalog.insert(model.trim(), service.trim(), price);
        self.write(&catalog)?;
        Ok(catalog)
    }

    /// Removes the price of `service` on `model`. Returns `false` if it was
    /// not priced.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the catalog cannot be written.
    pub fn remove_price(&self, model: &str, service: &str) -> CoreResult<bool> {
        let mut catalog = self.catalog();
        if !catalog.remove(model, service) {
            return Ok(false);
        }
        self.write(&catalog)?;
        Ok(true)
    }

    /// Replaces the whole catalog.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the catalog cannot be written.
    pub fn replace(&self, catalog: &Catalog) -> CoreResult<()> {
        self.write(catalog)
    }

    fn write(&self, catalog: &Catalog) -> CoreResult<()> {
        self.store
            .upsert(CATALOG_ID, Record::fields_from(catalog)?)
            .map(|_| ())
    }
}
