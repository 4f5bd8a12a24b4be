//! Read-only property and developer lookups.
//!
//! Listings are owned by the property CRUD side of the platform. Contracts
//! copy what they need into a [`PropertySnapshot`] at creation and never
//! read the catalog again.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::decimal::{Money, Rate};
use crate::errors::{PresaleError, Result};
use crate::types::{DeveloperId, PropertyId};

/// a property unit offered for presale
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyListing {
    pub id: PropertyId,
    pub title: String,
    pub location: String,
    pub area_sqm: Decimal,
    pub price: Money,
    /// lowest down payment percent the developer accepts
    pub min_down_payment_percent: u8,
    pub installment_interest_rate: Rate,
    pub developer_id: Option<DeveloperId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Developer {
    pub id: DeveloperId,
    pub name: String,
}

/// frozen copy of a listing taken when a contract is created
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertySnapshot {
    pub property_id: PropertyId,
    pub title: String,
    pub location: String,
    pub area_sqm: Decimal,
    pub price: Money,
    pub min_down_payment_percent: u8,
    pub installment_interest_rate: Rate,
    pub captured_at: DateTime<Utc>,
}

impl PropertySnapshot {
    pub fn capture(listing: &PropertyListing, now: DateTime<Utc>) -> Self {
        Self {
            property_id: listing.id,
            title: listing.title.clone(),
            location: listing.location.clone(),
            area_sqm: listing.area_sqm,
            price: listing.price,
            min_down_payment_percent: listing.min_down_payment_percent,
            installment_interest_rate: listing.installment_interest_rate,
            captured_at: now,
        }
    }

    /// price per square metre, for display
    pub fn price_per_sqm(&self) -> Option<Money> {
        if self.area_sqm > Decimal::ZERO {
            Some(self.price / self.area_sqm)
        } else {
            None
        }
    }
}

/// lookup interface over the property side of the platform
pub trait PropertyCatalog: Send + Sync {
    fn property(&self, id: PropertyId) -> Result<PropertyListing>;

    fn developer(&self, id: DeveloperId) -> Result<Developer>;
}

/// catalog backed by in-process maps
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    properties: DashMap<PropertyId, PropertyListing>,
    developers: DashMap<DeveloperId, Developer>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_property(self, listing: PropertyListing) -> Self {
        self.upsert_property(listing);
        self
    }

    pub fn with_developer(self, developer: Developer) -> Self {
        self.developers.insert(developer.id, developer);
        self
    }

    /// replace a listing; existing contract snapshots are unaffected
    pub fn upsert_property(&self, listing: PropertyListing) {
        self.properties.insert(listing.id, listing);
    }
}

impl PropertyCatalog for InMemoryCatalog {
    fn property(&self, id: PropertyId) -> Result<PropertyListing> {
        self.properties
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or(PresaleError::PropertyNotFound { id })
    }

    fn developer(&self, id: DeveloperId) -> Result<Developer> {
        self.developers
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| PresaleError::validation(format!("unknown developer {}", id)))
    }
}
