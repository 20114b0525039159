//! Units - one physical item of a finalized order.

mod warehouse;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::document::{DocumentStore, Query, SortDirection, StoreError, Versioned};
use crate::order::{Disposition, Order};
use crate::registry::SerialKey;
use crate::Document;

pub use warehouse::{archive_order, WarehouseError, WarehouseRecord};

/// Order fields copied onto a unit when it is created. Later edits to the
/// order do not change it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitSnapshot {
    pub customer_id: String,
    pub customer_name: String,
    pub material_id: String,
    pub material_name: String,
    pub distributor_id: Option<String>,
    pub distributor_name: Option<String>,
    pub unit_price: Decimal,
}

impl UnitSnapshot {
    pub fn capture(order: &Order) -> Self {
        Self {
            customer_id: order.customer_id.clone(),
            customer_name: order.customer_name.clone(),
            material_id: order.material_id.clone(),
            material_name: order.material_name.clone(),
            distributor_id: order.distributor_id.clone(),
            distributor_name: order.distributor_name.clone(),
            unit_price: order.unit_price,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Document)]
#[document(collection = "units")]
pub struct Unit {
    pub id: String,
    pub order_id: String,
    pub slot: u32,
    /// Serial as entered (trimmed).
    pub serial: String,
    pub serial_key: String,
    pub snapshot: UnitSnapshot,
    pub disposition: Disposition,
    /// Present iff `disposition` is `on_loan`.
    pub loan_start: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

impl Unit {
    /// Deterministic id of the unit in `slot` of `order_id`.
    pub fn id_for(order_id: &str, slot: u32) -> String {
        format!("{}-u{}", order_id, slot)
    }

    pub fn new(
        order: &Order,
        slot: u32,
        serial: impl Into<String>,
        key: &SerialKey,
        disposition: Disposition,
        loan_start: Option<NaiveDate>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Self::id_for(&order.id, slot),
            order_id: order.id.clone(),
            slot,
            serial: serial.into(),
            serial_key: key.as_str().to_string(),
            snapshot: UnitSnapshot::capture(order),
            disposition,
            loan_start: match disposition {
                Disposition::OnLoan => loan_start,
                Disposition::Sold => None,
            },
            created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum UnitError {
    #[error("unit {unit_id} cannot go on loan without a loan start date")]
    LoanStartRequired { unit_id: String },
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Unit queries and single-document updates on any document store.
pub trait UnitsExt: DocumentStore + Sized {
    /// Units of an order, by slot.
    fn units_for_order(&self, order_id: &str) -> Result<Vec<Versioned<Unit>>, StoreError> {
        self.query(
            &Query::all()
                .where_eq("order_id", order_id)
                .order_by("slot", SortDirection::Ascending),
        )
    }

    fn has_units(&self, order_id: &str) -> Result<bool, StoreError> {
        let query = Query::all().where_eq("order_id", order_id).limit(1);
        Ok(!self.query::<Unit>(&query)?.is_empty())
    }

    /// Move one unit between sold and on loan. The serial claim is untouched.
    fn change_disposition(
        &self,
        unit_id: &str,
        disposition: Disposition,
        loan_start: Option<NaiveDate>,
    ) -> Result<Versioned<Unit>, UnitError> {
        let current = self.get::<Unit>(unit_id)?.ok_or_else(|| StoreError::NotFound {
            collection: Unit::COLLECTION.to_string(),
            id: unit_id.to_string(),
        })?;

        let mut unit = current.data;
        unit.loan_start = match (disposition, loan_start) {
            (Disposition::OnLoan, Some(date)) => Some(date),
            (Disposition::OnLoan, None) => {
                return Err(UnitError::LoanStartRequired {
                    unit_id: unit_id.to_string(),
                })
            }
            (Disposition::Sold, _) => None,
        };
        unit.disposition = disposition;

        let updated = self.update(&unit, current.version)?;
        debug!(unit_id, %disposition, "unit disposition changed");
        Ok(updated)
    }
}

impl<S: DocumentStore> UnitsExt for S {}
