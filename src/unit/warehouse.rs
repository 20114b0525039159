//! Warehouse archive - moves every unit of an order into warehouse records.
//!
//! The move is one transaction: records are created, units deleted and the
//! order set to `warehouse` together. Registry entries stay where they are,
//! so an archived serial can never be reused.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, instrument};

use super::{Unit, UnitsExt};
use crate::document::{DocumentStore, StoreError};
use crate::order::{LifecycleError, LifecycleEvent, Order};
use crate::transaction::run_transaction;
use crate::Document;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Document)]
#[document(collection = "warehouse")]
pub struct WarehouseRecord {
    /// Same as the archived unit's id.
    pub id: String,
    /// Material and customer names joined for display.
    pub label: String,
    pub serial: String,
    pub serial_key: String,
    pub order_id: String,
    pub unit_id: String,
    pub archived_at: DateTime<Utc>,
}

impl WarehouseRecord {
    pub fn from_unit(unit: &Unit, archived_at: DateTime<Utc>) -> Self {
        Self {
            id: unit.id.clone(),
            label: format!(
                "{} — {}",
                unit.snapshot.material_name, unit.snapshot.customer_name
            ),
            serial: unit.serial.clone(),
            serial_key: unit.serial_key.clone(),
            order_id: unit.order_id.clone(),
            unit_id: unit.id.clone(),
            archived_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum WarehouseError {
    #[error("order {0} not found")]
    OrderNotFound(String),
    #[error("order {0} has no units to archive")]
    NothingToArchive(String),
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Archive every unit of `order_id`. Returns the ids of the new records.
#[instrument(skip(store), err)]
pub fn archive_order<S: DocumentStore>(
    store: &S,
    order_id: &str,
    max_attempts: u32,
) -> Result<Vec<String>, WarehouseError> {
    let archived = run_transaction(store, max_attempts, |tx| {
        let current = tx
            .read::<Order>(order_id)?
            .ok_or_else(|| WarehouseError::OrderNotFound(order_id.to_string()))?;
        let mut order = current.data;
        order.transition(LifecycleEvent::Archived)?;

        let unit_ids: Vec<String> = store
            .units_for_order(order_id)?
            .into_iter()
            .map(|unit| unit.data.id)
            .collect();
        let mut units = Vec::with_capacity(unit_ids.len());
        for unit in tx.read_many::<Unit, _, _>(&unit_ids)?.into_iter().flatten() {
            units.push(unit.data);
        }
        if units.is_empty() {
            return Err(WarehouseError::NothingToArchive(order_id.to_string()));
        }

        let archived_at = Utc::now();
        let mut record_ids = Vec::with_capacity(units.len());
        for unit in &units {
            let record = WarehouseRecord::from_unit(unit, archived_at);
            tx.create(&record)?;
            tx.delete::<Unit>(&unit.id)?;
            record_ids.push(record.id);
        }
        tx.set(&order)?;
        Ok(record_ids)
    })?;

    info!(order_id, units = archived.len(), "order archived to warehouse");
    Ok(archived)
}
