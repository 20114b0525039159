//! Order finalization - assigns a serial to every slot of an order.
//!
//! `finalize` validates the batch locally, checks that the order has no
//! units, then runs one transaction that reads the order, every unit slot and
//! every registry claim before writing anything. If all claims are free it
//! creates one registry entry and one unit per slot. In
//! [`CommitMode::SingleTransaction`] the order status is written in that same
//! transaction; in [`CommitMode::TwoPhase`] it is written afterwards and a
//! failure there surfaces as `STATUS_UPDATE_FAILED`, repairable with
//! [`FinalizationEngine::reconcile`].
//!
//! Either every unit and claim of the batch becomes visible or none does.

mod error;
mod request;
mod validate;

use chrono::Utc;
use tracing::{error, info, instrument, warn};

use crate::document::DocumentStore;
use crate::order::{LifecycleEvent, Order, OrderRepository, OrderStatus, OrderUpdateError};
use crate::registry::{claim, read_claims, ClaimStatus, RegistryEntry};
use crate::settings::{CommitMode, EngineConfig};
use crate::transaction::{run_transaction, Transaction};
use crate::unit::{Unit, UnitsExt};

pub use error::{ErrorKind, FinalizeError};
pub use request::{parse_loan_start, FinalizeRequest};
pub use validate::{validate, ValidatedBatch, ValidatedSerial};

pub struct FinalizationEngine<S> {
    store: S,
    config: EngineConfig,
}

impl<S> FinalizationEngine<S> {
    pub fn new(store: S) -> Self {
        Self::with_config(store, EngineConfig::default())
    }

    pub fn with_config(store: S, config: EngineConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

impl<S: DocumentStore> FinalizationEngine<S> {
    /// Finalize `order` (the caller's snapshot) with one serial per slot.
    /// Returns the created unit ids in slot order.
    #[instrument(
        skip(self, order, request),
        fields(
            order_id = %order.id,
            disposition = %request.disposition,
            serials = request.serials.len(),
        )
    )]
    pub fn finalize(
        &self,
        order: &Order,
        request: FinalizeRequest,
    ) -> Result<Vec<String>, FinalizeError> {
        let result = self.try_finalize(order, &request);
        match &result {
            Ok(unit_ids) => info!(units = unit_ids.len(), "order finalized"),
            Err(err) if err.kind() == ErrorKind::StatusUpdateFailed => {
                error!(error = %err, "units committed but order status is behind")
            }
            Err(err) => warn!(kind = %err.kind(), error = %err, "finalization rejected"),
        }
        result
    }

    /// Repair an order left behind by a failed two-phase status write.
    /// Returns the status applied, or `None` when there was nothing to fix.
    #[instrument(skip(self))]
    pub fn reconcile(&self, order_id: &str) -> Result<Option<OrderStatus>, FinalizeError> {
        let order = self
            .store
            .get_order(order_id)?
            .ok_or_else(|| FinalizeError::OrderNotFound {
                order_id: order_id.to_string(),
            })?
            .data;
        if order.status.is_configured() {
            return Ok(None);
        }

        let units = self.store.units_for_order(order_id)?;
        let Some(first) = units.first() else {
            return Ok(None);
        };
        let status = first.data.disposition.order_status();

        self.store
            .update_status(order_id, status)
            .map_err(|source| match source {
                OrderUpdateError::Store(err) => FinalizeError::Storage(err),
                source => FinalizeError::StatusUpdateFailed {
                    order_id: order_id.to_string(),
                    unit_ids: units.iter().map(|u| u.data.id.clone()).collect(),
                    source,
                },
            })?;
        info!(order_id, %status, "order status reconciled");
        Ok(Some(status))
    }

    fn try_finalize(
        &self,
        order: &Order,
        request: &FinalizeRequest,
    ) -> Result<Vec<String>, FinalizeError> {
        let batch = validate(order, request)?;

        if self.store.has_units(&order.id)? {
            return Err(FinalizeError::AlreadyConfigured {
                order_id: order.id.clone(),
            });
        }

        let mode = self.config.commit_mode;
        let unit_ids = run_transaction(
            &self.store,
            self.config.max_transaction_attempts,
            |tx| stage(tx, order, &batch, mode),
        )?;

        if mode == CommitMode::TwoPhase {
            self.store
                .update_status(&order.id, batch.disposition.order_status())
                .map_err(|source| FinalizeError::StatusUpdateFailed {
                    order_id: order.id.clone(),
                    unit_ids: unit_ids.clone(),
                    source,
                })?;
        }

        Ok(unit_ids)
    }
}

// Reads first (order, unit slots, claims), then writes. Any error aborts the
// transaction with nothing staged reaching the store.
fn stage<S: DocumentStore + ?Sized>(
    tx: &mut Transaction<'_, S>,
    snapshot: &Order,
    batch: &ValidatedBatch,
    mode: CommitMode,
) -> Result<Vec<String>, FinalizeError> {
    let order_id = snapshot.id.as_str();
    let mut order = tx
        .read::<Order>(order_id)?
        .ok_or_else(|| FinalizeError::OrderNotFound {
            order_id: order_id.to_string(),
        })?
        .data;
    if order.status.is_configured() {
        return Err(FinalizeError::AlreadyConfigured {
            order_id: order_id.to_string(),
        });
    }
    if order.quantity != snapshot.quantity {
        return Err(FinalizeError::StaleOrder {
            order_id: order_id.to_string(),
        });
    }

    let unit_ids: Vec<String> = batch
        .serials
        .iter()
        .map(|s| Unit::id_for(order_id, s.slot))
        .collect();
    if tx.read_many::<Unit, _, _>(&unit_ids)?.iter().any(Option::is_some) {
        return Err(FinalizeError::AlreadyConfigured {
            order_id: order_id.to_string(),
        });
    }

    let claims = read_claims(tx, &batch.keys())?;
    let taken: Vec<String> = batch
        .serials
        .iter()
        .zip(&claims)
        .filter(|(_, status)| matches!(status, ClaimStatus::Claimed(_)))
        .map(|(serial, _)| serial.serial.clone())
        .collect();
    if !taken.is_empty() {
        return Err(FinalizeError::SerialExists { serials: taken });
    }

    let now = Utc::now();
    for serial in &batch.serials {
        let unit = Unit::new(
            &order,
            serial.slot,
            serial.serial.clone(),
            &serial.key,
            batch.disposition,
            batch.loan_start,
            now,
        );
        claim(
            tx,
            &RegistryEntry::new(&serial.key, serial.serial.clone(), &unit.id, order_id, now),
        )?;
        tx.create(&unit)?;
    }

    if mode == CommitMode::SingleTransaction {
        order
            .transition(LifecycleEvent::Finalized(batch.disposition))
            .map_err(|_| FinalizeError::AlreadyConfigured {
                order_id: order_id.to_string(),
            })?;
        tx.set(&order)?;
    }

    Ok(unit_ids)
}
