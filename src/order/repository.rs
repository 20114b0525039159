//! Order persistence used by the finalization engine.

use thiserror::Error;
use tracing::debug;

use super::{LifecycleError, Order, OrderStatus};
use crate::document::{DocumentStore, StoreError, Versioned};
use crate::Document;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum OrderUpdateError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
}

/// Order-level operations on any document store.
pub trait OrderRepository {
    fn get_order(&self, order_id: &str) -> Result<Option<Versioned<Order>>, StoreError>;

    /// Move the stored order to `status`. The move must be a legal lifecycle
    /// transition from the stored status; the write is guarded by the version
    /// that was read.
    fn update_status(
        &self,
        order_id: &str,
        status: OrderStatus,
    ) -> Result<Versioned<Order>, OrderUpdateError>;
}

impl<S: DocumentStore> OrderRepository for S {
    fn get_order(&self, order_id: &str) -> Result<Option<Versioned<Order>>, StoreError> {
        self.get::<Order>(order_id)
    }

    fn update_status(
        &self,
        order_id: &str,
        status: OrderStatus,
    ) -> Result<Versioned<Order>, OrderUpdateError> {
        let current = self.get::<Order>(order_id)?.ok_or_else(|| StoreError::NotFound {
            collection: Order::COLLECTION.to_string(),
            id: order_id.to_string(),
        })?;

        let mut order = current.data;
        let from = order.status;
        match from.event_towards(status) {
            Some(event) => order.transition(event)?,
            None => {
                return Err(LifecycleError::IllegalTransition {
                    from,
                    event: status_event(status),
                }
                .into())
            }
        }

        let updated = self.update(&order, current.version)?;
        debug!(order_id, %from, to = %status, "order status updated");
        Ok(updated)
    }
}

// Event reported when no legal event reaches `status`.
fn status_event(status: OrderStatus) -> super::LifecycleEvent {
    use super::{Disposition, LifecycleEvent};
    match status {
        OrderStatus::Sold => LifecycleEvent::Finalized(Disposition::Sold),
        OrderStatus::OnLoan => LifecycleEvent::Finalized(Disposition::OnLoan),
        OrderStatus::Warehouse => LifecycleEvent::Archived,
        OrderStatus::Intake | OrderStatus::Configuring => LifecycleEvent::BeginConfiguration,
    }
}
