//! Orders - a customer request for a quantity of one material.

mod lifecycle;
mod repository;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Document;

pub use lifecycle::{Disposition, LifecycleError, LifecycleEvent, OrderStatus};
pub use repository::{OrderRepository, OrderUpdateError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Document)]
#[document(collection = "orders")]
pub struct Order {
    pub id: String,
    pub customer_id: String,
    pub customer_name: String,
    pub material_id: String,
    pub material_name: String,
    #[serde(default)]
    pub distributor_id: Option<String>,
    #[serde(default)]
    pub distributor_name: Option<String>,
    pub quantity: u32,
    pub unit_price: Decimal,
    /// Always `quantity * unit_price`.
    pub total_price: Decimal,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// New order in `intake` with a fresh id.
    pub fn new(
        customer_id: impl Into<String>,
        customer_name: impl Into<String>,
        material_id: impl Into<String>,
        material_name: impl Into<String>,
        quantity: u32,
        unit_price: Decimal,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            customer_id: customer_id.into(),
            customer_name: customer_name.into(),
            material_id: material_id.into(),
            material_name: material_name.into(),
            distributor_id: None,
            distributor_name: None,
            quantity,
            unit_price,
            total_price: Decimal::from(quantity) * unit_price,
            status: OrderStatus::Intake,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_distributor(mut self, id: impl Into<String>, name: impl Into<String>) -> Self {
        self.distributor_id = Some(id.into());
        self.distributor_name = Some(name.into());
        self
    }

    pub fn set_quantity(&mut self, quantity: u32) -> Result<(), LifecycleError> {
        self.ensure_editable()?;
        self.quantity = quantity;
        self.recompute_total();
        Ok(())
    }

    pub fn set_unit_price(&mut self, unit_price: Decimal) -> Result<(), LifecycleError> {
        self.ensure_editable()?;
        self.unit_price = unit_price;
        self.recompute_total();
        Ok(())
    }

    pub fn begin_configuration(&mut self) -> Result<(), LifecycleError> {
        self.transition(LifecycleEvent::BeginConfiguration)
    }

    /// Apply a lifecycle event to this order in memory.
    pub fn transition(&mut self, event: LifecycleEvent) -> Result<(), LifecycleError> {
        self.status = self.status.apply(event)?;
        self.updated_at = Utc::now();
        Ok(())
    }

    fn ensure_editable(&self) -> Result<(), LifecycleError> {
        if self.status.is_pre_configuration() {
            Ok(())
        } else {
            Err(LifecycleError::Locked {
                status: self.status,
            })
        }
    }

    fn recompute_total(&mut self) {
        self.total_price = Decimal::from(self.quantity) * self.unit_price;
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn order() -> Order {
        Order::new("c-1", "Acme", "m-1", "Pump", 3, dec!(12.50))
    }

    #[test]
    fn new_order_starts_in_intake_with_total() {
        let order = order();
        assert_eq!(order.status, OrderStatus::Intake);
        assert_eq!(order.total_price, dec!(37.50));
        assert_eq!(Order::COLLECTION, "orders");
        assert_eq!(order.id(), order.id.as_str());
        assert!(Uuid::parse_str(&order.id).is_ok());
    }

    #[test]
    fn edits_recompute_total() {
        let mut order = order();
        order.set_quantity(4).unwrap();
        assert_eq!(order.total_price, dec!(50.00));
        order.set_unit_price(dec!(2)).unwrap();
        assert_eq!(order.total_price, dec!(8));
    }

    #[test]
    fn edits_allowed_while_configuring() {
        let mut order = order();
        order.begin_configuration().unwrap();
        assert_eq!(order.status, OrderStatus::Configuring);
        order.set_quantity(1).unwrap();
        assert_eq!(order.total_price, dec!(12.50));
    }

    #[test]
    fn quantity_is_fixed_after_finalization() {
        let mut order = order();
        order
            .transition(LifecycleEvent::Finalized(Disposition::Sold))
            .unwrap();
        assert_eq!(
            order.set_quantity(9),
            Err(LifecycleError::Locked {
                status: OrderStatus::Sold
            })
        );
        assert!(order.set_unit_price(dec!(1)).is_err());
        assert_eq!(order.quantity, 3);
    }

    #[test]
    fn begin_configuration_twice_is_illegal() {
        let mut order = order();
        order.begin_configuration().unwrap();
        assert!(order.begin_configuration().is_err());
    }

    #[test]
    fn serde_round_trip_keeps_decimal_precision() {
        let order = order().with_distributor("d-1", "North");
        let json = serde_json::to_value(&order).unwrap();
        assert_eq!(json["status"], "intake");
        let back: Order = serde_json::from_value(json).unwrap();
        assert_eq!(back, order);
    }
}
