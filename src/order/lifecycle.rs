//! Order lifecycle state machine.
//!
//! ```text
//! intake ──begin──▶ configuring
//!   │                   │
//!   └──finalized(d)─────┴──▶ sold | on_loan ──archived──▶ warehouse
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lifecycle status of an order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Just created, fully editable.
    #[default]
    Intake,
    /// Being edited, no units yet.
    Configuring,
    /// Units created and sold.
    Sold,
    /// Units created and lent out.
    OnLoan,
    /// Every unit archived into the warehouse.
    Warehouse,
}

/// Target disposition of a finalization, and of each unit afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    Sold,
    OnLoan,
}

impl Disposition {
    /// Order status reached by finalizing with this disposition.
    pub fn order_status(self) -> OrderStatus {
        match self {
            Disposition::Sold => OrderStatus::Sold,
            Disposition::OnLoan => OrderStatus::OnLoan,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Disposition::Sold => "sold",
            Disposition::OnLoan => "on_loan",
        }
    }
}

impl fmt::Display for Disposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Events that move an order through its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    BeginConfiguration,
    Finalized(Disposition),
    Archived,
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleEvent::BeginConfiguration => f.write_str("begin configuration"),
            LifecycleEvent::Finalized(disposition) => write!(f, "finalized as {}", disposition),
            LifecycleEvent::Archived => f.write_str("archived"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LifecycleError {
    #[error("illegal transition from {from} on {event}")]
    IllegalTransition {
        from: OrderStatus,
        event: LifecycleEvent,
    },
    #[error("order is {status}; quantity and price are fixed once units exist")]
    Locked { status: OrderStatus },
}

impl OrderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Intake => "intake",
            OrderStatus::Configuring => "configuring",
            OrderStatus::Sold => "sold",
            OrderStatus::OnLoan => "on_loan",
            OrderStatus::Warehouse => "warehouse",
        }
    }

    /// No units exist yet; the order is editable and may be finalized.
    pub fn is_pre_configuration(self) -> bool {
        matches!(self, OrderStatus::Intake | OrderStatus::Configuring)
    }

    /// Units exist; finalization is not reentrant from here.
    pub fn is_configured(self) -> bool {
        !self.is_pre_configuration()
    }

    /// Next status for `event`, or an error if the transition is illegal.
    pub fn apply(self, event: LifecycleEvent) -> Result<OrderStatus, LifecycleError> {
        use LifecycleEvent::*;
        use OrderStatus::*;

        match (self, event) {
            (Intake, BeginConfiguration) => Ok(Configuring),
            (Intake | Configuring, Finalized(disposition)) => Ok(disposition.order_status()),
            (Sold | OnLoan, Archived) => Ok(Warehouse),
            (from, event) => Err(LifecycleError::IllegalTransition { from, event }),
        }
    }

    /// The event that moves `self` to `next`, if any.
    pub fn event_towards(self, next: OrderStatus) -> Option<LifecycleEvent> {
        let event = match next {
            OrderStatus::Configuring => LifecycleEvent::BeginConfiguration,
            OrderStatus::Sold => LifecycleEvent::Finalized(Disposition::Sold),
            OrderStatus::OnLoan => LifecycleEvent::Finalized(Disposition::OnLoan),
            OrderStatus::Warehouse => LifecycleEvent::Archived,
            OrderStatus::Intake => return None,
        };
        self.apply(event).ok().map(|_| event)
    }

    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        self.event_towards(next).is_some()
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_orders_start_in_intake() {
        assert_eq!(OrderStatus::default(), OrderStatus::Intake);
    }

    #[test]
    fn intake_begins_configuration() {
        assert_eq!(
            OrderStatus::Intake.apply(LifecycleEvent::BeginConfiguration),
            Ok(OrderStatus::Configuring)
        );
    }

    #[test]
    fn finalize_from_pre_configuration_states() {
        for from in [OrderStatus::Intake, OrderStatus::Configuring] {
            assert_eq!(
                from.apply(LifecycleEvent::Finalized(Disposition::Sold)),
                Ok(OrderStatus::Sold)
            );
            assert_eq!(
                from.apply(LifecycleEvent::Finalized(Disposition::OnLoan)),
                Ok(OrderStatus::OnLoan)
            );
        }
    }

    #[test]
    fn finalize_is_not_reentrant() {
        for from in [OrderStatus::Sold, OrderStatus::OnLoan, OrderStatus::Warehouse] {
            let err = from
                .apply(LifecycleEvent::Finalized(Disposition::Sold))
                .unwrap_err();
            assert!(matches!(err, LifecycleError::IllegalTransition { .. }));
        }
    }

    #[test]
    fn archive_only_after_configuration() {
        assert_eq!(
            OrderStatus::OnLoan.apply(LifecycleEvent::Archived),
            Ok(OrderStatus::Warehouse)
        );
        assert!(OrderStatus::Intake.apply(LifecycleEvent::Archived).is_err());
        assert!(OrderStatus::Warehouse.apply(LifecycleEvent::Archived).is_err());
    }

    #[test]
    fn no_backward_transitions() {
        assert!(!OrderStatus::Configuring.can_transition_to(OrderStatus::Intake));
        assert!(!OrderStatus::Sold.can_transition_to(OrderStatus::Configuring));
        assert!(!OrderStatus::Warehouse.can_transition_to(OrderStatus::Sold));
        assert!(OrderStatus::Configuring.can_transition_to(OrderStatus::OnLoan));
    }

    #[test]
    fn serde_names() {
        assert_eq!(
            serde_json::to_string(&OrderStatus::OnLoan).unwrap(),
            "\"on_loan\""
        );
        assert_eq!(
            serde_json::from_str::<Disposition>("\"sold\"").unwrap(),
            Disposition::Sold
        );
        assert_eq!(OrderStatus::OnLoan.to_string(), "on_loan");
    }
}
