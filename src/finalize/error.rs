use std::fmt;

use thiserror::Error;

use crate::document::StoreError;
use crate::order::OrderUpdateError;

/// Closed set of finalization failure kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    SerialCountMismatch,
    LoanStartRequired,
    SerialEmpty,
    SerialDuplicateLocal,
    AlreadyConfigured,
    SerialExists,
    OrderNotFound,
    StaleOrder,
    Storage,
    StatusUpdateFailed,
}

impl ErrorKind {
    /// Stable code, e.g. `SERIAL_EXISTS`.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::SerialCountMismatch => "SERIAL_COUNT_MISMATCH",
            ErrorKind::LoanStartRequired => "LOAN_START_REQUIRED",
            ErrorKind::SerialEmpty => "SERIAL_EMPTY",
            ErrorKind::SerialDuplicateLocal => "SERIAL_DUPLICATE_LOCAL",
            ErrorKind::AlreadyConfigured => "ALREADY_CONFIGURED",
            ErrorKind::SerialExists => "SERIAL_EXISTS",
            ErrorKind::OrderNotFound => "ORDER_NOT_FOUND",
            ErrorKind::StaleOrder => "STALE_ORDER",
            ErrorKind::Storage => "STORAGE",
            ErrorKind::StatusUpdateFailed => "STATUS_UPDATE_FAILED",
        }
    }

    /// Message shown to the person submitting the batch.
    pub fn user_message(self) -> &'static str {
        match self {
            ErrorKind::SerialCountMismatch => {
                "The number of serial numbers must match the order quantity."
            }
            ErrorKind::LoanStartRequired => "A loan start date is required for units on loan.",
            ErrorKind::SerialEmpty => "Every unit needs a serial number.",
            ErrorKind::SerialDuplicateLocal => "The same serial number was entered twice.",
            ErrorKind::AlreadyConfigured => "This order already has units.",
            ErrorKind::SerialExists => "One or more serial numbers are already in use.",
            ErrorKind::OrderNotFound => "The order no longer exists.",
            ErrorKind::StaleOrder => "The order was changed elsewhere. Reload it and try again.",
            ErrorKind::Storage => "The save did not go through. Please try again.",
            ErrorKind::StatusUpdateFailed => {
                "Units were created but the order status could not be updated."
            }
        }
    }

    /// Whether resubmitting the identical request may succeed.
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::Storage)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a finalization was rejected.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FinalizeError {
    #[error("expected {expected} serial numbers, got {actual}")]
    SerialCountMismatch { expected: u32, actual: usize },

    #[error("on-loan finalization needs a valid loan start date")]
    LoanStartRequired,

    /// `slot` is zero-based.
    #[error("serial number for slot {slot} is empty")]
    SerialEmpty { slot: usize },

    #[error("serial numbers in slots {first} and {second} are the same ({key})")]
    SerialDuplicateLocal {
        first: usize,
        second: usize,
        key: String,
    },

    #[error("order {order_id} already has units")]
    AlreadyConfigured { order_id: String },

    /// Raw serials of the batch that are already claimed, in slot order.
    #[error("serial numbers already in use: {}", serials.join(", "))]
    SerialExists { serials: Vec<String> },

    #[error("order {order_id} not found")]
    OrderNotFound { order_id: String },

    #[error("order {order_id} no longer matches the submitted snapshot")]
    StaleOrder { order_id: String },

    #[error("storage failure: {0}")]
    Storage(#[from] StoreError),

    #[error("units {unit_ids:?} committed but order {order_id} status update failed: {source}")]
    StatusUpdateFailed {
        order_id: String,
        unit_ids: Vec<String>,
        source: OrderUpdateError,
    },
}

impl FinalizeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FinalizeError::SerialCountMismatch { .. } => ErrorKind::SerialCountMismatch,
            FinalizeError::LoanStartRequired => ErrorKind::LoanStartRequired,
            FinalizeError::SerialEmpty { .. } => ErrorKind::SerialEmpty,
            FinalizeError::SerialDuplicateLocal { .. } => ErrorKind::SerialDuplicateLocal,
            FinalizeError::AlreadyConfigured { .. } => ErrorKind::AlreadyConfigured,
            FinalizeError::SerialExists { .. } => ErrorKind::SerialExists,
            FinalizeError::OrderNotFound { .. } => ErrorKind::OrderNotFound,
            FinalizeError::StaleOrder { .. } => ErrorKind::StaleOrder,
            FinalizeError::Storage(_) => ErrorKind::Storage,
            FinalizeError::StatusUpdateFailed { .. } => ErrorKind::StatusUpdateFailed,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }

    pub fn user_message(&self) -> &'static str {
        self.kind().user_message()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    const ALL: [ErrorKind; 10] = [
        ErrorKind::SerialCountMismatch,
        ErrorKind::LoanStartRequired,
        ErrorKind::SerialEmpty,
        ErrorKind::SerialDuplicateLocal,
        ErrorKind::AlreadyConfigured,
        ErrorKind::SerialExists,
        ErrorKind::OrderNotFound,
        ErrorKind::StaleOrder,
        ErrorKind::Storage,
        ErrorKind::StatusUpdateFailed,
    ];

    #[test]
    fn every_kind_has_a_distinct_code_and_message() {
        let codes: HashSet<_> = ALL.iter().map(|k| k.as_str()).collect();
        let messages: HashSet<_> = ALL.iter().map(|k| k.user_message()).collect();
        assert_eq!(codes.len(), ALL.len());
        assert_eq!(messages.len(), ALL.len());
    }

    #[test]
    fn serial_exists_is_not_retryable_but_storage_is() {
        let exists = FinalizeError::SerialExists {
            serials: vec!["SN-1".into()],
        };
        assert_eq!(exists.kind(), ErrorKind::SerialExists);
        assert!(!exists.is_retryable());

        let storage = FinalizeError::from(StoreError::Unavailable("timeout".into()));
        assert_eq!(storage.kind(), ErrorKind::Storage);
        assert!(storage.is_retryable());
        assert_ne!(exists.user_message(), storage.user_message());
    }

    #[test]
    fn display_names_offending_serials() {
        let err = FinalizeError::SerialExists {
            serials: vec!["SN-1".into(), "SN-4".into()],
        };
        assert_eq!(err.to_string(), "serial numbers already in use: SN-1, SN-4");
        assert_eq!(ErrorKind::SerialExists.to_string(), "SERIAL_EXISTS");
    }
}
