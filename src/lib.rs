// Lets `#[derive(Document)]` expand to `serial_ledger::Document` inside this crate too.
extern crate self as serial_ledger;

mod document;
mod finalize;
mod order;
mod registry;
mod settings;
mod transaction;
mod unit;

pub use document::{
    DocRef, Document, DocumentRepository, DocumentStore, DocumentsExt, InMemoryDocumentStore,
    Precondition, Query, SortDirection, StoreError, Subscribe, Subscription, Versioned,
    WriteBatch, WriteOp, WriteResult,
};
pub use finalize::{
    parse_loan_start, validate, ErrorKind, FinalizationEngine, FinalizeError, FinalizeRequest,
    ValidatedBatch, ValidatedSerial,
};
pub use order::{
    Disposition, LifecycleError, LifecycleEvent, Order, OrderRepository, OrderStatus,
    OrderUpdateError,
};
pub use registry::{
    claim, claim_if_free, lookup, normalize_serial, read_claim, read_claims, ClaimStatus,
    RegistryEntry, SerialKey,
};
pub use settings::{CommitMode, EngineConfig};
pub use transaction::{run_transaction, Transaction};
pub use unit::{
    archive_order, Unit, UnitError, UnitSnapshot, UnitsExt, WarehouseError, WarehouseRecord,
};

// Derive macro for `Document`
pub use serial_ledger_macros::Document;

// Re-export the config crate's error so callers can match on load failures
pub use config::ConfigError;
