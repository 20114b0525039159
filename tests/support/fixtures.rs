//! Shared builders for orders, engines and prior claims.

use chrono::{NaiveDate, Utc};
use rust_decimal_macros::dec;
use serial_ledger::{
    DocumentStore, FinalizationEngine, Order, RegistryEntry, SerialKey, Unit,
};
use tracing_subscriber::EnvFilter;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Unsaved order for `quantity` units.
pub fn order(quantity: u32) -> Order {
    Order::new("client-1", "Acme Corp", "mat-7", "Hydraulic Pump", quantity, dec!(125.00))
        .with_distributor("dist-3", "North Supply")
}

/// Order saved in `intake`. The returned value is the caller's snapshot.
pub fn stored_order<S: DocumentStore>(store: &S, quantity: u32) -> Order {
    let order = order(quantity);
    store.insert(&order).expect("insert order");
    order
}

pub fn engine<S: DocumentStore>(store: S) -> FinalizationEngine<S> {
    init_tracing();
    FinalizationEngine::new(store)
}

/// Registry entry left behind by some earlier, unrelated order.
pub fn prior_claim<S: DocumentStore>(store: &S, raw: &str) -> RegistryEntry {
    let key = SerialKey::normalize(raw).expect("non-empty serial");
    let entry = RegistryEntry::new(&key, raw.trim(), "old-order-u0", "old-order", Utc::now());
    store.insert(&entry).expect("insert claim");
    entry
}

pub fn loan_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 9, 1).expect("valid date")
}

pub fn unit_count<S: DocumentStore>(store: &S) -> usize {
    store.find::<Unit>(&|_| true).expect("list units").len()
}

pub fn registry_count<S: DocumentStore>(store: &S) -> usize {
    store
        .find::<RegistryEntry>(&|_| true)
        .expect("list registry")
        .len()
}
