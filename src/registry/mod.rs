//! Serial registry - one permanent claim per normalized serial number.
//!
//! Entries are created only inside a transaction, together with the unit they
//! identify, and are never updated or deleted. Claims are checked and written
//! through a [`Transaction`] so that the check and the claim commit together.

use std::fmt;

use caseless::default_case_fold_str;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::document::{DocumentStore, StoreError};
use crate::transaction::Transaction;
use crate::Document;

/// Characters dropped by normalization besides whitespace.
const INVISIBLE: [char; 5] = ['\u{200B}', '\u{200C}', '\u{200D}', '\u{2060}', '\u{FEFF}'];

/// Normalize a raw serial: trim, apply full Unicode case folding, drop
/// whitespace and zero-width characters anywhere in the string.
pub fn normalize_serial(raw: &str) -> String {
    default_case_fold_str(raw.trim())
        .chars()
        .filter(|c| !c.is_whitespace() && !INVISIBLE.contains(c))
        .collect()
}

/// A normalized, non-empty serial number. The uniqueness key of the registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SerialKey(String);

impl SerialKey {
    /// Normalize `raw`; `None` if nothing is left.
    pub fn normalize(raw: &str) -> Option<Self> {
        let key = normalize_serial(raw);
        if key.is_empty() {
            None
        } else {
            Some(SerialKey(key))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SerialKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SerialKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A claimed serial.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Document)]
#[document(collection = "serial_registry")]
pub struct RegistryEntry {
    /// Normalized serial, also the document id.
    #[document(id)]
    pub serial_key: String,
    /// Serial as entered (trimmed).
    pub serial: String,
    pub unit_id: String,
    pub order_id: String,
    pub claimed_at: DateTime<Utc>,
}

impl RegistryEntry {
    pub fn new(
        key: &SerialKey,
        serial: impl Into<String>,
        unit_id: impl Into<String>,
        order_id: impl Into<String>,
        claimed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            serial_key: key.as_str().to_string(),
            serial: serial.into(),
            unit_id: unit_id.into(),
            order_id: order_id.into(),
            claimed_at,
        }
    }
}

/// What a transaction observed for a serial.
#[derive(Debug, Clone, PartialEq)]
pub enum ClaimStatus {
    Free,
    Claimed(RegistryEntry),
}

impl ClaimStatus {
    pub fn is_free(&self) -> bool {
        matches!(self, ClaimStatus::Free)
    }
}

/// Read the current claim for `key` into the transaction's read-set.
pub fn read_claim<S>(tx: &mut Transaction<'_, S>, key: &SerialKey) -> Result<ClaimStatus, StoreError>
where
    S: DocumentStore + ?Sized,
{
    Ok(match tx.read::<RegistryEntry>(key.as_str())? {
        Some(entry) => ClaimStatus::Claimed(entry.data),
        None => ClaimStatus::Free,
    })
}

/// Read the claims for every key, in order. All reads happen before any
/// write the caller stages afterwards.
pub fn read_claims<S>(
    tx: &mut Transaction<'_, S>,
    keys: &[SerialKey],
) -> Result<Vec<ClaimStatus>, StoreError>
where
    S: DocumentStore + ?Sized,
{
    keys.iter().map(|key| read_claim(tx, key)).collect()
}

/// Stage a new claim. The commit fails if the serial was claimed in the
/// meantime.
pub fn claim<S>(tx: &mut Transaction<'_, S>, entry: &RegistryEntry) -> Result<(), StoreError>
where
    S: DocumentStore + ?Sized,
{
    tx.create(entry)
}

/// Check-and-claim for a single serial. Stages the claim only when free and
/// returns what was observed. Since it writes, it must be the last read of
/// the transaction.
pub fn claim_if_free<S>(
    tx: &mut Transaction<'_, S>,
    entry: &RegistryEntry,
) -> Result<ClaimStatus, StoreError>
where
    S: DocumentStore + ?Sized,
{
    let status = match tx.read::<RegistryEntry>(&entry.serial_key)? {
        Some(existing) => ClaimStatus::Claimed(existing.data),
        None => ClaimStatus::Free,
    };
    if status.is_free() {
        claim(tx, entry)?;
    }
    Ok(status)
}

/// Who owns `raw` right now, outside any transaction.
pub fn lookup<S: DocumentStore + ?Sized>(
    store: &S,
    raw: &str,
) -> Result<Option<RegistryEntry>, StoreError> {
    match SerialKey::normalize(raw) {
        Some(key) => Ok(store.get::<RegistryEntry>(key.as_str())?.map(|entry| entry.data)),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::InMemoryDocumentStore;

    fn entry(raw: &str, unit_id: &str) -> RegistryEntry {
        let key = SerialKey::normalize(raw).unwrap();
        RegistryEntry::new(&key, raw.trim(), unit_id, "order-1", Utc::now())
    }

    #[test]
    fn normalization_folds_case_and_whitespace() {
        assert_eq!(normalize_serial("  SN-001 "), "sn-001");
        assert_eq!(normalize_serial("ab 12"), "ab12");
        assert_eq!(normalize_serial("AB12"), "ab12");
        assert_eq!(normalize_serial("a\tb\n1 2"), "ab12");
    }

    #[test]
    fn normalization_uses_full_case_folding() {
        assert_eq!(normalize_serial("STRASSE-1"), normalize_serial("straße-1"));
        assert_eq!(normalize_serial("straße-1"), "strasse-1");
        assert_eq!(normalize_serial("ΣΑΣ"), normalize_serial("σας"));
        assert_eq!(
            SerialKey::normalize("ǅ-7").unwrap(),
            SerialKey::normalize("Ǆ-7").unwrap()
        );
    }

    #[test]
    fn normalization_drops_zero_width_characters() {
        assert_eq!(normalize_serial("SN\u{200B}-1"), "sn-1");
        assert!(SerialKey::normalize("\u{200B}\u{FEFF}").is_none());
        assert!(SerialKey::normalize("   ").is_none());
    }

    #[test]
    fn entry_is_keyed_by_normalized_serial() {
        let entry = entry(" AB 12 ", "u-1");
        assert_eq!(entry.serial_key, "ab12");
        assert_eq!(entry.serial, "AB 12");
        assert_eq!(RegistryEntry::COLLECTION, "serial_registry");
        assert_eq!(entry.id(), "ab12");
    }

    #[test]
    fn claim_if_free_claims_once() {
        let store = InMemoryDocumentStore::new();

        let mut tx = Transaction::new(&store);
        assert!(claim_if_free(&mut tx, &entry("SN-1", "u-1")).unwrap().is_free());
        tx.commit().unwrap();

        let mut tx = Transaction::new(&store);
        match claim_if_free(&mut tx, &entry("sn-1", "u-2")).unwrap() {
            ClaimStatus::Claimed(existing) => assert_eq!(existing.unit_id, "u-1"),
            ClaimStatus::Free => panic!("serial should already be claimed"),
        }
        assert_eq!(tx.write_count(), 0);
    }

    #[test]
    fn read_claims_reports_each_key() {
        let store = InMemoryDocumentStore::new();
        store.insert(&entry("SN-2", "u-9")).unwrap();

        let keys: Vec<SerialKey> = ["sn-1", "SN -2", "sn-3"]
            .iter()
            .map(|raw| SerialKey::normalize(raw).unwrap())
            .collect();
        let mut tx = Transaction::new(&store);
        let claims = read_claims(&mut tx, &keys).unwrap();

        assert!(claims[0].is_free());
        assert!(!claims[1].is_free());
        assert!(claims[2].is_free());
    }

    #[test]
    fn lookup_normalizes_input() {
        let store = InMemoryDocumentStore::new();
        store.insert(&entry("SN-7", "u-7")).unwrap();

        assert_eq!(lookup(&store, " sn-7 ").unwrap().unwrap().unit_id, "u-7");
        assert!(lookup(&store, "sn-8").unwrap().is_none());
        assert!(lookup(&store, "  ").unwrap().is_none());
    }
}
