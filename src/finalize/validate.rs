//! Local batch validation. Checks run in a fixed order and the first failure
//! wins; none of them touches the store.

use std::collections::HashMap;

use chrono::NaiveDate;

use super::{FinalizeError, FinalizeRequest};
use crate::order::{Disposition, Order};
use crate::registry::SerialKey;

/// One slot of a batch that passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedSerial {
    pub slot: u32,
    /// Trimmed raw serial.
    pub serial: String,
    pub key: SerialKey,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedBatch {
    pub serials: Vec<ValidatedSerial>,
    pub disposition: Disposition,
    pub loan_start: Option<NaiveDate>,
}

impl ValidatedBatch {
    pub fn keys(&self) -> Vec<SerialKey> {
        self.serials.iter().map(|s| s.key.clone()).collect()
    }
}

pub fn validate(order: &Order, request: &FinalizeRequest) -> Result<ValidatedBatch, FinalizeError> {
    check_count(order, request)?;
    let loan_start = check_loan_start(request)?;
    let trimmed = check_not_blank(&request.serials)?;
    let keys = normalize_all(&trimmed)?;
    check_local_duplicates(&keys)?;

    let serials = trimmed
        .into_iter()
        .zip(keys)
        .enumerate()
        .map(|(slot, (serial, key))| ValidatedSerial {
            slot: slot as u32,
            serial: serial.to_string(),
            key,
        })
        .collect();

    Ok(ValidatedBatch {
        serials,
        disposition: request.disposition,
        loan_start,
    })
}

fn check_count(order: &Order, request: &FinalizeRequest) -> Result<(), FinalizeError> {
    if request.serials.len() != order.quantity as usize {
        return Err(FinalizeError::SerialCountMismatch {
            expected: order.quantity,
            actual: request.serials.len(),
        });
    }
    Ok(())
}

fn check_loan_start(request: &FinalizeRequest) -> Result<Option<NaiveDate>, FinalizeError> {
    match (request.disposition, request.loan_start) {
        (Disposition::OnLoan, None) => Err(FinalizeError::LoanStartRequired),
        (Disposition::OnLoan, date) => Ok(date),
        (Disposition::Sold, _) => Ok(None),
    }
}

fn check_not_blank(serials: &[String]) -> Result<Vec<&str>, FinalizeError> {
    serials
        .iter()
        .enumerate()
        .map(|(slot, raw)| match raw.trim() {
            "" => Err(FinalizeError::SerialEmpty { slot }),
            trimmed => Ok(trimmed),
        })
        .collect()
}

// A non-blank serial can still normalize to nothing (zero-width characters).
fn normalize_all(trimmed: &[&str]) -> Result<Vec<SerialKey>, FinalizeError> {
    trimmed
        .iter()
        .enumerate()
        .map(|(slot, raw)| SerialKey::normalize(raw).ok_or(FinalizeError::SerialEmpty { slot }))
        .collect()
}

fn check_local_duplicates(keys: &[SerialKey]) -> Result<(), FinalizeError> {
    let mut seen: HashMap<&SerialKey, usize> = HashMap::with_capacity(keys.len());
    for (slot, key) in keys.iter().enumerate() {
        if let Some(&first) = seen.get(key) {
            return Err(FinalizeError::SerialDuplicateLocal {
                first,
                second: slot,
                key: key.to_string(),
            });
        }
        seen.insert(key, slot);
    }
    Ok(())
}
