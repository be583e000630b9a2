//! Monetary amounts in minor currency units.

use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::value_object::ValueObject;

/// Amount in the smallest currency unit (e.g. cents) plus an ISO 4217 code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Money {
    amount: u64,
    currency: String,
}

impl Money {
    pub fn new(amount: u64, currency: &str) -> Result<Self, DomainError> {
        if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_uppercase()) {
            return Err(DomainError::validation(format!(
                "currency must be a 3-letter upper-case code, got '{currency}'"
            )));
        }
        Ok(Self {
            amount,
            currency: currency.to_string(),
        })
    }

    /// Zero in the given currency.
    pub fn zero(currency: &str) -> Result<Self, DomainError> {
        Self::new(0, currency)
    }

    pub fn amount(&self) -> u64 {
        self.amount
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    pub fn is_zero(&self) -> bool {
        self.amount == 0
    }
}

impl ValueObject for Money {}

impl core::fmt::Display for Money {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{} {}", self.amount, self.currency)
    }
}
