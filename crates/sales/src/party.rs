//! Addresses, customers and payments referenced by an order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockline_core::{CountryCode, CustomerId, Money, PaymentId, ValueObject};

/// Postal address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub first_name: String,
    pub last_name: String,
    pub street_address: String,
    pub city: String,
    pub postal_code: String,
    pub country: CountryCode,
}

impl ValueObject for Address {}

/// A registered customer linked to an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerRef {
    pub id: CustomerId,
    pub email: String,
}

/// Payment attached to an order (capture is handled elsewhere).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRef {
    pub id: PaymentId,
    pub amount: Money,
    pub created_at: DateTime<Utc>,
}
