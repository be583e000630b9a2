//! Stock ledger records: per-(warehouse, variant) counters.

use serde::{Deserialize, Serialize};

use stockline_core::{VariantId, WarehouseId};

use crate::reservation::Reservations;

/// Ledger key of one stock row.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StockKey {
    pub warehouse_id: WarehouseId,
    pub variant_id: VariantId,
}

impl StockKey {
    pub fn new(warehouse_id: WarehouseId, variant_id: VariantId) -> Self {
        Self {
            warehouse_id,
            variant_id,
        }
    }
}

impl core::fmt::Display for StockKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "warehouse {} / variant {}", self.warehouse_id, self.variant_id)
    }
}

/// Quantity on hand and quantity already allocated to orders.
///
/// Invariant: `quantity_allocated <= quantity`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockRecord {
    pub key: StockKey,
    pub quantity: u32,
    pub quantity_allocated: u32,
}

impl StockRecord {
    pub fn new(key: StockKey, quantity: u32) -> Self {
        Self {
            key,
            quantity,
            quantity_allocated: 0,
        }
    }

    /// On-hand quantity not yet allocated to any order.
    pub fn unallocated(&self) -> u32 {
        self.quantity.saturating_sub(self.quantity_allocated)
    }
}

/// A stock record together with the reservations held against it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockRow {
    pub record: StockRecord,
    pub reservations: Reservations,
}

impl StockRow {
    pub fn new(record: StockRecord) -> Self {
        Self {
            record,
            reservations: Reservations::new(),
        }
    }
}
