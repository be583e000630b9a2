//! Inputs to the allocator: what a single order line asks for.

use serde::{Deserialize, Serialize};

use stockline_core::{LineId, VariantId};

use crate::reservation::CheckoutToken;

/// Which pool a line allocates from, resolved once per line.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocationStrategy {
    /// Physical stock across warehouses.
    Stock,
    /// Preorder capacity of the order's channel.
    Preorder,
    /// Variant tracks nothing; no allocation required.
    Skip,
}

impl AllocationStrategy {
    /// Preorder wins over inventory tracking; a line never uses both paths.
    pub fn resolve(track_inventory: bool, preorder_active: bool) -> Self {
        match (preorder_active, track_inventory) {
            (true, _) => AllocationStrategy::Preorder,
            (false, true) => AllocationStrategy::Stock,
            (false, false) => AllocationStrategy::Skip,
        }
    }
}

/// Whether active reservations reduce allocatable quantity.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationMode {
    Enabled,
    Disabled,
}

impl ReservationMode {
    pub fn is_enabled(self) -> bool {
        matches!(self, ReservationMode::Enabled)
    }
}

impl From<bool> for ReservationMode {
    fn from(enabled: bool) -> Self {
        if enabled {
            ReservationMode::Enabled
        } else {
            ReservationMode::Disabled
        }
    }
}

/// One line's allocation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationRequest {
    pub line_id: LineId,
    pub variant_id: VariantId,
    pub quantity: u32,
    pub strategy: AllocationStrategy,
    /// Checkout whose reservations this order may consume.
    pub owner: Option<CheckoutToken>,
}
