//! Shortage reporting shared by the stock and preorder paths.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use stockline_core::{LineId, VariantId};

use crate::ledger::LedgerError;

/// Gap between what a line asked for and what could be allocated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shortage {
    pub line_id: LineId,
    pub variant_id: VariantId,
    pub requested: u32,
    pub available: u32,
}

impl Shortage {
    pub fn missing(&self) -> u32 {
        self.requested.saturating_sub(self.available)
    }
}

impl core::fmt::Display for Shortage {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "insufficient stock for variant {}: requested {}, available {}",
            self.variant_id, self.requested, self.available
        )
    }
}

/// Failure of a single line's allocation.
#[derive(Debug, Error)]
pub enum AllocationError {
    /// Not enough quantity when the line was planned.
    #[error("{0}")]
    InsufficientStock(Shortage),

    /// Availability changed between planning and commit (transient).
    #[error("stock changed during allocation: {0}")]
    StockConflict(Shortage),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl AllocationError {
    /// Shortage carried by the error, if it is a quantity problem.
    pub fn shortage(&self) -> Option<&Shortage> {
        match self {
            AllocationError::InsufficientStock(s) | AllocationError::StockConflict(s) => Some(s),
            AllocationError::Ledger(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_variant_and_quantities() {
        let s = Shortage {
            line_id: LineId::new(),
            variant_id: VariantId::new(),
            requested: 5,
            available: 2,
        };
        let text = s.to_string();
        assert!(text.contains(&s.variant_id.to_string()));
        assert!(text.contains("requested 5, available 2"));
        assert_eq!(s.missing(), 3);
    }
}
