//! Allocation applier: commit a plan against the current ledger state.
//!
//! The plan was computed from a snapshot; nothing was locked in between. The
//! applier locks every row the plan targets, re-checks availability and then
//! either commits the whole line or nothing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use stockline_core::{ChannelSlug, LineId, VariantId, WarehouseId};

use crate::ledger::{LedgerError, StockLedger};
use crate::planner::AllocationPlan;
use crate::reservation::{Availability, Reservation};
use crate::shortage::{AllocationError, Shortage};
use crate::stock::StockKey;

/// Where an allocation's quantity was taken from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum AllocationSource {
    Warehouse(WarehouseId),
    Preorder(ChannelSlug),
}

/// Receipt of committed quantity for one line from one source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    pub line_id: LineId,
    pub variant_id: VariantId,
    pub source: AllocationSource,
    pub quantity: u32,
    /// Reservation portions consumed by this allocation.
    pub consumed_reservations: Vec<Reservation>,
}

#[derive(Debug, Clone)]
pub struct AllocationApplier<L> {
    ledger: L,
}

impl<L> AllocationApplier<L>
where
    L: StockLedger,
{
    pub fn new(ledger: L) -> Self {
        Self { ledger }
    }

    /// Commit `plan` as one unit.
    ///
    /// Fails with `StockConflict` (and mutates nothing) when any targeted row
    /// no longer has the planned quantity available.
    pub fn apply(
        &self,
        plan: &AllocationPlan,
        now: DateTime<Utc>,
    ) -> Result<Vec<Allocation>, AllocationError> {
        let keys = plan.keys();
        let mut unique = keys.clone();
        unique.sort();
        unique.dedup();
        if unique.len() != keys.len() {
            return Err(LedgerError::Invariant("plan targets a warehouse twice".into()).into());
        }
        if plan.total() != plan.requested {
            return Err(LedgerError::Invariant(format!(
                "plan covers {} of {} requested",
                plan.total(),
                plan.requested
            ))
            .into());
        }

        self.ledger.transact_stock(&keys, |txn| {
            let mut current = Vec::with_capacity(plan.allocations.len());
            let mut available_now = 0u32;
            let mut conflict = false;

            for (planned, key) in plan.allocations.iter().zip(&keys) {
                let row = txn.get_mut(key).ok_or(LedgerError::UnknownStock(*key))?;
                row.reservations.prune_expired(now);
                let availability = Availability::compute(
                    row.record.unallocated(),
                    &row.reservations,
                    plan.mode,
                    plan.owner,
                    now,
                );
                available_now = available_now.saturating_add(availability.free);
                conflict |= planned.quantity > availability.free;
                current.push(availability);
            }

            if conflict {
                warn!(
                    line_id = %plan.line_id,
                    variant_id = %plan.variant_id,
                    requested = plan.requested,
                    available = available_now,
                    "stock changed between planning and commit"
                );
                return Err(AllocationError::StockConflict(Shortage {
                    line_id: plan.line_id,
                    variant_id: plan.variant_id,
                    requested: plan.requested,
                    available: available_now,
                }));
            }

            let mut allocations = Vec::with_capacity(plan.allocations.len());
            for ((planned, key), availability) in plan.allocations.iter().zip(&keys).zip(current) {
                let row = txn.get_mut(key).ok_or(LedgerError::UnknownStock(*key))?;
                row.record.quantity_allocated += planned.quantity;
                if row.record.quantity_allocated > row.record.quantity {
                    return Err(AllocationError::Ledger(LedgerError::Invariant(format!(
                        "{key}: allocated exceeds quantity"
                    ))));
                }

                let consumed = match plan.owner {
                    Some(owner) if availability.own_reserved > 0 => row.reservations.consume(
                        owner,
                        availability.own_reserved.min(planned.quantity),
                        now,
                    ),
                    _ => Vec::new(),
                };

                allocations.push(Allocation {
                    line_id: plan.line_id,
                    variant_id: plan.variant_id,
                    source: AllocationSource::Warehouse(planned.warehouse_id),
                    quantity: planned.quantity,
                    consumed_reservations: consumed,
                });
            }

            debug!(line_id = %plan.line_id, rows = allocations.len(), "allocation committed");
            Ok(allocations)
        })
    }

    /// Undo warehouse allocations (compensation): decrement allocated counters
    /// and put consumed reservations back.
    pub fn release(&self, allocations: &[Allocation]) -> Result<(), AllocationError> {
        let mut targets = Vec::with_capacity(allocations.len());
        for allocation in allocations {
            match &allocation.source {
                AllocationSource::Warehouse(warehouse_id) => targets.push((
                    StockKey::new(*warehouse_id, allocation.variant_id),
                    allocation,
                )),
                AllocationSource::Preorder(_) => {
                    return Err(LedgerError::Invariant("not a warehouse allocation".into()).into());
                }
            }
        }
        if targets.is_empty() {
            return Ok(());
        }

        let keys: Vec<StockKey> = targets.iter().map(|(k, _)| *k).collect();
        self.ledger.transact_stock(&keys, |txn| {
            for (key, allocation) in &targets {
                let row = txn.get_mut(key).ok_or(LedgerError::UnknownStock(*key))?;
                row.record.quantity_allocated = row
                    .record
                    .quantity_allocated
                    .checked_sub(allocation.quantity)
                    .ok_or_else(|| LedgerError::Invariant(format!("{key}: release exceeds allocated")))?;
                row.reservations.restore(&allocation.consumed_reservations);
            }
            Ok(())
        })
    }
}
