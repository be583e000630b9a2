//! Preorder allocation: capacity per (variant, channel) instead of per warehouse.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use stockline_core::{ChannelSlug, VariantId};

use crate::applier::{Allocation, AllocationSource};
use crate::ledger::{LedgerError, StockLedger};
use crate::request::{AllocationRequest, ReservationMode};
use crate::reservation::{Availability, Reservations};
use crate::shortage::{AllocationError, Shortage};

/// Ledger key of a preorder pool.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PreorderKey {
    pub variant_id: VariantId,
    pub channel: ChannelSlug,
}

impl PreorderKey {
    pub fn new(variant_id: VariantId, channel: ChannelSlug) -> Self {
        Self {
            variant_id,
            channel,
        }
    }
}

impl core::fmt::Display for PreorderKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "variant {} / channel {}", self.variant_id, self.channel)
    }
}

/// Preorder capacity of one variant in one channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreorderPool {
    pub key: PreorderKey,
    /// `None` means the channel sells the preorder without a cap.
    pub quantity_threshold: Option<u32>,
    pub quantity_allocated: u32,
}

impl PreorderPool {
    pub fn new(key: PreorderKey, quantity_threshold: Option<u32>) -> Self {
        Self {
            key,
            quantity_threshold,
            quantity_allocated: 0,
        }
    }

    pub fn unallocated(&self) -> u32 {
        self.quantity_threshold
            .unwrap_or(u32::MAX)
            .saturating_sub(self.quantity_allocated)
    }
}

/// A preorder pool together with the reservations held against it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreorderRow {
    pub pool: PreorderPool,
    pub reservations: Reservations,
}

impl PreorderRow {
    pub fn new(pool: PreorderPool) -> Self {
        Self {
            pool,
            reservations: Reservations::new(),
        }
    }
}

/// Plans and applies a preorder line in one critical section on its pool.
#[derive(Debug, Clone)]
pub struct PreorderAllocator<L> {
    ledger: L,
}

impl<L> PreorderAllocator<L>
where
    L: StockLedger,
{
    pub fn new(ledger: L) -> Self {
        Self { ledger }
    }

    pub fn allocate_preorder(
        &self,
        request: &AllocationRequest,
        channel: &ChannelSlug,
        mode: ReservationMode,
        now: DateTime<Utc>,
    ) -> Result<Allocation, AllocationError> {
        let key = PreorderKey::new(request.variant_id, channel.clone());
        let shortage = |available: u32| Shortage {
            line_id: request.line_id,
            variant_id: request.variant_id,
            requested: request.quantity,
            available,
        };

        let result = self.ledger.transact_preorder(&key, |row| {
            row.reservations.prune_expired(now);
            let availability = Availability::compute(
                row.pool.unallocated(),
                &row.reservations,
                mode,
                request.owner,
                now,
            );
            if request.quantity > availability.free {
                return Err(AllocationError::InsufficientStock(shortage(availability.free)));
            }

            row.pool.quantity_allocated = row
                .pool
                .quantity_allocated
                .checked_add(request.quantity)
                .ok_or_else(|| LedgerError::Invariant(format!("{key}: allocated overflow")))?;

            let consumed = match request.owner {
                Some(owner) if availability.own_reserved > 0 => row.reservations.consume(
                    owner,
                    availability.own_reserved.min(request.quantity),
                    now,
                ),
                _ => Vec::new(),
            };

            Ok(Allocation {
                line_id: request.line_id,
                variant_id: request.variant_id,
                source: AllocationSource::Preorder(channel.clone()),
                quantity: request.quantity,
                consumed_reservations: consumed,
            })
        });

        match result {
            Ok(allocation) => {
                debug!(%key, quantity = allocation.quantity, "preorder allocated");
                Ok(allocation)
            }
            // A variant without a pool in this channel cannot be preordered there.
            Err(AllocationError::Ledger(LedgerError::UnknownPreorderPool(_))) => {
                warn!(%key, "no preorder pool for channel");
                Err(AllocationError::InsufficientStock(shortage(0)))
            }
            Err(err) => {
                if let Some(s) = err.shortage() {
                    warn!(%key, requested = s.requested, available = s.available, "preorder shortage");
                }
                Err(err)
            }
        }
    }

    /// Undo a preorder allocation (compensation).
    pub fn release(&self, allocation: &Allocation) -> Result<(), AllocationError> {
        let AllocationSource::Preorder(channel) = &allocation.source else {
            return Err(LedgerError::Invariant("not a preorder allocation".into()).into());
        };
        let key = PreorderKey::new(allocation.variant_id, channel.clone());
        self.ledger.transact_preorder(&key, |row| {
            row.pool.quantity_allocated = row
                .pool
                .quantity_allocated
                .checked_sub(allocation.quantity)
                .ok_or_else(|| LedgerError::Invariant(format!("{key}: release exceeds allocated")))?;
            row.reservations.restore(&allocation.consumed_reservations);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::Duration;
    use stockline_core::LineId;

    use crate::ledger::InMemoryStockLedger;
    use crate::request::AllocationStrategy;
    use crate::reservation::{CheckoutToken, Reservation, ReservationTarget};

    fn channel() -> ChannelSlug {
        ChannelSlug::new("default-channel").unwrap()
    }

    fn request(variant_id: VariantId, quantity: u32, owner: Option<CheckoutToken>) -> AllocationRequest {
        AllocationRequest {
            line_id: LineId::new(),
            variant_id,
            quantity,
            strategy: AllocationStrategy::Preorder,
            owner,
        }
    }

    fn setup(threshold: Option<u32>) -> (Arc<InMemoryStockLedger>, PreorderAllocator<Arc<InMemoryStockLedger>>, VariantId) {
        let ledger = Arc::new(InMemoryStockLedger::new());
        let variant = VariantId::new();
        ledger
            .set_preorder_threshold(PreorderKey::new(variant, channel()), threshold)
            .unwrap();
        (ledger.clone(), PreorderAllocator::new(ledger), variant)
    }

    #[test]
    fn allocates_within_threshold() {
        let (ledger, allocator, variant) = setup(Some(10));
        let now = Utc::now();

        let allocation = allocator
            .allocate_preorder(&request(variant, 4, None), &channel(), ReservationMode::Enabled, now)
            .unwrap();
        assert_eq!(allocation.quantity, 4);

        let row = ledger.preorder(&PreorderKey::new(variant, channel())).unwrap().unwrap();
        assert_eq!(row.pool.quantity_allocated, 4);
    }

    #[test]
    fn threshold_exceeded_reports_shortage() {
        let (ledger, allocator, variant) = setup(Some(3));
        let err = allocator
            .allocate_preorder(&request(variant, 5, None), &channel(), ReservationMode::Enabled, Utc::now())
            .unwrap_err();

        match err {
            AllocationError::InsufficientStock(s) => {
                assert_eq!((s.requested, s.available), (5, 3));
            }
            other => panic!("unexpected: {other:?}"),
        }
        let row = ledger.preorder(&PreorderKey::new(variant, channel())).unwrap().unwrap();
        assert_eq!(row.pool.quantity_allocated, 0);
    }

    #[test]
    fn unlimited_pool_never_runs_short() {
        let (_, allocator, variant) = setup(None);
        assert!(allocator
            .allocate_preorder(&request(variant, 10_000, None), &channel(), ReservationMode::Enabled, Utc::now())
            .is_ok());
    }

    #[test]
    fn foreign_reservations_reduce_capacity_only_when_enabled() {
        let (ledger, allocator, variant) = setup(Some(5));
        let now = Utc::now();
        ledger
            .reserve(
                &ReservationTarget::Preorder(PreorderKey::new(variant, channel())),
                Reservation::new(CheckoutToken::new(), 3, now + Duration::minutes(5)),
            )
            .unwrap();

        assert!(allocator
            .allocate_preorder(&request(variant, 3, None), &channel(), ReservationMode::Enabled, now)
            .is_err());
        assert!(allocator
            .allocate_preorder(&request(variant, 3, None), &channel(), ReservationMode::Disabled, now)
            .is_ok());
    }

    #[test]
    fn own_reservation_is_consumed_and_restored_on_release() {
        let (ledger, allocator, variant) = setup(Some(5));
        let now = Utc::now();
        let mine = CheckoutToken::new();
        let key = PreorderKey::new(variant, channel());
        ledger
            .reserve(
                &ReservationTarget::Preorder(key.clone()),
                Reservation::new(mine, 2, now + Duration::minutes(5)),
            )
            .unwrap();

        let allocation = allocator
            .allocate_preorder(&request(variant, 5, Some(mine)), &channel(), ReservationMode::Enabled, now)
            .unwrap();
        assert!(ledger.preorder(&key).unwrap().unwrap().reservations.is_empty());

        allocator.release(&allocation).unwrap();
        let row = ledger.preorder(&key).unwrap().unwrap();
        assert_eq!(row.pool.quantity_allocated, 0);
        assert_eq!(row.reservations.owned_active(now, Some(mine)), 2);
    }

    #[test]
    fn missing_pool_is_a_shortage_of_zero() {
        let ledger = Arc::new(InMemoryStockLedger::new());
        let allocator = PreorderAllocator::new(ledger);
        let err = allocator
            .allocate_preorder(&request(VariantId::new(), 1, None), &channel(), ReservationMode::Enabled, Utc::now())
            .unwrap_err();
        assert!(matches!(err, AllocationError::InsufficientStock(s) if s.available == 0));
    }
}
