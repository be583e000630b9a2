//! Allocation planner: split a line's quantity across candidate warehouses.
//!
//! Planning is read-only. It works on snapshots of the rows it looks at and
//! its result is re-validated by the applier at commit time.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use stockline_core::{ChannelSlug, CountryCode, LineId, VariantId, WarehouseId};

use crate::ledger::StockLedger;
use crate::policy::WarehousePolicy;
use crate::request::{AllocationRequest, ReservationMode};
use crate::reservation::{Availability, CheckoutToken};
use crate::shortage::{AllocationError, Shortage};
use crate::stock::StockKey;

/// Quantity to take from one warehouse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedAllocation {
    pub warehouse_id: WarehouseId,
    pub quantity: u32,
    /// Part of `quantity` covered by the order's own reservations at plan time.
    pub own_reserved: u32,
}

/// Ordered split of one line across warehouses, summing to `requested`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationPlan {
    pub line_id: LineId,
    pub variant_id: VariantId,
    pub requested: u32,
    pub owner: Option<CheckoutToken>,
    pub mode: ReservationMode,
    pub allocations: Vec<PlannedAllocation>,
}

impl AllocationPlan {
    pub fn total(&self) -> u32 {
        self.allocations
            .iter()
            .fold(0u32, |acc, a| acc.saturating_add(a.quantity))
    }

    pub fn keys(&self) -> Vec<StockKey> {
        self.allocations
            .iter()
            .map(|a| StockKey::new(a.warehouse_id, self.variant_id))
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct AllocationPlanner<L, P> {
    ledger: L,
    policy: P,
}

impl<L, P> AllocationPlanner<L, P>
where
    L: StockLedger,
    P: WarehousePolicy,
{
    pub fn new(ledger: L, policy: P) -> Self {
        Self { ledger, policy }
    }

    /// Greedily fill `request` from the warehouses serving `country` in
    /// `channel`, in policy order.
    ///
    /// Fails with `InsufficientStock` carrying the total quantity found when
    /// the candidates cannot cover the request.
    pub fn plan(
        &self,
        request: &AllocationRequest,
        country: &CountryCode,
        channel: &ChannelSlug,
        mode: ReservationMode,
        now: DateTime<Utc>,
    ) -> Result<AllocationPlan, AllocationError> {
        let mut remaining = request.quantity;
        let mut available_total = 0u32;
        let mut allocations = Vec::new();
        let mut seen = HashSet::new();

        for warehouse_id in self.policy.candidates(country, channel) {
            if remaining == 0 {
                break;
            }
            if !seen.insert(warehouse_id) {
                continue;
            }
            let key = StockKey::new(warehouse_id, request.variant_id);
            let Some(row) = self.ledger.stock(&key)? else {
                continue;
            };

            let availability = Availability::compute(
                row.record.unallocated(),
                &row.reservations,
                mode,
                request.owner,
                now,
            );
            available_total = available_total.saturating_add(availability.free);
            if availability.free == 0 {
                continue;
            }

            let take = remaining.min(availability.free);
            allocations.push(PlannedAllocation {
                warehouse_id,
                quantity: take,
                own_reserved: availability.own_reserved.min(take),
            });
            remaining -= take;
        }

        if remaining > 0 {
            warn!(
                line_id = %request.line_id,
                variant_id = %request.variant_id,
                requested = request.quantity,
                available = available_total,
                "insufficient stock while planning"
            );
            return Err(AllocationError::InsufficientStock(Shortage {
                line_id: request.line_id,
                variant_id: request.variant_id,
                requested: request.quantity,
                available: available_total,
            }));
        }

        debug!(
            line_id = %request.line_id,
            warehouses = allocations.len(),
            "allocation planned"
        );

        Ok(AllocationPlan {
            line_id: request.line_id,
            variant_id: request.variant_id,
            requested: request.quantity,
            owner: request.owner,
            mode,
            allocations,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::Duration;
    use proptest::prelude::*;

    use crate::ledger::InMemoryStockLedger;
    use crate::policy::PriorityWarehousePolicy;
    use crate::request::AllocationStrategy;
    use crate::reservation::{Reservation, ReservationTarget};

    fn channel() -> ChannelSlug {
        ChannelSlug::new("default-channel").unwrap()
    }

    fn country() -> CountryCode {
        CountryCode::new("US").unwrap()
    }

    fn request(variant_id: VariantId, quantity: u32) -> AllocationRequest {
        AllocationRequest {
            line_id: LineId::new(),
            variant_id,
            quantity,
            strategy: AllocationStrategy::Stock,
            owner: None,
        }
    }

    /// Ledger with one warehouse per `(quantity, allocated)` entry, in order.
    fn setup(
        rows: &[(u32, u32)],
    ) -> (
        Arc<InMemoryStockLedger>,
        AllocationPlanner<Arc<InMemoryStockLedger>, PriorityWarehousePolicy>,
        VariantId,
        Vec<WarehouseId>,
    ) {
        let ledger = Arc::new(InMemoryStockLedger::new());
        let variant = VariantId::new();
        let warehouses: Vec<WarehouseId> = rows.iter().map(|_| WarehouseId::new()).collect();
        for (warehouse, (quantity, allocated)) in warehouses.iter().zip(rows) {
            let key = StockKey::new(*warehouse, variant);
            ledger.set_stock_quantity(key, *quantity).unwrap();
            ledger
                .transact_stock(&[key], |txn| -> Result<(), crate::ledger::LedgerError> {
                    txn.get_mut(&key).unwrap().record.quantity_allocated = *allocated;
                    Ok(())
                })
                .unwrap();
        }
        let policy = PriorityWarehousePolicy::new().with_channel(channel(), warehouses.clone());
        (ledger.clone(), AllocationPlanner::new(ledger, policy), variant, warehouses)
    }

    #[test]
    fn splits_across_warehouses_in_policy_order() {
        let (_, planner, variant, wh) = setup(&[(3, 0), (4, 1)]);
        let plan = planner
            .plan(&request(variant, 5), &country(), &channel(), ReservationMode::Enabled, Utc::now())
            .unwrap();

        let split: Vec<_> = plan.allocations.iter().map(|a| (a.warehouse_id, a.quantity)).collect();
        assert_eq!(split, vec![(wh[0], 3), (wh[1], 2)]);
        assert_eq!(plan.total(), 5);
    }

    #[test]
    fn shortage_reports_total_available() {
        let (_, planner, variant, _) = setup(&[(2, 0), (1, 1)]);
        let err = planner
            .plan(&request(variant, 5), &country(), &channel(), ReservationMode::Enabled, Utc::now())
            .unwrap_err();

        match err {
            AllocationError::InsufficientStock(s) => {
                assert_eq!(s.variant_id, variant);
                assert_eq!((s.requested, s.available), (5, 2));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn warehouses_without_a_stock_row_are_skipped() {
        let (ledger, _, variant, wh) = setup(&[(5, 0)]);
        let empty = WarehouseId::new();
        let policy = PriorityWarehousePolicy::new().with_channel(channel(), vec![empty, wh[0]]);
        let planner = AllocationPlanner::new(ledger, policy);

        let plan = planner
            .plan(&request(variant, 2), &country(), &channel(), ReservationMode::Enabled, Utc::now())
            .unwrap();
        assert_eq!(plan.allocations.len(), 1);
        assert_eq!(plan.allocations[0].warehouse_id, wh[0]);
    }

    #[test]
    fn active_foreign_reservations_reduce_availability() {
        let (ledger, planner, variant, wh) = setup(&[(5, 0)]);
        let now = Utc::now();
        ledger
            .reserve(
                &ReservationTarget::Stock(StockKey::new(wh[0], variant)),
                Reservation::new(CheckoutToken::new(), 4, now + Duration::minutes(5)),
            )
            .unwrap();
        ledger
            .reserve(
                &ReservationTarget::Stock(StockKey::new(wh[0], variant)),
                Reservation::new(CheckoutToken::new(), 1, now - Duration::minutes(5)),
            )
            .unwrap();

        let err = planner
            .plan(&request(variant, 2), &country(), &channel(), ReservationMode::Enabled, now)
            .unwrap_err();
        assert!(matches!(err, AllocationError::InsufficientStock(s) if s.available == 1));

        let plan = planner
            .plan(&request(variant, 2), &country(), &channel(), ReservationMode::Disabled, now)
            .unwrap();
        assert_eq!(plan.total(), 2);
    }

    #[test]
    fn own_reservations_count_as_available() {
        let (ledger, planner, variant, wh) = setup(&[(3, 0)]);
        let now = Utc::now();
        let mine = CheckoutToken::new();
        ledger
            .reserve(
                &ReservationTarget::Stock(StockKey::new(wh[0], variant)),
                Reservation::new(mine, 3, now + Duration::minutes(5)),
            )
            .unwrap();

        let mut req = request(variant, 3);
        req.owner = Some(mine);
        let plan = planner
            .plan(&req, &country(), &channel(), ReservationMode::Enabled, now)
            .unwrap();
        assert_eq!(plan.allocations[0].own_reserved, 3);
    }

    #[test]
    fn planning_does_not_mutate_the_ledger() {
        let (ledger, planner, variant, wh) = setup(&[(3, 0)]);
        planner
            .plan(&request(variant, 3), &country(), &channel(), ReservationMode::Enabled, Utc::now())
            .unwrap();
        let row = ledger.stock(&StockKey::new(wh[0], variant)).unwrap().unwrap();
        assert_eq!(row.record.quantity_allocated, 0);
    }

    proptest! {
        #[test]
        fn feasible_plans_sum_exactly_and_respect_availability(
            rows in proptest::collection::vec((0u32..50, 0u32..50), 1..6),
            requested in 1u32..150,
        ) {
            let rows: Vec<(u32, u32)> = rows
                .into_iter()
                .map(|(q, a)| (q.max(a), a.min(q.max(a))))
                .collect();
            let (ledger, planner, variant, wh) = setup(&rows);
            let total_free: u32 = rows.iter().map(|(q, a)| q - a).sum();

            match planner.plan(&request(variant, requested), &country(), &channel(), ReservationMode::Enabled, Utc::now()) {
                Ok(plan) => {
                    prop_assert!(requested <= total_free);
                    prop_assert_eq!(plan.total(), requested);
                    for planned in &plan.allocations {
                        let row = ledger.stock(&StockKey::new(planned.warehouse_id, variant)).unwrap().unwrap();
                        prop_assert!(planned.quantity > 0);
                        prop_assert!(planned.quantity <= row.record.unallocated());
                        prop_assert!(wh.contains(&planned.warehouse_id));
                    }
                }
                Err(AllocationError::InsufficientStock(s)) => {
                    prop_assert!(requested > total_free);
                    prop_assert_eq!(s.available, total_free);
                }
                Err(other) => prop_assert!(false, "unexpected error: {:?}", other),
            }
        }
    }
}
