//! Per-line allocation entry point: dispatch on the line's strategy.

use chrono::{DateTime, Utc};

use stockline_core::{ChannelSlug, CountryCode};

use crate::applier::{Allocation, AllocationApplier, AllocationSource};
use crate::ledger::StockLedger;
use crate::planner::AllocationPlanner;
use crate::policy::WarehousePolicy;
use crate::preorder::PreorderAllocator;
use crate::request::{AllocationRequest, AllocationStrategy, ReservationMode};
use crate::shortage::AllocationError;

/// Stock path (planner + applier) and preorder path behind one call.
#[derive(Debug, Clone)]
pub struct Allocator<L, P> {
    planner: AllocationPlanner<L, P>,
    applier: AllocationApplier<L>,
    preorder: PreorderAllocator<L>,
}

impl<L, P> Allocator<L, P>
where
    L: StockLedger + Clone,
    P: WarehousePolicy,
{
    pub fn new(ledger: L, policy: P) -> Self {
        Self {
            planner: AllocationPlanner::new(ledger.clone(), policy),
            applier: AllocationApplier::new(ledger.clone()),
            preorder: PreorderAllocator::new(ledger),
        }
    }

    /// Allocate one line. Each line is its own unit of work: on error nothing
    /// of this line is committed.
    pub fn allocate_line(
        &self,
        request: &AllocationRequest,
        country: &CountryCode,
        channel: &ChannelSlug,
        mode: ReservationMode,
        now: DateTime<Utc>,
    ) -> Result<Vec<Allocation>, AllocationError> {
        match request.strategy {
            AllocationStrategy::Skip => Ok(Vec::new()),
            AllocationStrategy::Preorder => self
                .preorder
                .allocate_preorder(request, channel, mode, now)
                .map(|allocation| vec![allocation]),
            AllocationStrategy::Stock => {
                let plan = self.planner.plan(request, country, channel, mode, now)?;
                self.applier.apply(&plan, now)
            }
        }
    }

    /// Compensate previously committed allocations of any source.
    pub fn release(&self, allocations: &[Allocation]) -> Result<(), AllocationError> {
        let (warehouse, preorder): (Vec<Allocation>, Vec<Allocation>) = allocations
            .iter()
            .cloned()
            .partition(|a| matches!(a.source, AllocationSource::Warehouse(_)));

        self.applier.release(&warehouse)?;
        for allocation in &preorder {
            self.preorder.release(allocation)?;
        }
        Ok(())
    }
}
