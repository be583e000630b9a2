//! Inventory allocation engine.
//!
//! Business rules for turning requested line quantities into committed stock
//! allocations across warehouses, honouring time-limited reservations, plus a
//! separate preorder capacity pool. Storage is behind [`StockLedger`]; the
//! in-memory ledger locks individual (warehouse, variant) rows so unrelated
//! allocations never contend.

pub mod allocator;
pub mod applier;
pub mod ledger;
pub mod planner;
pub mod policy;
pub mod preorder;
pub mod request;
pub mod reservation;
pub mod shortage;
pub mod stock;

pub use allocator::Allocator;
pub use applier::{Allocation, AllocationApplier, AllocationSource};
pub use ledger::{InMemoryStockLedger, LedgerError, RowTxn, StockLedger};
pub use planner::{AllocationPlan, AllocationPlanner, PlannedAllocation};
pub use policy::{PriorityWarehousePolicy, WarehousePolicy};
pub use preorder::{PreorderAllocator, PreorderKey, PreorderPool, PreorderRow};
pub use request::{AllocationRequest, AllocationStrategy, ReservationMode};
pub use reservation::{
    Availability, CheckoutToken, Reservation, ReservationTarget, Reservations,
};
pub use shortage::{AllocationError, Shortage};
pub use stock::{StockKey, StockRecord, StockRow};
