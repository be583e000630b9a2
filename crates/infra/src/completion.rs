//! Draft order completion (application-level orchestration).
//!
//! ```text
//! load draft ─▶ resolve customer ─▶ normalize shipping ─▶ search document
//!      ─▶ Draft → Unfulfilled ─▶ allocate every line ─▶ save ─▶ publish OrderCreated
//! ```
//!
//! Every line is allocated even after an earlier one fails, so the caller gets
//! the full list of shortages in one response. What happens to the order and
//! to the lines that did allocate depends on [`ConsistencyMode`].

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{error, info, info_span, warn};

use stockline_core::{AggregateRoot, CountryCode, DomainError, ExpectedVersion, OrderId};
use stockline_events::{EventBus, EventEnvelope, execute};
use stockline_inventory::{
    AllocationError, Allocator, Shortage, StockLedger, WarehousePolicy,
};
use stockline_sales::{
    AllocatedLine, Channel, CompleteDraft, NormalizeShipping, Order, OrderCommand, OrderCreated,
    OrderStatus, ResolveCustomer,
};

use crate::config::{CompletionConfig, ConsistencyMode};
use crate::external::{CustomerDirectory, DirectoryError, SearchDocumentBuilder};
use crate::order_store::{OrderStore, OrderStoreError};

pub const ORDER_STREAM_TYPE: &str = "sales.order";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CompletionError {
    /// The order exists but is no longer a draft.
    #[error("order is not a draft (status: {status:?})")]
    InvalidState { status: OrderStatus },

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("{}", join_shortages(.shortages))]
    InsufficientStock { shortages: Vec<Shortage> },

    /// Availability changed under every failing line while it was committed.
    #[error("stock changed during allocation: {}", join_shortages(.shortages))]
    StockConflict { shortages: Vec<Shortage> },

    #[error("concurrency conflict: {0}")]
    Concurrency(String),

    #[error("order not found")]
    NotFound,

    #[error("storage failure: {0}")]
    Store(String),

    /// The order was committed but `OrderCreated` could not be published.
    #[error("publish failed: {0}")]
    Publish(String),
}

impl CompletionError {
    /// Shortages carried by a stock failure (empty for every other kind).
    pub fn shortages(&self) -> &[Shortage] {
        match self {
            CompletionError::InsufficientStock { shortages }
            | CompletionError::StockConflict { shortages } => shortages,
            _ => &[],
        }
    }

    fn from_line_failures(failures: Vec<AllocationError>) -> Self {
        let mut shortages = Vec::with_capacity(failures.len());
        let mut all_conflicts = true;

        for failure in failures {
            match failure {
                AllocationError::InsufficientStock(shortage) => {
                    all_conflicts = false;
                    shortages.push(shortage);
                }
                AllocationError::StockConflict(shortage) => shortages.push(shortage),
                AllocationError::Ledger(e) => return CompletionError::Store(e.to_string()),
            }
        }

        if all_conflicts {
            CompletionError::StockConflict { shortages }
        } else {
            CompletionError::InsufficientStock { shortages }
        }
    }
}

fn join_shortages(shortages: &[Shortage]) -> String {
    shortages
        .iter()
        .map(Shortage::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl From<DomainError> for CompletionError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg)
            | DomainError::InvalidId(msg)
            | DomainError::InvariantViolation(msg) => CompletionError::Validation(msg),
            DomainError::Conflict(msg) => CompletionError::Concurrency(msg),
            DomainError::NotFound => CompletionError::NotFound,
        }
    }
}

impl From<DirectoryError> for CompletionError {
    fn from(value: DirectoryError) -> Self {
        CompletionError::Store(value.to_string())
    }
}

impl From<OrderStoreError> for CompletionError {
    fn from(value: OrderStoreError) -> Self {
        match value {
            OrderStoreError::Concurrency(msg) => CompletionError::Concurrency(msg),
            other => CompletionError::Store(other.to_string()),
        }
    }
}

/// Result of a successful completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedOrder {
    pub order: Order,
    pub lines: Vec<AllocatedLine>,
}

/// Drives a draft order to `Unfulfilled` and allocates its lines.
///
/// All collaborators are injected; the completer holds no state of its own
/// and can be shared across threads.
pub struct DraftOrderCompleter<S, C, D, L, P, B> {
    store: S,
    customers: C,
    search: D,
    allocator: Allocator<L, P>,
    bus: B,
    config: CompletionConfig,
}

impl<S, C, D, L, P, B> DraftOrderCompleter<S, C, D, L, P, B>
where
    S: OrderStore,
    C: CustomerDirectory,
    D: SearchDocumentBuilder,
    L: StockLedger + Clone,
    P: WarehousePolicy,
    B: EventBus<EventEnvelope<OrderCreated>>,
{
    pub fn new(
        store: S,
        customers: C,
        search: D,
        ledger: L,
        policy: P,
        bus: B,
        config: CompletionConfig,
    ) -> Self {
        Self {
            store,
            customers,
            search,
            allocator: Allocator::new(ledger, policy),
            bus,
            config,
        }
    }

    pub fn complete(&self, order_id: OrderId) -> Result<CompletedOrder, CompletionError> {
        self.complete_at(order_id, Utc::now())
    }

    /// Complete as of `now` (reservation expiry and preorder end dates are
    /// evaluated against it).
    pub fn complete_at(
        &self,
        order_id: OrderId,
        now: DateTime<Utc>,
    ) -> Result<CompletedOrder, CompletionError> {
        let span = info_span!(
            "complete_draft_order",
            %order_id,
            consistency = ?self.config.consistency
        );
        let _guard = span.enter();

        // 1) Load and gate on status
        let loaded = self.store.load(order_id)?.ok_or(CompletionError::NotFound)?;
        if !loaded.is_draft() {
            warn!(status = ?loaded.status(), "order is not a draft");
            return Err(CompletionError::InvalidState {
                status: loaded.status(),
            });
        }
        let loaded_version = loaded.version();

        // 2) Country and channel for warehouse selection
        let channel = loaded
            .channel()
            .cloned()
            .ok_or_else(|| CompletionError::Validation("order has no channel".to_string()))?;
        let country = self.resolve_country(&loaded)?;

        // 3) Validate before touching anything
        loaded.validate_for_completion()?;

        // 4-7) Stage the order changes
        let staged = self.stage(loaded, now)?;

        if self.config.consistency == ConsistencyMode::Partial {
            self.store
                .save(&staged, ExpectedVersion::Exact(loaded_version))?;
        }

        // 8) Allocate every line
        let (lines, failures) = self.allocate_lines(&staged, &country, &channel, now);

        // 9) Report every shortage at once
        if !failures.is_empty() {
            let err = CompletionError::from_line_failures(failures);
            warn!(
                shortages = err.shortages().len(),
                error = %err,
                "draft order completion failed on allocation"
            );
            if self.config.consistency == ConsistencyMode::Atomic {
                self.release_lines(&lines);
            }
            return Err(err);
        }

        if self.config.consistency == ConsistencyMode::Atomic {
            if let Err(e) = self
                .store
                .save(&staged, ExpectedVersion::Exact(loaded_version))
            {
                warn!(error = %e, "order changed during completion, releasing allocations");
                self.release_lines(&lines);
                return Err(e.into());
            }
        }

        // 10) Publish after commit
        let event = OrderCreated::from_draft(staged.clone(), channel, lines.clone(), now);
        let envelope = EventEnvelope::wrap(order_id, ORDER_STREAM_TYPE, staged.version(), event);
        self.bus
            .publish(envelope)
            .map_err(|e| CompletionError::Publish(format!("{e:?}")))?;

        info!(lines = lines.len(), version = staged.version(), "draft order completed");

        Ok(CompletedOrder {
            order: staged,
            lines,
        })
    }

    fn resolve_country(&self, order: &Order) -> Result<CountryCode, CompletionError> {
        order
            .country()
            .or_else(|| self.config.default_country.clone())
            .ok_or_else(|| {
                CompletionError::Validation("no country available for warehouse selection".into())
            })
    }

    /// Apply customer resolution, shipping normalization, the search document
    /// and the status change to a copy of the loaded order.
    fn stage(&self, mut order: Order, now: DateTime<Utc>) -> Result<Order, CompletionError> {
        let order_id = order.id_typed();

        let found = match (order.customer(), order.user_email()) {
            (None, Some(email)) => self.customers.find_by_email(email).map_err(|e| {
                error!(error = %e, "customer lookup failed");
                CompletionError::from(e)
            })?,
            _ => None,
        };
        execute(
            &mut order,
            &OrderCommand::ResolveCustomer(ResolveCustomer {
                order_id,
                found,
                occurred_at: now,
            }),
        )?;

        execute(
            &mut order,
            &OrderCommand::NormalizeShipping(NormalizeShipping {
                order_id,
                occurred_at: now,
            }),
        )?;

        let search_document = self.search.build(&order);
        execute(
            &mut order,
            &OrderCommand::CompleteDraft(CompleteDraft {
                order_id,
                search_document,
                occurred_at: now,
            }),
        )?;

        Ok(order)
    }

    fn allocate_lines(
        &self,
        order: &Order,
        country: &CountryCode,
        channel: &Channel,
        now: DateTime<Utc>,
    ) -> (Vec<AllocatedLine>, Vec<AllocationError>) {
        let mode = self.config.reservation_mode();
        let owner = order.checkout_token();

        let mut allocated = Vec::with_capacity(order.lines().len());
        let mut failures = Vec::new();

        for line in order.lines() {
            let request = line.allocation_request(owner, now);
            match self
                .allocator
                .allocate_line(&request, country, &channel.slug, mode, now)
            {
                Ok(allocations) => allocated.push(AllocatedLine {
                    line: line.clone(),
                    allocations,
                }),
                Err(e) => failures.push(e),
            }
        }

        (allocated, failures)
    }

    fn release_lines(&self, lines: &[AllocatedLine]) {
        for line in lines {
            if let Err(e) = self.allocator.release(&line.allocations) {
                error!(line_id = %line.line.id, error = %e, "failed to release allocation");
            }
        }
    }
}
