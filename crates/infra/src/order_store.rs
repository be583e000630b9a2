//! Order persistence (latest snapshot per order, optimistic concurrency).

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use thiserror::Error;

use stockline_core::{AggregateRoot, ExpectedVersion, OrderId};
use stockline_sales::Order;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OrderStoreError {
    #[error("concurrency conflict: {0}")]
    Concurrency(String),

    #[error("order store lock poisoned")]
    Poisoned,
}

/// Storage of order snapshots.
///
/// `save` compares `expected` with the version of the currently stored
/// snapshot (0 when absent) and replaces it only on a match.
pub trait OrderStore: Send + Sync {
    fn load(&self, order_id: OrderId) -> Result<Option<Order>, OrderStoreError>;

    fn save(&self, order: &Order, expected: ExpectedVersion) -> Result<(), OrderStoreError>;
}

impl<S> OrderStore for Arc<S>
where
    S: OrderStore + ?Sized,
{
    fn load(&self, order_id: OrderId) -> Result<Option<Order>, OrderStoreError> {
        (**self).load(order_id)
    }

    fn save(&self, order: &Order, expected: ExpectedVersion) -> Result<(), OrderStoreError> {
        (**self).save(order, expected)
    }
}

/// In-memory order store.
///
/// Intended for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryOrderStore {
    orders: RwLock<HashMap<OrderId, Order>>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl OrderStore for InMemoryOrderStore {
    fn load(&self, order_id: OrderId) -> Result<Option<Order>, OrderStoreError> {
        let orders = self.orders.read().map_err(|_| OrderStoreError::Poisoned)?;
        Ok(orders.get(&order_id).cloned())
    }

    fn save(&self, order: &Order, expected: ExpectedVersion) -> Result<(), OrderStoreError> {
        let mut orders = self.orders.write().map_err(|_| OrderStoreError::Poisoned)?;

        let current = orders.get(&order.id_typed()).map_or(0, |o| o.version());
        expected
            .check(current)
            .map_err(|e| OrderStoreError::Concurrency(e.to_string()))?;

        orders.insert(order.id_typed(), order.clone());
        Ok(())
    }
}
