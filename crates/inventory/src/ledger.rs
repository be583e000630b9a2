//! Stock ledger boundary: counters, reservations and row-scoped transactions.
//!
//! Every mutation runs inside a transaction scoped to the rows it touches.
//! Rows are locked in key order; the closure works on copies which are written
//! back only when it returns `Ok`, so a failed line leaves no trace.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, RwLock};

use thiserror::Error;

use crate::preorder::{PreorderKey, PreorderPool, PreorderRow};
use crate::reservation::{Reservation, ReservationTarget};
use crate::stock::{StockKey, StockRecord, StockRow};

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("unknown stock row: {0}")]
    UnknownStock(StockKey),

    #[error("unknown preorder pool: {0}")]
    UnknownPreorderPool(PreorderKey),

    #[error("invariant violated: {0}")]
    Invariant(String),

    #[error("ledger lock poisoned")]
    Poisoned,
}

/// Working copies of the rows locked by one transaction, sorted by key.
#[derive(Debug)]
pub struct RowTxn<K, R> {
    rows: Vec<(K, R)>,
}

impl<K: Ord, R> RowTxn<K, R> {
    pub fn get(&self, key: &K) -> Option<&R> {
        self.rows
            .binary_search_by(|(k, _)| k.cmp(key))
            .ok()
            .map(|idx| &self.rows[idx].1)
    }

    pub fn get_mut(&mut self, key: &K) -> Option<&mut R> {
        match self.rows.binary_search_by(|(k, _)| k.cmp(key)) {
            Ok(idx) => Some(&mut self.rows[idx].1),
            Err(_) => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &R)> {
        self.rows.iter().map(|(k, r)| (k, r))
    }
}

/// Append-free row storage with per-row locks.
///
/// The map lock is only held to look up or insert row handles; contention on
/// a row never blocks work on another row.
#[derive(Debug)]
struct RowTable<K, R> {
    rows: RwLock<HashMap<K, Arc<Mutex<R>>>>,
}

impl<K, R> Default for RowTable<K, R> {
    fn default() -> Self {
        Self {
            rows: RwLock::new(HashMap::new()),
        }
    }
}

impl<K, R> RowTable<K, R>
where
    K: Clone + Ord + Hash,
    R: Clone,
{
    fn handle(&self, key: &K) -> Result<Option<Arc<Mutex<R>>>, LedgerError> {
        let rows = self.rows.read().map_err(|_| LedgerError::Poisoned)?;
        Ok(rows.get(key).cloned())
    }

    fn get(&self, key: &K) -> Result<Option<R>, LedgerError> {
        match self.handle(key)? {
            Some(row) => {
                let guard = row.lock().map_err(|_| LedgerError::Poisoned)?;
                Ok(Some(guard.clone()))
            }
            None => Ok(None),
        }
    }

    /// Insert the row if missing, then run `update` under its lock.
    fn upsert(
        &self,
        key: K,
        insert: impl FnOnce() -> R,
        update: impl FnOnce(&mut R) -> Result<(), LedgerError>,
    ) -> Result<(), LedgerError> {
        let row = {
            let mut rows = self.rows.write().map_err(|_| LedgerError::Poisoned)?;
            rows.entry(key)
                .or_insert_with(|| Arc::new(Mutex::new(insert())))
                .clone()
        };
        let mut guard = row.lock().map_err(|_| LedgerError::Poisoned)?;
        let mut working = guard.clone();
        update(&mut working)?;
        *guard = working;
        Ok(())
    }

    fn transact<T, E, F>(
        &self,
        keys: &[K],
        missing: impl Fn(&K) -> LedgerError,
        f: F,
    ) -> Result<T, E>
    where
        E: From<LedgerError>,
        F: FnOnce(&mut RowTxn<K, R>) -> Result<T, E>,
    {
        let mut keys = keys.to_vec();
        keys.sort();
        keys.dedup();

        let handles = {
            let rows = self.rows.read().map_err(|_| LedgerError::Poisoned)?;
            keys.iter()
                .map(|k| rows.get(k).cloned().ok_or_else(|| missing(k)))
                .collect::<Result<Vec<_>, LedgerError>>()?
        };

        // Lock in key order so overlapping transactions cannot deadlock.
        let mut guards = Vec::with_capacity(handles.len());
        for handle in &handles {
            guards.push(handle.lock().map_err(|_| LedgerError::Poisoned)?);
        }

        let mut txn = RowTxn {
            rows: keys
                .into_iter()
                .zip(guards.iter().map(|g| (**g).clone()))
                .collect(),
        };

        let out = f(&mut txn)?;

        for (guard, (_, row)) in guards.iter_mut().zip(txn.rows) {
            **guard = row;
        }
        Ok(out)
    }
}

/// Storage of stock rows, preorder pools and the reservations against them.
pub trait StockLedger: Send + Sync {
    /// Snapshot of one stock row (record + reservations).
    fn stock(&self, key: &StockKey) -> Result<Option<StockRow>, LedgerError>;

    /// Create the row or set its on-hand quantity.
    ///
    /// Fails if the new quantity would drop below what is already allocated.
    fn set_stock_quantity(&self, key: StockKey, quantity: u32) -> Result<(), LedgerError>;

    /// Snapshot of one preorder pool.
    fn preorder(&self, key: &PreorderKey) -> Result<Option<PreorderRow>, LedgerError>;

    /// Create the pool or change its threshold (`None` = unlimited).
    fn set_preorder_threshold(
        &self,
        key: PreorderKey,
        threshold: Option<u32>,
    ) -> Result<(), LedgerError>;

    /// Record a checkout hold against an existing row or pool.
    fn reserve(
        &self,
        target: &ReservationTarget,
        reservation: Reservation,
    ) -> Result<(), LedgerError>;

    /// Run `f` with exclusive access to exactly the rows in `keys`.
    fn transact_stock<T, E, F>(&self, keys: &[StockKey], f: F) -> Result<T, E>
    where
        E: From<LedgerError>,
        F: FnOnce(&mut RowTxn<StockKey, StockRow>) -> Result<T, E>;

    /// Run `f` with exclusive access to one preorder pool.
    fn transact_preorder<T, E, F>(&self, key: &PreorderKey, f: F) -> Result<T, E>
    where
        E: From<LedgerError>,
        F: FnOnce(&mut PreorderRow) -> Result<T, E>;
}

impl<L> StockLedger for Arc<L>
where
    L: StockLedger + ?Sized,
{
    fn stock(&self, key: &StockKey) -> Result<Option<StockRow>, LedgerError> {
        (**self).stock(key)
    }

    fn set_stock_quantity(&self, key: StockKey, quantity: u32) -> Result<(), LedgerError> {
        (**self).set_stock_quantity(key, quantity)
    }

    fn preorder(&self, key: &PreorderKey) -> Result<Option<PreorderRow>, LedgerError> {
        (**self).preorder(key)
    }

    fn set_preorder_threshold(
        &self,
        key: PreorderKey,
        threshold: Option<u32>,
    ) -> Result<(), LedgerError> {
        (**self).set_preorder_threshold(key, threshold)
    }

    fn reserve(
        &self,
        target: &ReservationTarget,
        reservation: Reservation,
    ) -> Result<(), LedgerError> {
        (**self).reserve(target, reservation)
    }

    fn transact_stock<T, E, F>(&self, keys: &[StockKey], f: F) -> Result<T, E>
    where
        E: From<LedgerError>,
        F: FnOnce(&mut RowTxn<StockKey, StockRow>) -> Result<T, E>,
    {
        (**self).transact_stock(keys, f)
    }

    fn transact_preorder<T, E, F>(&self, key: &PreorderKey, f: F) -> Result<T, E>
    where
        E: From<LedgerError>,
        F: FnOnce(&mut PreorderRow) -> Result<T, E>,
    {
        (**self).transact_preorder(key, f)
    }
}

/// In-memory ledger.
///
/// Intended for tests/dev and single-process deployments.
#[derive(Debug, Default)]
pub struct InMemoryStockLedger {
    stock: RowTable<StockKey, StockRow>,
    preorder: RowTable<PreorderKey, PreorderRow>,
}

impl InMemoryStockLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StockLedger for InMemoryStockLedger {
    fn stock(&self, key: &StockKey) -> Result<Option<StockRow>, LedgerError> {
        self.stock.get(key)
    }

    fn set_stock_quantity(&self, key: StockKey, quantity: u32) -> Result<(), LedgerError> {
        self.stock.upsert(
            key,
            || StockRow::new(StockRecord::new(key, 0)),
            |row| {
                if quantity < row.record.quantity_allocated {
                    return Err(LedgerError::Invariant(format!(
                        "{key}: quantity {quantity} below allocated {}",
                        row.record.quantity_allocated
                    )));
                }
                row.record.quantity = quantity;
                Ok(())
            },
        )
    }

    fn preorder(&self, key: &PreorderKey) -> Result<Option<PreorderRow>, LedgerError> {
        self.preorder.get(key)
    }

    fn set_preorder_threshold(
        &self,
        key: PreorderKey,
        threshold: Option<u32>,
    ) -> Result<(), LedgerError> {
        let insert_key = key.clone();
        self.preorder.upsert(
            key,
            move || PreorderRow::new(PreorderPool::new(insert_key, None)),
            |row| {
                if let Some(limit) = threshold {
                    if limit < row.pool.quantity_allocated {
                        return Err(LedgerError::Invariant(format!(
                            "{}: threshold {limit} below allocated {}",
                            row.pool.key, row.pool.quantity_allocated
                        )));
                    }
                }
                row.pool.quantity_threshold = threshold;
                Ok(())
            },
        )
    }

    fn reserve(
        &self,
        target: &ReservationTarget,
        reservation: Reservation,
    ) -> Result<(), LedgerError> {
        match target {
            ReservationTarget::Stock(key) => {
                self.transact_stock(std::slice::from_ref(key), |txn| {
                    let row = txn
                        .get_mut(key)
                        .ok_or(LedgerError::UnknownStock(*key))?;
                    row.reservations.add(reservation);
                    Ok(())
                })
            }
            ReservationTarget::Preorder(key) => self.transact_preorder(key, |row| {
                row.reservations.add(reservation);
                Ok(())
            }),
        }
    }

    fn transact_stock<T, E, F>(&self, keys: &[StockKey], f: F) -> Result<T, E>
    where
        E: From<LedgerError>,
        F: FnOnce(&mut RowTxn<StockKey, StockRow>) -> Result<T, E>,
    {
        self.stock
            .transact(keys, |k| LedgerError::UnknownStock(*k), f)
    }

    fn transact_preorder<T, E, F>(&self, key: &PreorderKey, f: F) -> Result<T, E>
    where
        E: From<LedgerError>,
        F: FnOnce(&mut PreorderRow) -> Result<T, E>,
    {
        self.preorder.transact(
            std::slice::from_ref(key),
            |k| LedgerError::UnknownPreorderPool(k.clone()),
            |txn| {
                let row = txn
                    .get_mut(key)
                    .ok_or_else(|| LedgerError::UnknownPreorderPool(key.clone()))?;
                f(row)
            },
        )
    }
}
