//! Reservation index: time-bounded holds on stock or preorder capacity.
//!
//! Reservations are created by checkout flows and live next to the row they
//! target, so reading and consuming them happens under the same lock as the
//! stock counters they shadow.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use stockline_core::ReservationId;

use crate::preorder::PreorderKey;
use crate::request::ReservationMode;
use crate::stock::StockKey;

/// Owner reference of a reservation: the checkout that placed the hold.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CheckoutToken(Uuid);

impl CheckoutToken {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for CheckoutToken {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for CheckoutToken {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// What a reservation holds quantity against.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReservationTarget {
    Stock(StockKey),
    Preorder(PreorderKey),
}

/// A hold of `quantity` units until `reserved_until`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: ReservationId,
    pub owner: CheckoutToken,
    pub quantity: u32,
    pub reserved_until: DateTime<Utc>,
}

impl Reservation {
    pub fn new(owner: CheckoutToken, quantity: u32, reserved_until: DateTime<Utc>) -> Self {
        Self {
            id: ReservationId::new(),
            owner,
            quantity,
            reserved_until,
        }
    }

    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.reserved_until > now
    }
}

/// Reservations attached to one stock row or preorder pool.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reservations {
    entries: Vec<Reservation>,
}

impl Reservations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, reservation: Reservation) {
        if reservation.quantity > 0 {
            self.entries.push(reservation);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Reservation> {
        self.entries.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Active quantity held by checkouts other than `owner`.
    pub fn foreign_active(&self, now: DateTime<Utc>, owner: Option<CheckoutToken>) -> u32 {
        self.entries
            .iter()
            .filter(|r| r.is_active(now) && Some(r.owner) != owner)
            .fold(0u32, |acc, r| acc.saturating_add(r.quantity))
    }

    /// Active quantity held by `owner` itself.
    pub fn owned_active(&self, now: DateTime<Utc>, owner: Option<CheckoutToken>) -> u32 {
        let Some(owner) = owner else {
            return 0;
        };
        self.entries
            .iter()
            .filter(|r| r.is_active(now) && r.owner == owner)
            .fold(0u32, |acc, r| acc.saturating_add(r.quantity))
    }

    /// Drop expired holds. Returns how many were removed.
    pub fn prune_expired(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|r| r.is_active(now));
        before - self.entries.len()
    }

    /// Consume up to `quantity` units of `owner`'s active holds, earliest
    /// expiry first. Returns the consumed portions (for [`Self::restore`]).
    pub fn consume(
        &mut self,
        owner: CheckoutToken,
        quantity: u32,
        now: DateTime<Utc>,
    ) -> Vec<Reservation> {
        let mut consumed = Vec::new();
        let mut remaining = quantity;

        let mut order: Vec<usize> = (0..self.entries.len())
            .filter(|&i| self.entries[i].owner == owner && self.entries[i].is_active(now))
            .collect();
        order.sort_by_key(|&i| self.entries[i].reserved_until);

        for i in order {
            if remaining == 0 {
                break;
            }
            let entry = &mut self.entries[i];
            let take = remaining.min(entry.quantity);
            entry.quantity -= take;
            remaining -= take;
            consumed.push(Reservation {
                quantity: take,
                ..entry.clone()
            });
        }

        self.entries.retain(|r| r.quantity > 0);
        consumed
    }

    /// Put previously consumed portions back.
    pub fn restore(&mut self, consumed: &[Reservation]) {
        for portion in consumed {
            match self.entries.iter_mut().find(|r| r.id == portion.id) {
                Some(existing) => existing.quantity = existing.quantity.saturating_add(portion.quantity),
                None => self.entries.push(portion.clone()),
            }
        }
    }
}

/// Quantity an order may allocate from one row.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Availability {
    /// Units allocatable by this order (includes its own holds).
    pub free: u32,
    /// Portion of `free` covered by the order's own active holds.
    pub own_reserved: u32,
}

impl Availability {
    /// `unallocated` is the row's quantity not yet allocated to any order.
    pub fn compute(
        unallocated: u32,
        reservations: &Reservations,
        mode: ReservationMode,
        owner: Option<CheckoutToken>,
        now: DateTime<Utc>,
    ) -> Self {
        if !mode.is_enabled() {
            return Self {
                free: unallocated,
                own_reserved: 0,
            };
        }
        let free = unallocated.saturating_sub(reservations.foreign_active(now, owner));
        let own_reserved = reservations.owned_active(now, owner).min(free);
        Self { free, own_reserved }
    }
}
