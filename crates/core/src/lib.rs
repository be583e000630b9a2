//! `stockline-core` — domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod aggregate;
pub mod code;
pub mod entity;
pub mod error;
pub mod id;
pub mod money;
pub mod value_object;

pub use aggregate::{Aggregate, AggregateRoot, ExpectedVersion};
pub use code::{ChannelSlug, CountryCode};
pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::{
    ChannelId, CustomerId, LineId, OrderId, PaymentId, ReservationId, VariantId, WarehouseId,
};
pub use money::Money;
pub use value_object::ValueObject;
