//! Value object trait: equality by value, not identity.
//!
//! Value objects have **no identity**; two value objects holding the same
//! attributes are the same value (`Money`, `CountryCode`, `ChannelSlug`).

/// Marker trait for value objects.
///
/// Value objects are **immutable** and **compared by value**. To "modify" one,
/// build a new one.
///
/// ```ignore
/// let a = Money::new(100, "USD")?;
/// let b = Money::new(100, "USD")?;
/// assert_eq!(a, b);
/// ```
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
