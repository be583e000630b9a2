//! Sales orders domain module.
//!
//! Business rules for draft orders and their completion, implemented as
//! deterministic domain logic (no IO, no storage). External lookups such as
//! customer resolution are done by the caller and passed in via commands.

pub mod catalog;
pub mod created;
pub mod order;
pub mod party;

pub use catalog::{Channel, PreorderSettings, Variant};
pub use created::{AllocatedLine, OrderCreated};
pub use order::{
    AddLine, AttachCheckout, CompleteDraft, CreateDraftOrder, NormalizeShipping, Order,
    OrderCommand, OrderEvent, OrderLine, OrderStatus, RecordPayment, ResolveCustomer,
    SetBillingAddress, SetCustomer, SetShippingAddress, SetShippingMethod,
};
pub use party::{Address, CustomerRef, PaymentRef};
