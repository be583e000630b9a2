//! Domain events and their distribution.
//!
//! Events are produced by aggregates and services after a change has been
//! committed, wrapped in an [`EventEnvelope`] and fanned out over an
//! [`EventBus`] to downstream consumers (notifications, analytics).

pub mod bus;
pub mod envelope;
pub mod event;
pub mod handler;
pub mod in_memory_bus;

pub use bus::{EventBus, Subscription};
pub use envelope::EventEnvelope;
pub use event::Event;
pub use handler::execute;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
