//! `syncgate-events` — change-feed distribution plumbing.
//!
//! A small pub/sub layer used to push record changes from the job store to
//! interactive subscribers (SSE streams, client reconcilers).

pub mod bus;
pub mod in_memory_bus;
pub mod tenant;

pub use bus::{EventBus, Subscription};
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
pub use tenant::TenantScoped;
