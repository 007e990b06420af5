//! In-process topic-based publish/subscribe bus.

pub mod bus;
pub mod event;

pub use bus::{EventBus, Subscription};
pub use event::Event;
