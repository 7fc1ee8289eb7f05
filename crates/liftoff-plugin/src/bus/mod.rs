//! Event bus: conditional publish/subscribe with per-event memory.

pub mod condition;
pub mod event_bus;
pub mod events;

pub use condition::{Condition, ConditionKind};
pub use event_bus::{EventBus, Listener, ListenerContext};
