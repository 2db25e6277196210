//! Action vocabulary shared by the effects engine and its consumers.
//!
//! An [`Action`] is a JSON object carrying a string `type` member. The
//! [`ActionBus`] rebroadcasts every dispatched action to any number of
//! subscribers, which is how effects react to each other.

pub mod bus;
pub mod types;

pub use bus::{of_type, ActionBus, ActionStream};
pub use types::{Action, InvalidAction};
