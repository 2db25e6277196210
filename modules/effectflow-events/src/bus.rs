//! ActionBus: broadcast of previously dispatched actions.
//!
//! Subscribers only see actions published after they subscribed. A slow
//! subscriber that falls more than `capacity` actions behind skips the
//! oldest ones and keeps going; the bus itself never blocks publishers.

use std::pin::Pin;

use futures::{Stream, StreamExt};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::warn;

use crate::types::Action;

pub type ActionStream = Pin<Box<dyn Stream<Item = Action> + Send>>;

// ---------------------------------------------------------------------------
// ActionBus
// ---------------------------------------------------------------------------

/// Always-live broadcast of dispatched actions. Cheap to clone; every clone
/// publishes into the same channel.
#[derive(Clone)]
pub struct ActionBus {
    sender: broadcast::Sender<Action>,
}

impl ActionBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish an action to every current subscriber. Returns how many
    /// subscribers received it. Publishing with no subscribers is not an error.
    pub fn publish(&self, action: Action) -> usize {
        self.sender.send(action).unwrap_or(0)
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Subscribe to every action published from now on. The stream only ends
    /// once every clone of the bus has been dropped.
    pub fn subscribe(&self) -> ActionStream {
        let receiver = self.sender.subscribe();
        Box::pin(futures::stream::unfold(receiver, |mut receiver| async move {
            loop {
                match receiver.recv().await {
                    Ok(action) => return Some((action, receiver)),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Action subscriber lagged, oldest actions skipped");
                    }
                    Err(RecvError::Closed) => return None,
                }
            }
        }))
    }

    /// Subscribe with a type filter. Only delivers actions whose `type` is
    /// one of `action_types`.
    pub fn subscribe_filtered(&self, action_types: &[&str]) -> ActionStream {
        of_type(self.subscribe(), action_types)
    }
}

impl Default for ActionBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

/// Keep only actions whose `type` is one of `action_types`.
pub fn of_type<S>(actions: S, action_types: &[&str]) -> ActionStream
where
    S: Stream<Item = Action> + Send + 'static,
{
    let wanted: Vec<String> = action_types.iter().map(|t| t.to_string()).collect();
    Box::pin(actions.filter(move |action| {
        let keep = wanted.iter().any(|t| t == action.action_type());
        futures::future::ready(keep)
    }))
}
