//! Core traits for the effects engine.

use effectflow_events::Action;

use crate::effect::EffectDef;
use crate::error::EngineError;
use crate::notification::NotificationStream;

/// A registered instance that owns effects.
///
/// `declaring_type` and `effects` are required; the lifecycle hooks are
/// optional and default to "not present".
pub trait EffectSource: Send + Sync + 'static {
    /// Stable type token. Two sources with the same token and no `identify`
    /// override share an identity.
    fn declaring_type(&self) -> &'static str;

    /// Ordered effect declarations. Must be stable for the source's lifetime.
    fn effects(&self) -> Vec<EffectDef>;

    /// Custom identity key, combined with `declaring_type`.
    fn identify(&self) -> Option<String> {
        None
    }

    /// One-shot startup action, dispatched when this source's identity is
    /// first admitted in a runner session.
    fn init_action(&self) -> Option<Action> {
        None
    }

    /// Supervise the resolved stream. The returned stream replaces it.
    fn run_effects(&self, resolved: NotificationStream) -> NotificationStream {
        resolved
    }
}

/// Accepts validated actions. Must not panic.
pub trait DispatchSink: Send + Sync {
    fn dispatch(&self, action: Action);
}

/// Receives engine diagnostics. Fire-and-forget; must not panic.
pub trait ErrorReporter: Send + Sync {
    fn report(&self, error: EngineError);
}
