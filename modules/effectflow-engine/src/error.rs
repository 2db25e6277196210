use std::any::Any;

use thiserror::Error;

use crate::effect::Member;
use crate::identity::Identity;

#[derive(Error, Debug)]
pub enum EngineError {
    /// An auto-recovered effect failed; it has been restarted.
    #[error("Effect \"{effect}\" threw an error: {error:#}")]
    EffectThrew { effect: String, error: anyhow::Error },

    /// A dispatching effect produced something that is not an action.
    #[error("Effect \"{effect}\" dispatched an invalid action ({reason}): {rendered}")]
    InvalidDispatch {
        effect: String,
        source_type: &'static str,
        property: String,
        member: Member,
        reason: &'static str,
        rendered: String,
    },

    /// An effect without auto-recovery failed and ended its identity's group.
    #[error("Effect \"{effect}\" failed without auto-recovery, group {identity} ended: {error:#}")]
    GroupFatal {
        identity: Identity,
        effect: String,
        error: anyhow::Error,
    },

    #[error("Effects runner is not running, registration of {source_type} rejected")]
    NotRunning { source_type: &'static str },

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Turn a caught panic payload into an effect error, so a panicking
/// pipeline takes the same recovery path as one that returned `Err`.
pub(crate) fn panic_error(payload: Box<dyn Any + Send>) -> anyhow::Error {
    let message = payload
        .downcast_ref::<&str>()
        .map(|message| message.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string());
    anyhow::anyhow!("panicked: {message}")
}
