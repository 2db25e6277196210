//! Output validation: only well-formed actions reach the dispatch sink.

use effectflow_events::Action;
use serde::Serialize;

use crate::error::EngineError;
use crate::identity::Identity;
use crate::notification::{Notification, NotificationKind};
use crate::traits::ErrorReporter;

/// Rendered in place of a value that cannot itself be serialized.
pub const UNRENDERABLE_PLACEHOLDER: &str = "[unrenderable value]";

/// What to do with one notification.
#[derive(Debug)]
pub enum Verdict {
    /// A valid action to forward.
    Dispatch(Action),
    /// Nothing to forward (completion, or an invalid value already reported).
    Skip,
    /// An unrecovered effect error, already reported. Ends the group.
    Fatal,
}

/// Check one notification, reporting anything malformed or failed.
pub fn verify_output(
    notification: Notification,
    reporter: &dyn ErrorReporter,
    render_limit: usize,
) -> Verdict {
    let effect = notification.effect_name();
    match notification.kind {
        NotificationKind::Next(value) => match Action::try_from(value) {
            Ok(action) => Verdict::Dispatch(action),
            Err(invalid) => {
                reporter.report(EngineError::InvalidDispatch {
                    effect,
                    source_type: notification.source_type,
                    property: notification.property,
                    member: notification.member,
                    reason: invalid.reason,
                    rendered: render_value(&invalid.value, render_limit),
                });
                Verdict::Skip
            }
        },
        NotificationKind::Error(error) => {
            reporter.report(EngineError::GroupFatal {
                identity: Identity::of(notification.source.as_ref()),
                effect,
                error,
            });
            Verdict::Fatal
        }
        NotificationKind::Complete => Verdict::Skip,
    }
}

/// Best-effort JSON rendering for diagnostics, cut to `limit` characters.
/// Never fails: unserializable values render as [`UNRENDERABLE_PLACEHOLDER`].
pub fn render_value<T: Serialize + ?Sized>(value: &T, limit: usize) -> String {
    let mut rendered = match serde_json::to_string(value) {
        Ok(rendered) => rendered,
        Err(_) => return UNRENDERABLE_PLACEHOLDER.to_string(),
    };
    if let Some((cut, _)) = rendered.char_indices().nth(limit) {
        rendered.truncate(cut);
        rendered.push_str("...");
    }
    rendered
}
