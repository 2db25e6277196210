//! Captured effect emissions.
//!
//! Every value, error and completion of an effect is wrapped in a
//! [`Notification`] so that one effect ending does not structurally end the
//! merge it is part of.

use std::fmt;
use std::sync::Arc;

use futures::stream::BoxStream;
use serde_json::Value;

use crate::effect::{effect_name, Member};
use crate::traits::EffectSource;

pub type NotificationStream = BoxStream<'static, Notification>;

pub enum NotificationKind {
    Next(Value),
    Error(anyhow::Error),
    Complete,
}

pub struct Notification {
    pub source: Arc<dyn EffectSource>,
    pub source_type: &'static str,
    pub property: String,
    pub member: Member,
    pub kind: NotificationKind,
}

impl Notification {
    pub fn new(
        source: Arc<dyn EffectSource>,
        property: impl Into<String>,
        member: Member,
        kind: NotificationKind,
    ) -> Self {
        let source_type = source.declaring_type();
        Self {
            source,
            source_type,
            property: property.into(),
            member,
            kind,
        }
    }

    /// `Type.property()` or `Type.property`.
    pub fn effect_name(&self) -> String {
        effect_name(self.source_type, &self.property, self.member)
    }

    pub fn is_next(&self) -> bool {
        matches!(self.kind, NotificationKind::Next(_))
    }

    pub fn is_error(&self) -> bool {
        matches!(self.kind, NotificationKind::Error(_))
    }

    pub fn is_complete(&self) -> bool {
        matches!(self.kind, NotificationKind::Complete)
    }
}

impl fmt::Debug for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotificationKind::Next(value) => f.debug_tuple("Next").field(value).finish(),
            NotificationKind::Error(error) => {
                f.debug_tuple("Error").field(&format!("{error:#}")).finish()
            }
            NotificationKind::Complete => f.write_str("Complete"),
        }
    }
}

impl fmt::Debug for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Notification")
            .field("effect", &self.effect_name())
            .field("kind", &self.kind)
            .finish()
    }
}
