//! Deduplication keys for registered sources.

use std::fmt;

use crate::traits::EffectSource;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IdentityKey {
    /// No `identify` hook: every source of the declaring type shares one key.
    Default,
    Custom(String),
}

/// Declaring type plus identity key. Two unrelated types returning the same
/// custom key stay distinct.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity {
    declaring_type: &'static str,
    key: IdentityKey,
}

impl Identity {
    pub fn new(declaring_type: &'static str, key: IdentityKey) -> Self {
        Self {
            declaring_type,
            key,
        }
    }

    pub fn of(source: &dyn EffectSource) -> Self {
        let key = match source.identify() {
            Some(custom) => IdentityKey::Custom(custom),
            None => IdentityKey::Default,
        };
        Self::new(source.declaring_type(), key)
    }

    pub fn declaring_type(&self) -> &'static str {
        self.declaring_type
    }

    pub fn key(&self) -> &IdentityKey {
        &self.key
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.key {
            IdentityKey::Default => write!(f, "{}", self.declaring_type),
            IdentityKey::Custom(key) => write!(f, "{}#{}", self.declaring_type, key),
        }
    }
}
