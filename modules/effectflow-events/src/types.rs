//! Core action types. Domain-agnostic.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// A well-formed action: a JSON object whose `type` member is a string.
///
/// Effects emit loose `serde_json::Value`s; only values that pass
/// [`Action::try_from`] are ever dispatched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub struct Action {
    action_type: String,
    body: Map<String, Value>,
}

/// A value rejected as an action. Carries the original value back so the
/// caller can render it in diagnostics.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("value is not an action: {reason}")]
pub struct InvalidAction {
    pub value: Value,
    pub reason: &'static str,
}

impl Action {
    /// Create an action with only a `type` member.
    pub fn new(action_type: impl Into<String>) -> Self {
        let action_type = action_type.into();
        let mut body = Map::new();
        body.insert("type".to_string(), Value::String(action_type.clone()));
        Self { action_type, body }
    }

    /// Set a payload member. The `type` member is fixed at construction and
    /// cannot be overwritten here.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let key = key.into();
        if key != "type" {
            self.body.insert(key, value.into());
        }
        self
    }

    pub fn action_type(&self) -> &str {
        &self.action_type
    }

    /// Read a payload member (including `type`).
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.body.get(key)
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.body)
    }
}

impl TryFrom<Value> for Action {
    type Error = InvalidAction;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        let Value::Object(body) = value else {
            let reason = if value.is_null() {
                "action is null"
            } else {
                "action must be an object"
            };
            return Err(InvalidAction { value, reason });
        };

        let action_type = match body.get("type") {
            Some(Value::String(t)) => t.clone(),
            Some(_) => {
                return Err(InvalidAction {
                    value: Value::Object(body),
                    reason: "action `type` must be a string",
                })
            }
            None => {
                return Err(InvalidAction {
                    value: Value::Object(body),
                    reason: "action has no `type` member",
                })
            }
        };

        Ok(Self { action_type, body })
    }
}

impl From<Action> for Value {
    fn from(action: Action) -> Self {
        action.into_value()
    }
}
