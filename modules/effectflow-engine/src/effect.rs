//! Effect declarations.

use std::fmt;
use std::sync::Arc;

use futures::stream::{BoxStream, Stream, StreamExt};
use serde_json::Value;

/// A running effect pipeline. Each `Err` is an effect failure.
pub type EffectStream = BoxStream<'static, anyhow::Result<Value>>;

type PipelineFactory = Arc<dyn Fn() -> EffectStream + Send + Sync>;

/// How the effect is exposed on its source. Only affects diagnostics:
/// methods render as `Type.name()`, fields as `Type.name`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Member {
    Method,
    Field,
}

/// Per-effect dispatch and recovery policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EffectConfig {
    /// Forward successful values to the dispatch sink.
    pub dispatch: bool,
    /// On error, report and restart the pipeline instead of propagating.
    pub use_auto_recovery: bool,
}

impl Default for EffectConfig {
    fn default() -> Self {
        Self {
            dispatch: true,
            use_auto_recovery: true,
        }
    }
}

/// One declared effect: a name, its policy, and a factory producing a fresh
/// pipeline each time the effect is (re)started.
#[derive(Clone)]
pub struct EffectDef {
    name: String,
    member: Member,
    config: EffectConfig,
    factory: PipelineFactory,
}

impl EffectDef {
    /// An effect exposed as a method.
    pub fn method<F, S>(name: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> S + Send + Sync + 'static,
        S: Stream<Item = anyhow::Result<Value>> + Send + 'static,
    {
        Self::build(name.into(), Member::Method, factory)
    }

    /// An effect exposed as a field.
    pub fn field<F, S>(name: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> S + Send + Sync + 'static,
        S: Stream<Item = anyhow::Result<Value>> + Send + 'static,
    {
        Self::build(name.into(), Member::Field, factory)
    }

    fn build<F, S>(name: String, member: Member, factory: F) -> Self
    where
        F: Fn() -> S + Send + Sync + 'static,
        S: Stream<Item = anyhow::Result<Value>> + Send + 'static,
    {
        Self {
            name,
            member,
            config: EffectConfig::default(),
            factory: Arc::new(move || factory().boxed()),
        }
    }

    pub fn with_config(mut self, config: EffectConfig) -> Self {
        self.config = config;
        self
    }

    /// Run for side effects only; successful values are never dispatched.
    pub fn non_dispatching(mut self) -> Self {
        self.config.dispatch = false;
        self
    }

    /// Let errors end the source's whole contribution instead of restarting.
    pub fn without_auto_recovery(mut self) -> Self {
        self.config.use_auto_recovery = false;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn member(&self) -> Member {
        self.member
    }

    pub fn config(&self) -> EffectConfig {
        self.config
    }

    /// Start a fresh pipeline.
    pub fn pipeline(&self) -> EffectStream {
        (self.factory)()
    }
}

impl fmt::Debug for EffectDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectDef")
            .field("name", &self.name)
            .field("member", &self.member)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// `Type.name()` for methods, `Type.name` for fields.
pub fn effect_name(declaring_type: &str, property: &str, member: Member) -> String {
    match member {
        Member::Method => format!("{declaring_type}.{property}()"),
        Member::Field => format!("{declaring_type}.{property}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_dispatch_with_auto_recovery() {
        let def = EffectDef::method("load", || futures::stream::empty::<anyhow::Result<Value>>());
        assert_eq!(def.config(), EffectConfig::default());
        assert!(def.config().dispatch);
        assert!(def.config().use_auto_recovery);
    }

    #[test]
    fn builders_flip_policy() {
        let def = EffectDef::field("audit", || futures::stream::empty::<anyhow::Result<Value>>())
            .non_dispatching()
            .without_auto_recovery();
        assert_eq!(def.member(), Member::Field);
        assert!(!def.config().dispatch);
        assert!(!def.config().use_auto_recovery);
    }

    #[test]
    fn effect_names_distinguish_methods_and_fields() {
        assert_eq!(effect_name("Todos", "load", Member::Method), "Todos.load()");
        assert_eq!(effect_name("Todos", "audit", Member::Field), "Todos.audit");
    }
}
