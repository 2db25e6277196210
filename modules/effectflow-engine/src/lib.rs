//! Effect registration and merging engine.
//!
//! Sources register with the [`EffectsRunner`] at runtime. Each source is
//! resolved into one merged stream of [`Notification`]s, grouped by
//! [`Identity`] so only one resolution per identity is live at a time,
//! validated, and forwarded to a single [`DispatchSink`].
//!
//! ```text
//! EffectSources::add_effects
//!     │  (mpsc, single consumer)
//!     ▼
//! GroupingMultiplexer ── admit? ──► resolve_effect_source ──► run_effects hook
//!     │                                                          │
//!     │◄───────────── verify_output ◄────────────────────────────┘
//!     ▼
//! EffectsRunner session task ──► DispatchSink
//! ```
//!
//! Effect failures are contained: auto-recovered effects are reported and
//! restarted, and an effect that opts out of recovery ends only its own
//! identity's group.

pub mod act;
pub mod config;
pub mod effect;
pub mod error;
pub mod identity;
pub mod multiplexer;
pub mod notification;
pub mod report;
pub mod resolver;
pub mod runner;
pub mod sink;
pub mod traits;
pub mod validator;

pub use act::{act, Act, ActConfig, Flatten};
pub use config::EngineConfig;
pub use effect::{EffectConfig, EffectDef, EffectStream, Member};
pub use error::EngineError;
pub use identity::{Identity, IdentityKey};
pub use multiplexer::{Admission, GroupingMultiplexer};
pub use notification::{Notification, NotificationKind, NotificationStream};
pub use report::{MemoryReporter, TracingReporter};
pub use resolver::resolve_effect_source;
pub use runner::{EffectSources, EffectsRunner, SessionInfo};
pub use sink::MemorySink;
pub use traits::{DispatchSink, EffectSource, ErrorReporter};
pub use validator::{render_value, verify_output, Verdict, UNRENDERABLE_PLACEHOLDER};

pub use effectflow_events::{Action, ActionBus};
