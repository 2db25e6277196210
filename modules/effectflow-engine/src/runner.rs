//! The single top-level consumer of the merged effect pipeline.
//!
//! `NotStarted → Running` via [`EffectsRunner::start`] (idempotent while
//! running), `Running → NotStarted` via [`EffectsRunner::stop`] or drop.
//! Registrations are only accepted while a session is running: start the
//! runner first, then register sources.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use futures::channel::mpsc::{self, UnboundedSender};
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::multiplexer::GroupingMultiplexer;
use crate::report::TracingReporter;
use crate::traits::{DispatchSink, EffectSource, ErrorReporter};

type Registration = Arc<dyn EffectSource>;

/// Identifies one runner session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
}

impl SessionInfo {
    fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
        }
    }
}

struct Session {
    info: SessionInfo,
    task: JoinHandle<()>,
    /// Held while an action is dispatched. Cleared by `stop`, after which
    /// the session task never dispatches again.
    dispatching: Arc<Mutex<bool>>,
}

// ---------------------------------------------------------------------------
// EffectSources: registration handle
// ---------------------------------------------------------------------------

/// Cloneable handle for registering sources with a runner.
#[derive(Clone, Default)]
pub struct EffectSources {
    channel: Arc<Mutex<Option<UnboundedSender<Registration>>>>,
}

impl EffectSources {
    /// Register a source with the running session. Fails with
    /// [`EngineError::NotRunning`] when no session is running; the
    /// registration is not buffered.
    pub fn add_effects(&self, source: Arc<dyn EffectSource>) -> Result<(), EngineError> {
        let source_type = source.declaring_type();
        let sent = match lock(&self.channel).as_ref() {
            Some(sender) => sender.unbounded_send(source).is_ok(),
            None => false,
        };

        if sent {
            debug!(source_type, "Effect source registered");
            Ok(())
        } else {
            warn!(source_type, "Effect source registered while runner is stopped, ignored");
            Err(EngineError::NotRunning { source_type })
        }
    }

    /// Convenience for registering an owned source.
    pub fn add<S: EffectSource>(&self, source: S) -> Result<(), EngineError> {
        self.add_effects(Arc::new(source))
    }

    fn open(&self) -> mpsc::UnboundedReceiver<Registration> {
        let (sender, receiver) = mpsc::unbounded();
        *lock(&self.channel) = Some(sender);
        receiver
    }

    fn close(&self) {
        lock(&self.channel).take();
    }
}

// ---------------------------------------------------------------------------
// EffectsRunner
// ---------------------------------------------------------------------------

/// Subscribes the grouping multiplexer and forwards every validated action
/// to the dispatch sink. One session at a time.
pub struct EffectsRunner {
    sink: Arc<dyn DispatchSink>,
    reporter: Arc<dyn ErrorReporter>,
    config: EngineConfig,
    sources: EffectSources,
    session: Mutex<Option<Session>>,
}

impl EffectsRunner {
    /// A runner reporting through [`TracingReporter`].
    pub fn new<S: DispatchSink + 'static>(sink: S) -> Self {
        Self::with_reporter(sink, TracingReporter)
    }

    pub fn with_reporter<S, R>(sink: S, reporter: R) -> Self
    where
        S: DispatchSink + 'static,
        R: ErrorReporter + 'static,
    {
        Self {
            sink: Arc::new(sink),
            reporter: Arc::new(reporter),
            config: EngineConfig::default(),
            sources: EffectSources::default(),
            session: Mutex::new(None),
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Registration handle. Valid across sessions.
    pub fn sources(&self) -> EffectSources {
        self.sources.clone()
    }

    /// Start a session. Returns the running session unchanged if one is
    /// already running. Must be called within a tokio runtime.
    pub fn start(&self) -> SessionInfo {
        let mut slot = lock(&self.session);
        if let Some(session) = slot.as_ref() {
            if !session.task.is_finished() {
                return session.info.clone();
            }
        }

        let info = SessionInfo::new();
        let registrations = self.sources.open();
        let multiplexer = GroupingMultiplexer::new(self.reporter.clone(), &self.config);
        let sink = self.sink.clone();
        let dispatching = Arc::new(Mutex::new(true));
        let gate = dispatching.clone();
        let span = info_span!("effects_session", session = %info.id);

        let task = tokio::spawn(
            async move {
                let mut actions = multiplexer.to_actions(registrations);
                while let Some(action) = actions.next().await {
                    let open = lock(&gate);
                    if !*open {
                        break;
                    }
                    sink.dispatch(action);
                }
                debug!("Effects session drained");
            }
            .instrument(span),
        );

        info!(session = %info.id, "Effects runner started");
        *slot = Some(Session {
            info: info.clone(),
            task,
            dispatching,
        });
        info
    }

    /// Tear down the running session: every group, retry loop and in-flight
    /// projection is dropped, and the next `start` begins with no memory of
    /// earlier admissions. Nothing reaches the sink once this returns, so a
    /// sink must not call `stop` from inside `dispatch`.
    pub fn stop(&self) {
        self.sources.close();
        if let Some(session) = lock(&self.session).take() {
            *lock(&session.dispatching) = false;
            session.task.abort();
            info!(session = %session.info.id, "Effects runner stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        lock(&self.session)
            .as_ref()
            .is_some_and(|session| !session.task.is_finished())
    }

    pub fn session(&self) -> Option<SessionInfo> {
        lock(&self.session)
            .as_ref()
            .filter(|session| !session.task.is_finished())
            .map(|session| session.info.clone())
    }
}

impl Drop for EffectsRunner {
    fn drop(&mut self) {
        self.stop();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
