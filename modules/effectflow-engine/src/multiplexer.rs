//! Groups registrations by identity and admits at most one live resolution
//! per identity.
//!
//! Admission rule: a registration for identity `I` is admitted only while
//! `I`'s group is inactive. While a group is active, further registrations
//! for it are ignored (not queued, not merged). A group becomes inactive
//! again when its resolved stream completes or fails without recovery.

use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use async_stream::stream;
use effectflow_events::Action;
use futures::stream::{BoxStream, SelectAll, Stream, StreamExt};
use tracing::debug;

use crate::config::EngineConfig;
use crate::error::{panic_error, EngineError};
use crate::identity::Identity;
use crate::notification::NotificationStream;
use crate::resolver::resolve_effect_source;
use crate::traits::{EffectSource, ErrorReporter};
use crate::validator::{verify_output, Verdict};

/// Outcome of one registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// A new group was started. `init_action` is true when a startup action
    /// was prepended to its output.
    Admitted { init_action: bool },
    /// The identity already has an active group.
    Rejected,
    /// Resolving the source or running its `run_effects` hook panicked. The
    /// failure is reported and the identity stays inactive.
    Failed,
}

enum GroupEvent {
    Output(Action),
    Ended(Identity),
}

enum Step {
    Registration(Option<Arc<dyn EffectSource>>),
    Group(Option<GroupEvent>),
}

/// Per-session group table. Owned by exactly one consumer, so the table and
/// the init set need no locking.
pub struct GroupingMultiplexer {
    reporter: Arc<dyn ErrorReporter>,
    render_limit: usize,
    active: HashSet<Identity>,
    init_dispatched: HashSet<Identity>,
    groups: SelectAll<BoxStream<'static, GroupEvent>>,
}

impl GroupingMultiplexer {
    pub fn new(reporter: Arc<dyn ErrorReporter>, config: &EngineConfig) -> Self {
        Self {
            reporter,
            render_limit: config.render_limit,
            active: HashSet::new(),
            init_dispatched: HashSet::new(),
            groups: SelectAll::new(),
        }
    }

    pub fn is_active(&self, identity: &Identity) -> bool {
        self.active.contains(identity)
    }

    pub fn active_groups(&self) -> usize {
        self.active.len()
    }

    /// Apply the admission rule to one registration. An admitted source is
    /// resolved, wrapped by its `run_effects` hook and validated; its output
    /// is produced by [`GroupingMultiplexer::to_actions`].
    pub fn admit(&mut self, source: Arc<dyn EffectSource>) -> Admission {
        let identity = Identity::of(source.as_ref());
        if self.active.contains(&identity) {
            debug!(identity = %identity, "Group active, registration ignored");
            return Admission::Rejected;
        }

        let reporter = self.reporter.clone();
        let supervise = AssertUnwindSafe(|| {
            let resolved = resolve_effect_source(source.clone(), reporter);
            source.run_effects(resolved)
        });
        let supervised = match panic::catch_unwind(supervise) {
            Ok(supervised) => supervised,
            Err(payload) => {
                self.reporter.report(EngineError::GroupFatal {
                    effect: hook_name(&identity),
                    identity,
                    error: panic_error(payload),
                });
                return Admission::Failed;
            }
        };

        let init = if self.init_dispatched.insert(identity.clone()) {
            source.init_action()
        } else {
            None
        };
        let init_action = init.is_some();

        self.groups.push(group_output(
            identity.clone(),
            init,
            supervised,
            self.reporter.clone(),
            self.render_limit,
        ));

        debug!(identity = %identity, init_action, "Group admitted");
        self.active.insert(identity);
        Admission::Admitted { init_action }
    }

    fn release(&mut self, identity: &Identity) {
        debug!(identity = %identity, "Group ended");
        self.active.remove(identity);
    }

    /// Drive the multiplexer from a registration stream. The returned stream
    /// yields every validated action of every admitted group, and ends once
    /// registrations have ended and every group has ended.
    pub fn to_actions<R>(self, registrations: R) -> BoxStream<'static, Action>
    where
        R: Stream<Item = Arc<dyn EffectSource>> + Send + 'static,
    {
        let mut this = self;
        let mut registrations = Box::pin(registrations);

        let actions = stream! {
            let mut open = true;
            loop {
                let step = tokio::select! {
                    event = this.groups.next(), if !this.groups.is_empty() => Step::Group(event),
                    registration = registrations.next(), if open => Step::Registration(registration),
                    else => break,
                };

                match step {
                    Step::Registration(Some(source)) => {
                        this.admit(source);
                    }
                    Step::Registration(None) => open = false,
                    Step::Group(Some(GroupEvent::Output(action))) => yield action,
                    Step::Group(Some(GroupEvent::Ended(identity))) => this.release(&identity),
                    Step::Group(None) => {}
                }
            }
        };

        actions.boxed()
    }
}

/// One admitted group's output: the startup action (if any), then every
/// validated action, then an end marker. An unrecovered error ends the group.
fn group_output(
    identity: Identity,
    init: Option<Action>,
    notifications: NotificationStream,
    reporter: Arc<dyn ErrorReporter>,
    render_limit: usize,
) -> BoxStream<'static, GroupEvent> {
    let mut notifications = AssertUnwindSafe(notifications).catch_unwind();
    let output = stream! {
        if let Some(action) = init {
            yield GroupEvent::Output(action);
        }

        while let Some(polled) = notifications.next().await {
            let notification = match polled {
                Ok(notification) => notification,
                Err(payload) => {
                    reporter.report(EngineError::GroupFatal {
                        effect: hook_name(&identity),
                        identity: identity.clone(),
                        error: panic_error(payload),
                    });
                    break;
                }
            };
            match verify_output(notification, reporter.as_ref(), render_limit) {
                Verdict::Dispatch(action) => yield GroupEvent::Output(action),
                Verdict::Skip => {}
                Verdict::Fatal => break,
            }
        }
        drop(notifications);

        yield GroupEvent::Ended(identity);
    };

    output.boxed()
}

fn hook_name(identity: &Identity) -> String {
    format!("{}.run_effects()", identity.declaring_type())
}
