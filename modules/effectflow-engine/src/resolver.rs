//! Turns a registered source into one merged notification stream.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use async_stream::stream;
use futures::future;
use futures::stream::{self as futures_stream, StreamExt};
use tracing::debug;

use crate::effect::{effect_name, EffectDef, EffectStream};
use crate::error::{panic_error, EngineError};
use crate::notification::{Notification, NotificationKind, NotificationStream};
use crate::traits::{EffectSource, ErrorReporter};

/// Resolve every declared effect of `source` and merge them with unbounded
/// concurrency. The merged stream completes only once every effect has
/// completed; an effect failing without auto-recovery yields an `Error`
/// notification and stops that effect. A panicking pipeline counts as a
/// failure of that effect alone.
pub fn resolve_effect_source(
    source: Arc<dyn EffectSource>,
    reporter: Arc<dyn ErrorReporter>,
) -> NotificationStream {
    let effects: Vec<NotificationStream> = source
        .effects()
        .into_iter()
        .map(|def| resolve_effect(source.clone(), def, reporter.clone()))
        .collect();

    futures_stream::select_all(effects).boxed()
}

fn resolve_effect(
    source: Arc<dyn EffectSource>,
    def: EffectDef,
    reporter: Arc<dyn ErrorReporter>,
) -> NotificationStream {
    let config = def.config();
    let member = def.member();
    let property = def.name().to_string();
    let effect = effect_name(source.declaring_type(), &property, member);
    let notify =
        move |kind: NotificationKind| Notification::new(source.clone(), property.clone(), member, kind);

    let stream = stream! {
        loop {
            let mut pipeline = guarded_pipeline(&def);
            let mut failure = None;

            while let Some(item) = pipeline.next().await {
                match item {
                    Ok(value) => {
                        if config.dispatch {
                            yield notify(NotificationKind::Next(value));
                        }
                    }
                    Err(error) => {
                        failure = Some(error);
                        break;
                    }
                }
            }
            drop(pipeline);

            let error = match failure {
                Some(error) => error,
                None => {
                    yield notify(NotificationKind::Complete);
                    break;
                }
            };

            if !config.use_auto_recovery {
                yield notify(NotificationKind::Error(error));
                break;
            }

            debug!(effect = %effect, "Restarting effect after error");
            reporter.report(EngineError::EffectThrew {
                effect: effect.clone(),
                error,
            });

            // No backoff, but give sibling tasks a turn before restarting.
            tokio::task::yield_now().await;
        }
    };

    stream.boxed()
}

/// Build and run the effect's pipeline with panics caught. A panic, whether
/// in the factory or while polling, surfaces as one `Err` item and ends the
/// pipeline.
fn guarded_pipeline(def: &EffectDef) -> EffectStream {
    match panic::catch_unwind(AssertUnwindSafe(|| def.pipeline())) {
        Ok(pipeline) => AssertUnwindSafe(pipeline)
            .catch_unwind()
            .map(|item| item.unwrap_or_else(|payload| Err(panic_error(payload))))
            .boxed(),
        Err(payload) => {
            let error = panic_error(payload);
            futures_stream::once(future::ready(Err(error))).boxed()
        }
    }
}
