//! GroupingMultiplexer driven directly from a registration stream, without
//! a runner.

use std::sync::Arc;
use std::time::Duration;

use effectflow_engine::{
    Action, EffectDef, EffectSource, EngineConfig, GroupingMultiplexer, MemoryReporter,
};
use futures::channel::mpsc;
use futures::stream::{self, StreamExt};
use serde_json::{json, Value};

struct Job {
    label: &'static str,
    finite: bool,
}

impl EffectSource for Job {
    fn declaring_type(&self) -> &'static str {
        "Job"
    }

    fn effects(&self) -> Vec<EffectDef> {
        let label = self.label;
        let finite = self.finite;
        vec![EffectDef::method("run", move || {
            let done = stream::iter(vec![Ok::<Value, anyhow::Error>(
                json!({"type": "done", "label": label}),
            )]);
            if finite {
                done.boxed()
            } else {
                done.chain(stream::pending()).boxed()
            }
        })]
    }

    fn init_action(&self) -> Option<Action> {
        Some(Action::new("job:init").with_field("label", self.label))
    }
}

fn job(label: &'static str, finite: bool) -> Arc<dyn EffectSource> {
    Arc::new(Job { label, finite })
}

fn multiplexer() -> GroupingMultiplexer {
    GroupingMultiplexer::new(Arc::new(MemoryReporter::new()), &EngineConfig::default())
}

fn describe(action: &Action) -> String {
    format!(
        "{}:{}",
        action.action_type(),
        action.get("label").and_then(Value::as_str).unwrap_or("?")
    )
}

// =========================================================================
// Tests
// =========================================================================

#[tokio::test]
async fn output_ends_when_registrations_and_groups_have_ended() {
    let registrations = stream::iter(vec![job("first", true)]);
    let actions: Vec<String> = multiplexer()
        .to_actions(registrations)
        .map(|a| describe(&a))
        .collect()
        .await;

    assert_eq!(actions, vec!["job:init:first", "done:first"]);
}

#[tokio::test]
async fn registration_is_admitted_again_once_the_group_is_inactive() {
    let (sender, receiver) = mpsc::unbounded();
    let mut actions = multiplexer().to_actions(receiver);

    sender.unbounded_send(job("first", true)).unwrap();
    assert_eq!(describe(&actions.next().await.unwrap()), "job:init:first");
    assert_eq!(describe(&actions.next().await.unwrap()), "done:first");

    // Give the multiplexer a chance to observe the group ending.
    let idle = tokio::time::timeout(Duration::from_millis(20), actions.next()).await;
    assert!(idle.is_err());

    sender.unbounded_send(job("second", true)).unwrap();
    assert_eq!(describe(&actions.next().await.unwrap()), "done:second");
}

#[tokio::test]
async fn registration_is_ignored_while_the_group_is_active() {
    let (sender, receiver) = mpsc::unbounded();
    let mut actions = multiplexer().to_actions(receiver);

    sender.unbounded_send(job("first", false)).unwrap();
    assert_eq!(describe(&actions.next().await.unwrap()), "job:init:first");
    assert_eq!(describe(&actions.next().await.unwrap()), "done:first");

    sender.unbounded_send(job("second", false)).unwrap();
    let nothing = tokio::time::timeout(Duration::from_millis(20), actions.next()).await;
    assert!(nothing.is_err(), "second registration must not produce output");
}
