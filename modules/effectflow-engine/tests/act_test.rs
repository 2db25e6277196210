//! act() operator: per-input error, completion and cancellation mapping.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::anyhow;
use effectflow_engine::{act, ActConfig, Flatten};
use futures::channel::mpsc::{self, UnboundedSender};
use futures::stream::{self, BoxStream, StreamExt};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

type Output = BoxStream<'static, anyhow::Result<String>>;

/// Projections handed out per input, so tests control when each settles.
#[derive(Clone, Default)]
struct Projections {
    started: Arc<Mutex<Vec<String>>>,
    senders: Arc<Mutex<Vec<UnboundedSender<anyhow::Result<String>>>>>,
}

impl Projections {
    fn project(&self, input: &str, index: usize) -> Output {
        self.started.lock().unwrap().push(format!("{input}@{index}"));
        let (sender, receiver) = mpsc::unbounded();
        self.senders.lock().unwrap().push(sender);
        receiver.boxed()
    }

    fn started(&self) -> Vec<String> {
        self.started.lock().unwrap().clone()
    }

    fn send(&self, projection: usize, value: anyhow::Result<String>) {
        self.senders.lock().unwrap()[projection]
            .unbounded_send(value)
            .unwrap();
    }

    fn finish(&self, projection: usize) {
        self.senders.lock().unwrap()[projection].close_channel();
    }
}

fn config(projections: &Projections) -> ActConfig<String, String> {
    let projections = projections.clone();
    ActConfig::new(
        move |input: &String, index| projections.project(input, index),
        |error, input: &String| format!("error:{input}:{error}"),
    )
}

/// Collect the operator's output in a background task.
fn collect(output: BoxStream<'static, String>) -> Arc<Mutex<Vec<String>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    tokio::spawn(async move {
        let mut output = output;
        while let Some(value) = output.next().await {
            sink.lock().unwrap().push(value);
        }
    });
    seen
}

async fn settle() {
    for _ in 0..32 {
        tokio::task::yield_now().await;
    }
}

fn snapshot(seen: &Arc<Mutex<Vec<String>>>) -> Vec<String> {
    seen.lock().unwrap().clone()
}

fn inputs(values: &[&str]) -> stream::Iter<std::vec::IntoIter<String>> {
    stream::iter(values.iter().map(|v| v.to_string()).collect::<Vec<_>>())
}

// =========================================================================
// Default (sequential) flattening
// =========================================================================

#[tokio::test]
async fn next_projection_starts_only_after_previous_settles() {
    let projections = Projections::default();
    let seen = collect(act(config(&projections)).apply(inputs(&["x1", "x2"])));

    settle().await;
    assert_eq!(projections.started(), vec!["x1@0"]);

    projections.send(0, Ok("a".into()));
    settle().await;
    assert_eq!(projections.started(), vec!["x1@0"]);

    projections.finish(0);
    settle().await;
    assert_eq!(projections.started(), vec!["x1@0", "x2@1"]);

    projections.send(1, Ok("b".into()));
    settle().await;
    assert_eq!(snapshot(&seen), vec!["a", "b"]);
}

#[tokio::test]
async fn failed_projection_yields_one_error_and_later_inputs_continue() {
    let projections = Projections::default();
    let seen = collect(act(config(&projections)).apply(inputs(&["x1", "x2"])));

    settle().await;
    projections.send(0, Ok("a".into()));
    projections.send(0, Err(anyhow!("boom")));
    projections.send(0, Err(anyhow!("ignored")));
    projections.send(0, Ok("ignored".into()));
    settle().await;

    assert_eq!(projections.started(), vec!["x1@0", "x2@1"]);
    projections.send(1, Ok("b".into()));
    settle().await;

    assert_eq!(snapshot(&seen), vec!["a", "error:x1:boom", "b"]);
}

#[tokio::test]
async fn complete_action_carries_the_value_count() {
    let projections = Projections::default();
    let operator = act(config(&projections).on_complete(|count, input: &String| {
        format!("complete:{input}:{count}")
    }));
    let seen = collect(operator.apply(inputs(&["x1"])));

    settle().await;
    projections.send(0, Ok("a".into()));
    projections.send(0, Ok("b".into()));
    projections.finish(0);
    settle().await;

    assert_eq!(snapshot(&seen), vec!["a", "b", "complete:x1:2"]);
}

#[tokio::test]
async fn no_complete_action_without_complete_mapping() {
    let output = act(ActConfig::new(
        |input: &String, _| stream::iter(vec![Ok::<_, anyhow::Error>(format!("{input}!"))]),
        |error, _: &String| format!("error:{error}"),
    ))
    .apply(inputs(&["x1", "x2"]));

    let seen: Vec<String> = output.collect().await;
    assert_eq!(seen, vec!["x1!", "x2!"]);
}

#[tokio::test]
async fn error_is_not_followed_by_complete_action() {
    let output = act(
        ActConfig::new(
            |_: &String, _| stream::iter(vec![Err::<String, _>(anyhow!("nope"))]),
            |error, input: &String| format!("error:{input}:{error}"),
        )
        .on_complete(|count, input: &String| format!("complete:{input}:{count}")),
    )
    .apply(inputs(&["x1"]));

    let seen: Vec<String> = output.collect().await;
    assert_eq!(seen, vec!["error:x1:nope"]);
}

#[tokio::test]
async fn panicking_project_yields_one_error_action_for_that_input() {
    let output = act(ActConfig::new(
        |input: &String, _| {
            if input == "x2" {
                panic!("no projection for {input}");
            }
            stream::iter(vec![Ok::<_, anyhow::Error>(format!("{input}!"))])
        },
        |error, input: &String| format!("error:{input}:{error}"),
    ))
    .apply(inputs(&["x1", "x2", "x3"]));

    let seen: Vec<String> = output.collect().await;
    assert_eq!(seen, vec!["x1!", "error:x2:panicked: no projection for x2", "x3!"]);
}

#[tokio::test]
async fn projection_panicking_mid_stream_is_isolated_to_its_input() {
    let output = act(
        ActConfig::new(
            |input: &String, _| {
                let input = input.clone();
                stream::iter(vec![0usize]).map(move |n| {
                    let slots: Vec<&str> = if input == "x2" { Vec::new() } else { vec!["ok"] };
                    Ok::<_, anyhow::Error>(format!("{input}:{}", slots[n]))
                })
            },
            |error, input: &String| format!("error:{input}:{error}"),
        )
        .on_complete(|count, input: &String| format!("complete:{input}:{count}")),
    )
    .apply(inputs(&["x1", "x2", "x3"]));

    let seen: Vec<String> = output.collect().await;
    assert_eq!(seen.len(), 5);
    assert_eq!(&seen[..2], ["x1:ok", "complete:x1:1"]);
    assert!(seen[2].starts_with("error:x2:panicked: index out of bounds"));
    assert_eq!(&seen[3..], ["x3:ok", "complete:x3:1"]);
}

// =========================================================================
// Cancellation
// =========================================================================

#[tokio::test]
async fn switching_cancels_in_flight_projection_with_count() {
    let projections = Projections::default();
    let operator = act(config(&projections)
        .on_complete(|count, input: &String| format!("complete:{input}:{count}"))
        .on_unsubscribe(|count, input: &String| format!("unsubscribe:{input}:{count}"))
        .flatten(Flatten::Switch));

    let (input_sender, input_receiver) = mpsc::unbounded::<String>();
    let seen = collect(operator.apply(input_receiver));

    input_sender.unbounded_send("x1".into()).unwrap();
    settle().await;
    projections.send(0, Ok("a".into()));
    projections.send(0, Ok("b".into()));
    settle().await;

    input_sender.unbounded_send("x2".into()).unwrap();
    settle().await;
    projections.send(1, Ok("c".into()));
    projections.finish(1);
    settle().await;

    assert_eq!(
        snapshot(&seen),
        vec!["a", "b", "unsubscribe:x1:2", "c", "complete:x2:1"]
    );
}

#[tokio::test]
async fn switching_without_unsubscribe_mapping_emits_nothing_extra() {
    let projections = Projections::default();
    let operator = act(config(&projections).flatten(Flatten::Switch));

    let (input_sender, input_receiver) = mpsc::unbounded::<String>();
    let seen = collect(operator.apply(input_receiver));

    input_sender.unbounded_send("x1".into()).unwrap();
    settle().await;
    projections.send(0, Ok("a".into()));
    settle().await;
    input_sender.unbounded_send("x2".into()).unwrap();
    settle().await;

    assert_eq!(snapshot(&seen), vec!["a"]);
    assert_eq!(projections.started(), vec!["x1@0", "x2@1"]);
}

// =========================================================================
// Concurrent flattening
// =========================================================================

#[tokio::test]
async fn merge_runs_projections_concurrently() {
    let projections = Projections::default();
    let operator = act(config(&projections).flatten(Flatten::Merge));
    let seen = collect(operator.apply(inputs(&["x1", "x2"])));

    settle().await;
    assert_eq!(projections.started(), vec!["x1@0", "x2@1"]);

    projections.send(1, Ok("from-x2".into()));
    settle().await;
    projections.send(0, Ok("from-x1".into()));
    settle().await;

    assert_eq!(snapshot(&seen), vec!["from-x2", "from-x1"]);
}

#[tokio::test]
async fn merge_output_ends_after_inputs_and_projections_end() {
    let output = act(
        ActConfig::new(
            |input: &String, index| {
                stream::iter(vec![Ok::<_, anyhow::Error>(format!("{input}#{index}"))])
            },
            |error, _: &String| format!("error:{error}"),
        )
        .flatten(Flatten::Merge),
    )
    .apply(inputs(&["x1", "x2", "x3"]));

    let mut seen = tokio::time::timeout(Duration::from_secs(1), output.collect::<Vec<_>>())
        .await
        .expect("merged output should end");
    seen.sort();
    assert_eq!(seen, vec!["x1#0", "x2#1", "x3#2"]);
}
