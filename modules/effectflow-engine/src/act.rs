//! `act()`: per-input error, completion and cancellation mapping for
//! hand-written effects.
//!
//! Every input gets its own projection. A projection that fails produces
//! exactly one `error` action and stops; one that completes produces the
//! optional `complete` action; one that is cancelled before settling
//! produces the optional `unsubscribe` action. A panic in `project` or in
//! the projection counts as a failure. Nothing that happens to one input's
//! projection affects any other input.

use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use async_stream::stream;
use futures::future;
use futures::stream::{self as futures_stream, BoxStream, SelectAll, Stream, StreamExt};

use crate::error::panic_error;

type Project<I, O> = Arc<dyn Fn(&I, usize) -> BoxStream<'static, anyhow::Result<O>> + Send + Sync>;
type OnError<I, O> = Arc<dyn Fn(anyhow::Error, &I) -> O + Send + Sync>;
type OnSettle<I, O> = Arc<dyn Fn(usize, &I) -> O + Send + Sync>;

/// How projections of successive inputs are combined.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Flatten {
    /// One projection at a time, in arrival order. The next input's
    /// projection starts only once the previous one has settled.
    #[default]
    Concat,
    /// All projections run concurrently.
    Merge,
    /// A new input cancels the in-flight projection.
    Switch,
}

pub struct ActConfig<I, O> {
    project: Project<I, O>,
    error: OnError<I, O>,
    complete: Option<OnSettle<I, O>>,
    unsubscribe: Option<OnSettle<I, O>>,
    flatten: Flatten,
}

impl<I, O> ActConfig<I, O>
where
    I: Send + Sync + 'static,
    O: Send + 'static,
{
    /// `project` maps an input and its index to a pipeline; `error` maps a
    /// failed pipeline to its single error action.
    pub fn new<P, S, E>(project: P, error: E) -> Self
    where
        P: Fn(&I, usize) -> S + Send + Sync + 'static,
        S: Stream<Item = anyhow::Result<O>> + Send + 'static,
        E: Fn(anyhow::Error, &I) -> O + Send + Sync + 'static,
    {
        Self {
            project: Arc::new(move |input, index| project(input, index).boxed()),
            error: Arc::new(error),
            complete: None,
            unsubscribe: None,
            flatten: Flatten::default(),
        }
    }

    /// Emit one action, given the number of values produced, when a
    /// projection completes.
    pub fn on_complete<F>(mut self, complete: F) -> Self
    where
        F: Fn(usize, &I) -> O + Send + Sync + 'static,
    {
        self.complete = Some(Arc::new(complete));
        self
    }

    /// Emit one action, given the number of values produced so far, when a
    /// projection is cancelled before settling.
    pub fn on_unsubscribe<F>(mut self, unsubscribe: F) -> Self
    where
        F: Fn(usize, &I) -> O + Send + Sync + 'static,
    {
        self.unsubscribe = Some(Arc::new(unsubscribe));
        self
    }

    pub fn flatten(mut self, flatten: Flatten) -> Self {
        self.flatten = flatten;
        self
    }
}

/// Build the operator described by `config`. Apply it with [`Act::apply`].
pub fn act<I, O>(config: ActConfig<I, O>) -> Act<I, O>
where
    I: Send + Sync + 'static,
    O: Send + 'static,
{
    Act { config }
}

pub struct Act<I, O> {
    config: ActConfig<I, O>,
}

impl<I, O> Act<I, O>
where
    I: Send + Sync + 'static,
    O: Send + 'static,
{
    pub fn apply<S>(self, inputs: S) -> BoxStream<'static, O>
    where
        S: Stream<Item = I> + Send + 'static,
    {
        match self.config.flatten {
            Flatten::Concat => concat(self.config, inputs),
            Flatten::Merge => merge(self.config, inputs),
            Flatten::Switch => switch(self.config, inputs),
        }
    }
}

// ---------------------------------------------------------------------------
// Projection: one input's captured pipeline
// ---------------------------------------------------------------------------

struct Projection<I, O> {
    input: Arc<I>,
    inner: Option<BoxStream<'static, anyhow::Result<O>>>,
    count: usize,
    error: OnError<I, O>,
    complete: Option<OnSettle<I, O>>,
    unsubscribe: Option<OnSettle<I, O>>,
}

impl<I, O> Projection<I, O> {
    /// A panicking `project` is treated as a projection that failed at once.
    fn start(config: &ActConfig<I, O>, input: I, index: usize) -> Self
    where
        O: Send + 'static,
    {
        let project = AssertUnwindSafe(|| (config.project)(&input, index));
        let inner = match panic::catch_unwind(project) {
            Ok(inner) => inner,
            Err(payload) => {
                let error = panic_error(payload);
                futures_stream::once(future::ready(Err(error))).boxed()
            }
        };
        Self {
            input: Arc::new(input),
            inner: Some(inner),
            count: 0,
            error: config.error.clone(),
            complete: config.complete.clone(),
            unsubscribe: config.unsubscribe.clone(),
        }
    }

    /// Cancel before settling. Returns the `unsubscribe` action if configured.
    fn cancel(mut self) -> Option<O> {
        if self.inner.take().is_none() {
            return None;
        }
        let unsubscribe = self.unsubscribe.take()?;
        Some(unsubscribe(self.count, &self.input))
    }
}

impl<I, O> Stream for Projection<I, O> {
    type Item = O;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<O>> {
        let this = self.get_mut();
        let Some(inner) = this.inner.as_mut() else {
            return Poll::Ready(None);
        };

        let polled = panic::catch_unwind(AssertUnwindSafe(|| inner.poll_next_unpin(cx)))
            .unwrap_or_else(|payload| Poll::Ready(Some(Err(panic_error(payload)))));

        match polled {
            Poll::Ready(Some(Ok(value))) => {
                this.count += 1;
                Poll::Ready(Some(value))
            }
            Poll::Ready(Some(Err(error))) => {
                this.inner = None;
                Poll::Ready(Some((this.error)(error, &this.input)))
            }
            Poll::Ready(None) => {
                this.inner = None;
                let complete = this.complete.take();
                Poll::Ready(complete.map(|complete| complete(this.count, &this.input)))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

// ---------------------------------------------------------------------------
// Flattening strategies
// ---------------------------------------------------------------------------

enum Step<I, O> {
    Input(Option<I>),
    Output(Option<O>),
}

fn concat<I, O, S>(config: ActConfig<I, O>, inputs: S) -> BoxStream<'static, O>
where
    I: Send + Sync + 'static,
    O: Send + 'static,
    S: Stream<Item = I> + Send + 'static,
{
    let mut inputs = Box::pin(inputs);
    let output = stream! {
        let mut index = 0;
        while let Some(input) = inputs.next().await {
            let mut projection = Projection::start(&config, input, index);
            index += 1;
            while let Some(value) = projection.next().await {
                yield value;
            }
        }
    };
    output.boxed()
}

fn merge<I, O, S>(config: ActConfig<I, O>, inputs: S) -> BoxStream<'static, O>
where
    I: Send + Sync + 'static,
    O: Send + 'static,
    S: Stream<Item = I> + Send + 'static,
{
    let mut inputs = Box::pin(inputs);
    let output = stream! {
        let mut running: SelectAll<Projection<I, O>> = SelectAll::new();
        let mut open = true;
        let mut index = 0;
        loop {
            let step = tokio::select! {
                biased;
                value = running.next(), if !running.is_empty() => Step::Output(value),
                input = inputs.next(), if open => Step::Input(input),
                else => break,
            };

            match step {
                Step::Input(Some(input)) => {
                    running.push(Projection::start(&config, input, index));
                    index += 1;
                }
                Step::Input(None) => open = false,
                Step::Output(Some(value)) => yield value,
                Step::Output(None) => {}
            }
        }
    };
    output.boxed()
}

fn switch<I, O, S>(config: ActConfig<I, O>, inputs: S) -> BoxStream<'static, O>
where
    I: Send + Sync + 'static,
    O: Send + 'static,
    S: Stream<Item = I> + Send + 'static,
{
    let mut inputs = Box::pin(inputs);
    let output = stream! {
        let mut current: Option<Projection<I, O>> = None;
        let mut open = true;
        let mut index = 0;
        loop {
            let step = tokio::select! {
                biased;
                value = next_from(&mut current), if current.is_some() => Step::Output(value),
                input = inputs.next(), if open => Step::Input(input),
                else => break,
            };

            match step {
                Step::Input(Some(input)) => {
                    if let Some(previous) = current.take() {
                        if let Some(cancelled) = previous.cancel() {
                            yield cancelled;
                        }
                    }
                    current = Some(Projection::start(&config, input, index));
                    index += 1;
                }
                Step::Input(None) => open = false,
                Step::Output(Some(value)) => yield value,
                Step::Output(None) => current = None,
            }
        }
    };
    output.boxed()
}

async fn next_from<S: Stream + Unpin>(stream: &mut Option<S>) -> Option<S::Item> {
    match stream {
        Some(stream) => stream.next().await,
        None => None,
    }
}
