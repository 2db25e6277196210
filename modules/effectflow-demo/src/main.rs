use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use futures::stream::{self, StreamExt};
use serde_json::{json, Value};
use tracing::info;
use tracing_subscriber::EnvFilter;

use effectflow_engine::{
    act, Action, ActConfig, ActionBus, EffectDef, EffectSource, EffectsRunner, EngineConfig,
    Flatten, TracingReporter,
};

// ---------------------------------------------------------------------------
// Sources
// ---------------------------------------------------------------------------

/// Emits a heartbeat action on a fixed interval.
struct Heartbeat {
    every: Duration,
}

impl EffectSource for Heartbeat {
    fn declaring_type(&self) -> &'static str {
        "Heartbeat"
    }

    fn effects(&self) -> Vec<EffectDef> {
        let every = self.every;
        vec![EffectDef::field("beat", move || {
            let interval = tokio::time::interval(every);
            stream::unfold((interval, 0u64), |(mut interval, n)| async move {
                interval.tick().await;
                let beat: Result<Value> = Ok(json!({"type": "heartbeat", "n": n}));
                Some((beat, (interval, n + 1)))
            })
        })]
    }

    fn init_action(&self) -> Option<Action> {
        Some(Action::new("heartbeat:started").with_field("every_ms", self.every.as_millis() as u64))
    }
}

/// Acknowledges every heartbeat. Uses `act()` so a failed acknowledgement
/// turns into an action instead of an effect error.
struct Acknowledger {
    bus: ActionBus,
}

impl EffectSource for Acknowledger {
    fn declaring_type(&self) -> &'static str {
        "Acknowledger"
    }

    fn effects(&self) -> Vec<EffectDef> {
        let bus = self.bus.clone();
        vec![EffectDef::method("acknowledge", move || {
            let config = ActConfig::new(
                |beat: &Action, _| {
                    let n = beat.get("n").and_then(Value::as_u64).unwrap_or_default();
                    let ack = if n % 5 == 4 {
                        Err(anyhow::anyhow!("every fifth heartbeat is dropped"))
                    } else {
                        Ok(json!({"type": "heartbeat:ack", "n": n}))
                    };
                    stream::iter(vec![ack])
                },
                |error, beat: &Action| {
                    json!({"type": "heartbeat:ack_failed", "n": beat.get("n"), "error": error.to_string()})
                },
            )
            .flatten(Flatten::Concat);

            act(config)
                .apply(bus.subscribe_filtered(&["heartbeat"]))
                .map(Ok::<Value, anyhow::Error>)
        })]
    }
}

/// Logs every action on the bus. Never dispatches.
struct Audit {
    bus: ActionBus,
}

impl EffectSource for Audit {
    fn declaring_type(&self) -> &'static str {
        "Audit"
    }

    fn effects(&self) -> Vec<EffectDef> {
        let bus = self.bus.clone();
        vec![EffectDef::field("log", move || {
            bus.subscribe().map(|action| {
                info!(action_type = action.action_type(), "Action dispatched");
                Ok::<_, anyhow::Error>(action.into_value())
            })
        })
        .non_dispatching()]
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("effectflow=info".parse()?))
        .init();

    info!("Effectflow demo starting...");

    // Load config
    let config = EngineConfig::from_env()?;
    config.log_summary();
    let demo = DemoConfig::from_env()?;
    info!(
        action_bus_capacity = demo.action_bus_capacity,
        heartbeat_ms = demo.heartbeat.as_millis() as u64,
        "Demo configuration"
    );
    let every = demo.heartbeat;

    let bus = ActionBus::new(demo.action_bus_capacity);
    let runner = EffectsRunner::with_reporter(bus.clone(), TracingReporter).with_config(config);

    // Register only after the session is running; earlier registrations are rejected.
    let session = runner.start();
    info!(session = %session.id, "Session running");

    let sources = runner.sources();
    sources.add(Audit { bus: bus.clone() })?;
    sources.add(Acknowledger { bus: bus.clone() })?;
    sources.add(Heartbeat { every })?;
    // Same identity as the first heartbeat: ignored while that one is active.
    sources.add(Heartbeat { every: every / 2 })?;

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    runner.stop();

    Ok(())
}

/// Settings owned by this binary rather than the engine.
#[derive(Debug)]
struct DemoConfig {
    action_bus_capacity: usize,
    heartbeat: Duration,
}

impl DemoConfig {
    fn from_env() -> Result<Self> {
        let heartbeat_ms: u64 = env_or("EFFECTFLOW_HEARTBEAT_MS", 1000)?;
        Ok(Self {
            action_bus_capacity: env_or("EFFECTFLOW_ACTION_BUS_CAPACITY", 1024)?,
            heartbeat: Duration::from_millis(heartbeat_ms.max(1)),
        })
    }
}

fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{key} must be a number, got {raw:?}")),
        Err(_) => Ok(default),
    }
}
