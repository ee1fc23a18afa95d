use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use phasecount_core::{Broadcaster, Config, CountdownEngine, Event, TokioScheduler};
use tokio::sync::broadcast::error::RecvError;
use uuid::Uuid;

#[derive(Args)]
pub struct RunArgs {
    /// Preset name (see `preset list`)
    preset: String,
    /// Countdown id; a random one is generated when omitted
    #[arg(long)]
    id: Option<String>,
    /// Cancel the countdown after this many seconds
    #[arg(long, value_name = "SECONDS")]
    cancel_after: Option<u64>,
    /// Print lifecycle events as JSON lines on stderr
    #[arg(long)]
    events: bool,
}

/// Prints every broadcast message on its own stdout line.
struct StdoutBroadcaster;

impl Broadcaster for StdoutBroadcaster {
    fn broadcast_message(&self, text: &str) {
        println!("{text}");
    }
}

pub fn run(args: RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;
    config.preset(&args.preset)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(drive(args, config))
}

async fn drive(args: RunArgs, config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let preset = config.preset(&args.preset)?;
    let engine = CountdownEngine::from_config(
        Arc::new(TokioScheduler::try_current()?),
        &config.engine,
    )?;
    let id = args.id.unwrap_or_else(|| Uuid::new_v4().to_string());

    let mut events = engine.subscribe();
    preset.start(&engine, &id, Arc::new(StdoutBroadcaster))?;
    tracing::debug!(countdown_id = %id, preset = %preset.name, "preset started");

    if let Some(secs) = args.cancel_after {
        let engine = engine.clone();
        let id = id.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(secs)).await;
            engine.cancel(&id);
        });
    }

    let mut fault = None;
    loop {
        let event = tokio::select! {
            event = events.recv() => event,
            Ok(()) = tokio::signal::ctrl_c() => {
                engine.cancel(&id);
                continue;
            }
        };
        match event {
            Ok(event) => {
                if args.events {
                    eprintln!("{}", serde_json::to_string(&event)?);
                }
                match event {
                    Event::CountdownFaulted { message, .. } => fault = Some(message),
                    Event::CountdownClosed { .. } => break,
                    _ => {}
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "event receiver lagged");
            }
            Err(RecvError::Closed) => break,
        }
    }

    match fault {
        Some(message) => Err(format!("countdown {id} faulted: {message}").into()),
        None => Ok(()),
    }
}
