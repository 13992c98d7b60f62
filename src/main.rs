//! Binary entry point: wires the command queue, event bus and snapshot
//! ticker around the engine dispatcher, and runs the single-threaded
//! command loop (spec §5). The request queue's producer (HTTP gateway)
//! and the broadcast channels' consumers (websocket fan-out, durable
//! persistence writer) are out of scope — this binary owns only the
//! engine side of those boundaries.

use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use spot_engine::config::EngineConfig;
use spot_engine::engine::{Engine, EventBus};
use spot_engine::model::command::Envelope;
use spot_engine::snapshot;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "spot_engine=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = EngineConfig::load()?;
    tracing::info!(snapshot_path = %config.snapshot_path, with_snapshot = config.with_snapshot, "starting spot-engine");

    let events = EventBus::new(1024);
    let (persistence_tx, mut persistence_rx) = mpsc::unbounded_channel();

    // Nothing in this crate reads the persistence channel — the durable
    // writer is an out-of-scope external service. Drain it here so the
    // channel never backs up in this demo binary.
    tokio::spawn(async move { while persistence_rx.recv().await.is_some() {} });

    let mut engine = if config.with_snapshot {
        match snapshot::load(&config.snapshot_path).await? {
            Some(restored) => {
                tracing::info!("restored engine state from snapshot");
                Engine::restore(restored, events.clone(), persistence_tx.clone())
            }
            None => {
                tracing::info!("no snapshot found, starting empty");
                let mut engine = Engine::new(events.clone(), persistence_tx.clone());
                engine.seed(&config.markets, &config.parsed_seed_balances()?);
                engine
            }
        }
    } else {
        let mut engine = Engine::new(events.clone(), persistence_tx.clone());
        engine.seed(&config.markets, &config.parsed_seed_balances()?);
        engine
    };

    // The request queue: fed by the out-of-scope HTTP gateway in a real
    // deployment. Kept open here so the command loop has something to
    // select on; nothing currently produces into it.
    let (_command_tx, mut command_rx) = mpsc::channel::<Envelope>(1024);

    let mut snapshot_ticker = tokio::time::interval(std::time::Duration::from_secs(config.snapshot_interval_secs));
    snapshot_ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;

            maybe_envelope = command_rx.recv() => {
                let Some(envelope) = maybe_envelope else {
                    tracing::warn!("request queue closed, shutting down");
                    break;
                };
                // Exactly one command in flight at a time, run to completion
                // before the next is dequeued (spec §5).
                let result = engine.apply_command(&envelope.client_id, envelope.command);
                tracing::debug!(client_id = %envelope.client_id, result = ?serde_json::to_string(&result).ok(), "command processed");
            }

            _ = snapshot_ticker.tick() => {
                let snap = engine.snapshot();
                if let Err(err) = snapshot::write(&config.snapshot_path, &snap).await {
                    tracing::warn!(error = %err, "snapshot write failed, retrying next tick");
                }
            }

            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutdown requested, writing final snapshot");
                let snap = engine.snapshot();
                if let Err(err) = snapshot::write(&config.snapshot_path, &snap).await {
                    tracing::warn!(error = %err, "final snapshot write failed");
                }
                break;
            }
        }
    }

    Ok(())
}
