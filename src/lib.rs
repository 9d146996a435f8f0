pub mod camera;
pub mod control;
pub mod diagnostics;
pub mod error;
pub mod filter;
pub mod logging;
pub mod preview;
pub mod relay;
pub mod render;
pub mod settings;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::{error, info};

use control::EdgePipeline;
use relay::{RelayHub, RelayState};
use settings::types::EdgecastConfig;

/// Run the pipeline (and the relay server, if enabled) until Ctrl-C or
/// until `duration` elapses. Logs the frame rate once per second.
pub async fn run(config: EdgecastConfig, duration: Option<Duration>) -> anyhow::Result<()> {
    let mut pipeline = EdgePipeline::new(config.clone()).context("failed to build pipeline")?;
    pipeline.on_fatal_error(Arc::new(|e| error!("fatal: {e}")));

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let server = if config.relay.enabled {
        let hub = Arc::new(RelayHub::new(config.relay.peer_queue));
        pipeline.attach_relay(Arc::clone(&hub));
        let listener = relay::bind(&config.relay.bind).await?;
        let state = RelayState {
            hub,
            stats: pipeline.stats_handle(),
        };
        Some(tokio::spawn(relay::serve(listener, state, async {
            let _ = shutdown_rx.await;
        })))
    } else {
        None
    };

    pipeline.start().context("failed to start pipeline")?;

    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    ticker.tick().await;
    let deadline = async {
        match duration {
            Some(d) => tokio::time::sleep(d).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(deadline);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let snap = pipeline.diagnostics();
                info!(
                    fps = format!("{:.1}", snap.fps),
                    processed = snap.frames_processed,
                    dropped = snap.frames_dropped,
                    "processing {:.1} fps",
                    snap.fps
                );
            }
            _ = &mut ctrl_c => {
                info!("interrupted, shutting down");
                break;
            }
            _ = &mut deadline => {
                info!("run duration elapsed, shutting down");
                break;
            }
        }
    }

    // Joining worker threads blocks; keep it off the async executor.
    tokio::task::spawn_blocking(move || pipeline.stop())
        .await
        .context("pipeline shutdown panicked")?;

    if let Some(server) = server {
        let _ = shutdown_tx.send(());
        server.await.context("relay server task panicked")??;
    }
    Ok(())
}
