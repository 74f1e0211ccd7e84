//! Bell scheduler daemon.
//!
//! Usage: `workbell [CONFIG]`. Without an argument the default config path
//! is used; a default config is written there on first run.
//! `workbell --list-devices` prints the available output devices.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use workbell::activity::{ActivitySink, HttpActivitySink, NoopActivitySink};
use workbell::notify::{DesktopNotifier, NoopNotifier, Notifier};
use workbell::playback::CpalSink;
use workbell::{BellConfig, Engine, EngineEvent};

fn load_config(path: Option<PathBuf>) -> anyhow::Result<BellConfig> {
    let path = path.unwrap_or_else(BellConfig::default_config_path);
    if path.exists() {
        tracing::info!("loading config from {}", path.display());
        return Ok(BellConfig::from_file(&path)?);
    }

    let config = BellConfig::default();
    match config.save_to_file(&path) {
        Ok(()) => tracing::info!("wrote default config to {}", path.display()),
        Err(e) => tracing::warn!("cannot write default config to {}: {e}", path.display()),
    }
    Ok(config)
}

fn log_event(event: &EngineEvent) {
    match event {
        EngineEvent::Fired(matched) => {
            tracing::info!(category = %matched.category(), "fired {}", matched.label());
        }
        EngineEvent::PlaybackFailed { label, reason } => {
            tracing::warn!("playback of {label} failed: {reason}");
        }
        EngineEvent::NextEventChanged(Some(next)) => {
            tracing::info!("next: {} at {} ({})", next.label, next.time, next.category);
        }
        EngineEvent::NextEventChanged(None) => tracing::info!("no more events today"),
        other => tracing::debug!(?other, "engine event"),
    }
}

/// Log engine events until `shutdown` resolves. Returns the number logged.
///
/// Pending events are drained before shutdown is honoured.
async fn pump_events(
    events_rx: &mut mpsc::UnboundedReceiver<EngineEvent>,
    shutdown: impl Future<Output = ()>,
) -> usize {
    tokio::pin!(shutdown);
    let mut logged = 0;
    loop {
        tokio::select! {
            biased;
            Some(event) = events_rx.recv() => {
                log_event(&event);
                logged += 1;
            }
            _ = &mut shutdown => break,
        }
    }
    logged
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let arg = std::env::args_os().nth(1);
    if arg.as_deref() == Some(std::ffi::OsStr::new("--list-devices")) {
        for name in CpalSink::list_output_devices()? {
            println!("{name}");
        }
        return Ok(());
    }

    let config = load_config(arg.map(PathBuf::from))?;

    let activity: Arc<dyn ActivitySink> = match &config.activity.endpoint {
        Some(endpoint) => Arc::new(HttpActivitySink::new(
            endpoint.clone(),
            Duration::from_secs(config.activity.timeout_secs),
        )?),
        None => Arc::new(NoopActivitySink),
    };

    let notifier: Arc<dyn Notifier> = if config.notify.enabled {
        Arc::new(DesktopNotifier::new(config.notify.app_name.clone()))
    } else {
        Arc::new(NoopNotifier)
    };

    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let engine = Engine::new(&config, Arc::new(CpalSink::new(&config.audio)), events_tx)
        .map_err(|e| anyhow::anyhow!("invalid schedule: {e}"))?
        .with_activity_sink(activity)
        .with_notifier(notifier);
    let engine = Arc::new(engine);

    for entry in engine.today_schedule(engine.now()) {
        tracing::info!("today {} {} ({})", entry.time, entry.label, entry.category);
    }

    engine.start();

    pump_events(&mut events_rx, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("cannot listen for ctrl-c: {e}");
        }
    })
    .await;

    engine.stop();
    tracing::info!("workbell shut down cleanly");
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn one_shutdown_signal_ends_a_busy_loop() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        for _ in 0..100 {
            tx.send(EngineEvent::Started).unwrap();
        }
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        stop_tx.send(()).unwrap();

        let logged = pump_events(&mut rx, async {
            let _ = stop_rx.await;
        })
        .await;
        assert_eq!(logged, 100);
        drop(tx);
    }
}
