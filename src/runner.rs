//! Agent runner - wires collaborators, front ends and the service loop

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};

use alarm_app::config::Settings;
use alarm_app::{
    http, AlarmService, CommandAudio, ConfiguredLocationProvider, ServiceOptions, StatusNotifier,
};
use alarm_core::prelude::*;
use alarm_link::WebSocketTransport;

use crate::{control, signals};

/// Time given to the connection to flush its close frame before exit.
const CLOSE_GRACE: Duration = Duration::from_millis(250);

/// Run the agent until a quit action or termination signal.
pub async fn run(settings: Settings) -> Result<()> {
    info!("Controller: {}", settings.server.url);

    let audio = Arc::new(
        CommandAudio::new(&settings.audio).context("Failed to set up audio output")?,
    );
    let location = Arc::new(
        ConfiguredLocationProvider::new(&settings.location)
            .context("Failed to set up location provider")?,
    );
    let transport =
        WebSocketTransport::new(settings.server.url.clone(), settings.connection.ping_interval());

    let service = AlarmService::new(
        transport,
        audio,
        location,
        ServiceOptions {
            backoff: settings.reconnect.policy(),
            report_state_changes: settings.behavior.report_state_changes,
        },
    );
    service.register_observer(Arc::new(StatusNotifier::new(settings.behavior.headless)));
    let handle = service.handle();

    let (action_tx, action_rx) = mpsc::channel(16);
    signals::spawn_signal_handler(action_tx.clone());
    control::spawn_stdin_reader(action_tx, handle.clone());

    let (http_shutdown_tx, http_shutdown_rx) = oneshot::channel::<()>();
    let http_task = if settings.http.enabled {
        let bind = settings
            .http
            .bind_addr()
            .with_context(|| format!("Cannot serve HTTP control on {}", settings.http.bind))?;
        let http_handle = handle.clone();
        Some(tokio::spawn(async move {
            let shutdown = async move {
                let _ = http_shutdown_rx.await;
            };
            if let Err(e) = http::serve(bind, http_handle, shutdown).await {
                error!("HTTP control stopped: {}", e);
            }
        }))
    } else {
        None
    };

    if settings.behavior.auto_start {
        handle.start_core();
    } else {
        info!("Auto-start disabled, waiting for 'start'");
    }

    service.run(action_rx).await;

    let _ = http_shutdown_tx.send(());
    if let Some(task) = http_task {
        let _ = task.await;
    }
    tokio::time::sleep(CLOSE_GRACE).await;

    info!("Sound alarm agent exiting");
    Ok(())
}
