use clap::Parser;
use log::{error, info, warn};
use rook::config::{self, Cli, Config};
use rook::context::MonitorContext;
use rook::error::{Result, StartupError};
use rook::input::mqtt::MqttClient;
use rook::notify::{Dispatcher, LogTransport, NotificationTransport, SmtpTransport};
use rook::pipeline::IngestionPipeline;
use rook::status::StatusServer;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

/// How long to wait for the first CONNACK before giving up.
const CONNECT_TIMEOUT_SECS: u64 = 10;

fn init_logger() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();
}

fn main() -> ExitCode {
    // Load .env before the runtime spawns any threads
    config::load_dotenv();
    let cli = Cli::parse();
    init_logger();

    let result = Config::load(&cli).and_then(|config| {
        tokio::runtime::Runtime::new()
            .map_err(StartupError::from)?
            .block_on(run(config))
    });

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

/// Resolve on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
                return;
            }
            Err(e) => warn!("Failed to listen for SIGTERM: {}", e),
        }
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }
}

async fn run(config: Config) -> Result<()> {
    info!("Starting Rook");
    info!("Configuration loaded:");
    info!(
        "  MQTT broker: {}:{} (client id {})",
        config.mqtt.broker_host, config.mqtt.broker_port, config.mqtt.client_id
    );
    info!("  Topic filter: {}", config.topic);
    info!("  Recipient: {}", config.smtp.recipient);
    info!("  Status interface: {}", config.status.listen);

    let transport: Arc<dyn NotificationTransport> = if config.dry_run {
        info!("  Dry run: notifications are logged, not sent");
        Arc::new(LogTransport)
    } else {
        Arc::new(SmtpTransport::new(&config.smtp)?)
    };

    let context = MonitorContext::new();
    let pipeline = Arc::new(IngestionPipeline::new(
        context.clone(),
        config.smtp.recipient.clone(),
        Dispatcher::new(transport),
    ));
    let shutdown = CancellationToken::new();

    let listener = StatusServer::bind(config.status.listen).await?;
    let status_server = StatusServer::new(
        context.counter.clone(),
        config.status.stream_interval,
        shutdown.clone(),
    );
    let status_task = tokio::spawn(status_server.serve(listener));

    let mut mqtt_client = MqttClient::new(&config.mqtt);
    mqtt_client.add_subscription(config.topic.clone());

    let (msg_tx, msg_rx) = mpsc::channel(100);
    let (connected_tx, connected_rx) = oneshot::channel();
    let mut mqtt_task = tokio::spawn(mqtt_client.run(
        msg_tx,
        Some(connected_tx),
        shutdown.clone(),
    ));

    let connect_timeout = Duration::from_secs(CONNECT_TIMEOUT_SECS);
    match tokio::time::timeout(connect_timeout, connected_rx).await {
        Ok(Ok(())) => info!("[MQTT] Connection established"),
        _ => {
            shutdown.cancel();
            let _ = mqtt_task.await;
            let _ = status_task.await;
            return Err(StartupError::ConnectTimeout(CONNECT_TIMEOUT_SECS));
        }
    }

    let pipeline_task = tokio::spawn(pipeline.run(msg_rx, shutdown.clone()));

    info!("Rook is running, press Ctrl+C to exit");
    let mqtt_finished = tokio::select! {
        _ = shutdown_signal() => {
            info!("Received shutdown signal");
            false
        }
        _ = &mut mqtt_task => {
            warn!("MQTT event loop ended");
            true
        }
    };

    shutdown.cancel();
    if !mqtt_finished {
        let _ = mqtt_task.await;
    }
    let _ = pipeline_task.await;
    let _ = status_task.await;

    info!(
        "Rook stopped after {} message(s) from {} device(s)",
        context.counter.get(),
        context.devices.len()
    );
    Ok(())
}
