//! Log every message seen on the broker.
//!
//! Usage:
//!   cargo run --bin mqtt-dump -- --mqtt-server homeassistant.local
//!
//! Useful for finding the topics and payload shape a sensor publishes
//! before pointing `rook` at it.

use clap::Parser;
use log::{error, info};
use rook::config::{self, MqttArgs};
use rook::input::mqtt::MqttClient;
use rook::sensors::payload_preview;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "mqtt-dump")]
#[command(about = "Print every MQTT message matching a topic filter")]
struct Cli {
    #[command(flatten)]
    mqtt: MqttArgs,

    /// Topic filter to subscribe to
    #[arg(long, default_value = "#")]
    topic: String,
}

fn main() {
    config::load_dotenv();
    let cli = Cli::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to start runtime: {}", e);
            std::process::exit(1);
        }
    };
    runtime.block_on(dump(cli));
}

async fn dump(cli: Cli) {
    let config = cli.mqtt.to_config("mqtt_dump");
    info!(
        "Connecting to MQTT broker at {}:{}",
        config.broker_host, config.broker_port
    );

    let mut client = MqttClient::new(&config);
    client.add_subscription(cli.topic);

    let (msg_tx, mut msg_rx) = mpsc::channel(100);
    let shutdown = CancellationToken::new();
    let mqtt_handle = tokio::spawn(client.run(msg_tx, None, shutdown.clone()));

    info!("Waiting for Ctrl+C...");
    loop {
        tokio::select! {
            msg = msg_rx.recv() => match msg {
                Some(msg) => info!(
                    "Received message: {} from topic: {}",
                    payload_preview(&msg.payload),
                    msg.topic
                ),
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl+C received. Exiting gracefully...");
                break;
            }
        }
    }

    shutdown.cancel();
    let _ = mqtt_handle.await;
}
