//! MQTT client wrapper delivering raw sensor payloads.

use crate::config::MqttConfig;
use log::{debug, error, info, warn};
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

/// Upper bound on flushing DISCONNECT during shutdown.
const DISCONNECT_TIMEOUT: Duration = Duration::from_secs(1);

/// Message received from the MQTT broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MqttMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

impl MqttMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}

/// MQTT client that forwards every publish on its subscriptions to a channel.
pub struct MqttClient {
    client: AsyncClient,
    event_loop: EventLoop,
    subscriptions: Vec<String>,
}

impl MqttClient {
    /// Create a new MQTT client from configuration.
    pub fn new(config: &MqttConfig) -> Self {
        let mut options =
            MqttOptions::new(&config.client_id, &config.broker_host, config.broker_port);
        options.set_keep_alive(Duration::from_secs(30));

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            options.set_credentials(username, password);
        }

        let (client, event_loop) = AsyncClient::new(options, 100);

        Self {
            client,
            event_loop,
            subscriptions: Vec::new(),
        }
    }

    /// Register a topic filter, subscribed at QoS 1 on every (re)connect.
    pub fn add_subscription(&mut self, topic: impl Into<String>) {
        self.subscriptions.push(topic.into());
    }

    fn resubscribe(&self) {
        for topic in &self.subscriptions {
            match self.client.try_subscribe(topic, QoS::AtLeastOnce) {
                Ok(()) => info!("[MQTT] Subscribed to topic: {}", topic),
                Err(e) => warn!("[MQTT] Failed to subscribe to {}: {:?}", topic, e),
            }
        }
    }

    /// Send DISCONNECT and keep polling until it has been written out.
    async fn disconnect(&mut self) {
        if let Err(e) = self.client.try_disconnect() {
            debug!("[MQTT] Disconnect request failed: {:?}", e);
            return;
        }

        let flushed = tokio::time::timeout(DISCONNECT_TIMEOUT, async {
            loop {
                match self.event_loop.poll().await {
                    Ok(Event::Outgoing(Outgoing::Disconnect)) => return true,
                    Ok(_) => {}
                    Err(e) => {
                        debug!("[MQTT] Connection error while disconnecting: {:?}", e);
                        return false;
                    }
                }
            }
        })
        .await;

        match flushed {
            Ok(true) => info!("[MQTT] Disconnected from broker"),
            Ok(false) => {}
            Err(_) => warn!(
                "[MQTT] Disconnect not sent within {:?}",
                DISCONNECT_TIMEOUT
            ),
        }
    }

    /// Run the MQTT event loop and forward publishes to `tx`.
    ///
    /// `connected` fires on the first CONNACK. The loop ends when `shutdown`
    /// is cancelled or the receiving side of `tx` is dropped; the broker
    /// connection is closed on the way out.
    pub async fn run(
        mut self,
        tx: mpsc::Sender<MqttMessage>,
        mut connected: Option<oneshot::Sender<()>>,
        shutdown: CancellationToken,
    ) {
        info!("[MQTT] Starting event loop");
        let mut online = false;

        loop {
            let event = tokio::select! {
                _ = shutdown.cancelled() => break,
                event = self.event_loop.poll() => event,
            };

            match event {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    info!("[MQTT] Connected to broker");
                    online = true;
                    self.resubscribe();
                    if let Some(signal) = connected.take() {
                        let _ = signal.send(());
                    }
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    debug!(
                        "[MQTT] Received {} bytes on {}",
                        publish.payload.len(),
                        publish.topic
                    );
                    let msg = MqttMessage {
                        topic: publish.topic,
                        payload: publish.payload.to_vec(),
                    };
                    if tx.send(msg).await.is_err() {
                        error!("[MQTT] Message channel closed");
                        break;
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    error!("[MQTT] Connection error: {:?}", e);
                    online = false;
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(Duration::from_secs(5)) => {}
                    }
                }
            }
        }

        if online {
            self.disconnect().await;
        }
        info!("[MQTT] Event loop stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    fn config() -> MqttConfig {
        config_for_port(1)
    }

    fn config_for_port(broker_port: u16) -> MqttConfig {
        MqttConfig {
            broker_host: "127.0.0.1".to_string(),
            broker_port,
            client_id: "rook_test".to_string(),
            username: Some("foo".to_string()),
            password: Some("bar".to_string()),
        }
    }

    #[test]
    fn test_message_new() {
        let msg = MqttMessage::new("mostert/motion/hall", &b"{\"Motion\":1}"[..]);
        assert_eq!(msg.topic, "mostert/motion/hall");
        assert_eq!(msg.payload, b"{\"Motion\":1}".to_vec());
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let mut client = MqttClient::new(&config());
        client.add_subscription("mostert/motion/#");

        let (tx, _rx) = mpsc::channel(4);
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(client.run(tx, None, shutdown.clone()));

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("event loop did not stop")
            .unwrap();
    }

    /// Read one MQTT control packet and return its first header byte.
    async fn read_packet(socket: &mut TcpStream) -> u8 {
        let header = socket.read_u8().await.unwrap();
        let mut remaining = 0usize;
        let mut shift = 0;
        loop {
            let byte = socket.read_u8().await.unwrap();
            remaining |= ((byte & 0x7f) as usize) << shift;
            if byte & 0x80 == 0 {
                break;
            }
            shift += 7;
        }
        let mut body = vec![0; remaining];
        socket.read_exact(&mut body).await.unwrap();
        header
    }

    #[tokio::test]
    async fn test_shutdown_sends_disconnect() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let broker = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            assert_eq!(read_packet(&mut socket).await, 0x10);
            socket.write_all(&[0x20, 0x02, 0x00, 0x00]).await.unwrap();

            let mut rest = Vec::new();
            let _ = socket.read_to_end(&mut rest).await;
            rest
        });

        let client = MqttClient::new(&config_for_port(port));
        let (tx, _rx) = mpsc::channel(4);
        let (connected_tx, connected_rx) = oneshot::channel();
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(client.run(tx, Some(connected_tx), shutdown.clone()));

        tokio::time::timeout(Duration::from_secs(5), connected_rx)
            .await
            .expect("no CONNACK")
            .unwrap();
        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("event loop did not stop")
            .unwrap();

        let rest = tokio::time::timeout(Duration::from_secs(5), broker)
            .await
            .expect("broker did not see the connection close")
            .unwrap();
        assert!(
            rest.windows(2).any(|w| w == [0xe0, 0x00]),
            "no DISCONNECT in {:02x?}",
            rest
        );
    }
}
