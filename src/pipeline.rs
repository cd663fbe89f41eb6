//! Ingestion pipeline: MQTT message → decode → edge detection → notification.

use crate::context::MonitorContext;
use crate::error::DecodeError;
use crate::input::mqtt::MqttMessage;
use crate::notify::{Dispatcher, NotificationRequest};
use crate::sensors::{self, EdgeDetector};
use log::{debug, error, info, warn};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// How long in-flight notifications may take to finish after shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Terminal state of one inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageOutcome {
    DecodeFailed,
    NoTransition,
    Notified,
    NotificationFailed,
}

pub struct IngestionPipeline {
    context: Arc<MonitorContext>,
    detector: EdgeDetector,
    dispatcher: Dispatcher,
}

impl IngestionPipeline {
    pub fn new(
        context: Arc<MonitorContext>,
        recipient: impl Into<String>,
        dispatcher: Dispatcher,
    ) -> Self {
        let detector = EdgeDetector::new(context.devices.clone(), recipient);
        Self {
            context,
            detector,
            dispatcher,
        }
    }

    pub fn context(&self) -> &Arc<MonitorContext> {
        &self.context
    }

    /// Decode `msg` and run edge detection, without sending anything.
    ///
    /// A decode failure is logged and leaves the counter and device store
    /// untouched.
    pub fn ingest(&self, msg: &MqttMessage) -> Result<Option<NotificationRequest>, DecodeError> {
        debug!(
            "[Pipeline] TOPIC: {} MSG: {}",
            msg.topic,
            sensors::payload_preview(&msg.payload)
        );

        let reading = sensors::decode(&msg.topic, &msg.payload).inspect_err(|e| {
            warn!(
                "[Pipeline] {} (payload: {})",
                e,
                sensors::payload_preview(&msg.payload)
            );
        })?;

        let count = self.context.counter.increment();
        debug!("[Pipeline] #{} {}", count, reading);

        let request = self.detector.process(&reading);
        if let Some(request) = &request {
            info!(
                "[Pipeline] {} on {} (battery {}%)",
                request.body, reading.device_id, reading.battery
            );
            debug!(
                "[Pipeline] {} device(s) tracked",
                self.context.devices.len()
            );
        }
        Ok(request)
    }

    /// Send a notification produced by [`ingest`](Self::ingest) and log the result.
    pub async fn deliver(&self, request: &NotificationRequest) -> MessageOutcome {
        match self.dispatcher.dispatch(request).await {
            Ok(()) => MessageOutcome::Notified,
            Err(e) => {
                error!(
                    "[Pipeline] Notification '{}' for {} failed: {}",
                    request.body, request.subject, e
                );
                MessageOutcome::NotificationFailed
            }
        }
    }

    /// Handle one message end to end.
    pub async fn process(&self, msg: &MqttMessage) -> MessageOutcome {
        match self.ingest(msg) {
            Err(_) => MessageOutcome::DecodeFailed,
            Ok(None) => MessageOutcome::NoTransition,
            Ok(Some(request)) => self.deliver(&request).await,
        }
    }

    /// Consume messages until the channel closes or `shutdown` is cancelled.
    ///
    /// Transition decisions run inline, in arrival order. Notifications are
    /// sent on separate tasks so a slow mail server does not hold up
    /// ingestion; each device's notifications still go out in the order its
    /// transitions happened.
    pub async fn run(
        self: Arc<Self>,
        mut rx: mpsc::Receiver<MqttMessage>,
        shutdown: CancellationToken,
    ) {
        info!("[Pipeline] Waiting for messages...");
        let mut in_flight = JoinSet::new();
        // Completion signal of the latest send per device.
        let mut last_send: HashMap<String, oneshot::Receiver<()>> = HashMap::new();

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                Some(done) = in_flight.join_next(), if !in_flight.is_empty() => {
                    if let Err(e) = done {
                        error!("[Pipeline] Notification task failed: {}", e);
                    }
                }
                msg = rx.recv() => {
                    let Some(msg) = msg else {
                        info!("[Pipeline] Message channel closed");
                        break;
                    };
                    if let Ok(Some(request)) = self.ingest(&msg) {
                        let (done_tx, done_rx) = oneshot::channel();
                        let previous = last_send.insert(request.subject.clone(), done_rx);
                        let pipeline = self.clone();
                        in_flight.spawn(async move {
                            if let Some(previous) = previous {
                                // Err only means the earlier task was aborted.
                                let _ = previous.await;
                            }
                            let outcome = pipeline.deliver(&request).await;
                            let _ = done_tx.send(());
                            outcome
                        });
                    }
                }
            }
        }

        if !in_flight.is_empty() {
            info!(
                "[Pipeline] Waiting for {} notification(s) to finish",
                in_flight.len()
            );
            let drained = tokio::time::timeout(SHUTDOWN_GRACE, async {
                while in_flight.join_next().await.is_some() {}
            })
            .await;
            if drained.is_err() {
                warn!(
                    "[Pipeline] Abandoning {} notification(s) after {:?}",
                    in_flight.len(),
                    SHUTDOWN_GRACE
                );
                in_flight.abort_all();
            }
        }
        info!("[Pipeline] Stopped");
    }
}
