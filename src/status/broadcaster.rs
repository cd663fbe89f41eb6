//! Per-observer status push loop.

use super::StatusSnapshot;
use crate::context::EventCounter;
use futures_util::{SinkExt, StreamExt};
use log::{debug, error};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::MissedTickBehavior;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

/// Push a [`StatusSnapshot`] to one observer every `period`.
///
/// Runs until the peer closes the connection, a write fails, or `shutdown`
/// is cancelled. Returns the number of snapshots sent.
pub async fn stream_status<S>(
    ws: WebSocketStream<S>,
    counter: EventCounter,
    period: Duration,
    shutdown: CancellationToken,
) -> usize
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (mut sink, mut incoming) = ws.split();
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut sent = 0;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                let _ = sink.send(Message::Close(None)).await;
                break;
            }
            frame = incoming.next() => match frame {
                Some(Ok(Message::Close(_))) | None => {
                    debug!("[Status] Observer closed the stream");
                    break;
                }
                Some(Err(e)) => {
                    debug!("[Status] Observer read error: {}", e);
                    break;
                }
                // Pings are answered by tungstenite; anything else is ignored.
                Some(Ok(_)) => {}
            },
            _ = ticker.tick() => {
                let text = match serde_json::to_string(&StatusSnapshot::capture(&counter)) {
                    Ok(text) => text,
                    Err(e) => {
                        error!("[Status] Failed to encode snapshot: {}", e);
                        break;
                    }
                };
                if let Err(e) = sink.send(Message::Text(text.into())).await {
                    debug!("[Status] Observer write failed: {}", e);
                    break;
                }
                sent += 1;
            }
        }
    }

    sent
}
