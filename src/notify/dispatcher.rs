use super::{NotificationRequest, NotificationTransport};
use crate::error::DispatchError;
use async_trait::async_trait;
use log::{debug, info};
use std::sync::Arc;

/// Sends notifications through a transport, once, without retry.
#[derive(Clone)]
pub struct Dispatcher {
    transport: Arc<dyn NotificationTransport>,
}

impl Dispatcher {
    pub fn new(transport: Arc<dyn NotificationTransport>) -> Self {
        Self { transport }
    }

    /// Make a single delivery attempt for `request`.
    ///
    /// Failures are returned to the caller to log; the device state has
    /// already been committed, so a failed send is never repeated.
    pub async fn dispatch(&self, request: &NotificationRequest) -> Result<(), DispatchError> {
        debug!(
            "[Notify] Sending '{}' for {} to {}",
            request.body, request.subject, request.recipient
        );
        self.transport
            .send(&request.recipient, &request.subject, &request.body)
            .await
    }
}

/// Transport used with `--dry-run`: logs the notification and succeeds.
#[derive(Debug, Default)]
pub struct LogTransport;

#[async_trait]
impl NotificationTransport for LogTransport {
    async fn send(&self, recipient: &str, subject: &str, body: &str) -> Result<(), DispatchError> {
        info!(
            "[Notify] (dry run) To: {} Subject: {} Body: {}",
            recipient, subject, body
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::testing::RecordingTransport;

    fn request() -> NotificationRequest {
        NotificationRequest {
            recipient: "me@gmail.com".to_string(),
            subject: "mostert/motion/hall".to_string(),
            body: "Motion detected".to_string(),
        }
    }

    #[tokio::test]
    async fn test_dispatch_forwards_request() {
        let transport = Arc::new(RecordingTransport::default());
        let dispatcher = Dispatcher::new(transport.clone());

        dispatcher.dispatch(&request()).await.unwrap();
        assert_eq!(transport.sent(), vec![request()]);
    }

    #[tokio::test]
    async fn test_dispatch_failure_is_single_attempt() {
        let transport = Arc::new(RecordingTransport::failing());
        let dispatcher = Dispatcher::new(transport.clone());

        let err = dispatcher.dispatch(&request()).await.unwrap_err();
        assert!(matches!(err, DispatchError::Transport(_)));
        assert_eq!(transport.attempts(), 1);
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn test_log_transport_succeeds() {
        let dispatcher = Dispatcher::new(Arc::new(LogTransport));
        tokio_test::assert_ok!(dispatcher.dispatch(&request()).await);
    }
}
