//! Outbound motion notifications.
//!
//! The [`Dispatcher`] hands each [`NotificationRequest`] to a
//! [`NotificationTransport`]: e-mail via [`SmtpTransport`] in production, or
//! [`LogTransport`] for dry runs.

mod dispatcher;
mod smtp;

pub use dispatcher::{Dispatcher, LogTransport};
pub use smtp::SmtpTransport;

use crate::error::DispatchError;
use async_trait::async_trait;

/// A single alert produced by a motion transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationRequest {
    pub recipient: String,
    /// Device id the transition happened on.
    pub subject: String,
    pub body: String,
}

/// Delivers a notification to a recipient.
#[async_trait]
pub trait NotificationTransport: Send + Sync {
    async fn send(&self, recipient: &str, subject: &str, body: &str) -> Result<(), DispatchError>;
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    /// Transport that records every request and can be told to fail.
    #[derive(Default)]
    pub struct RecordingTransport {
        sent: Mutex<Vec<NotificationRequest>>,
        attempts: AtomicUsize,
        fail: AtomicBool,
        delays: Mutex<HashMap<String, Duration>>,
    }

    impl RecordingTransport {
        pub fn failing() -> Self {
            let transport = Self::default();
            transport.set_failing(true);
            transport
        }

        pub fn set_failing(&self, fail: bool) {
            self.fail.store(fail, Ordering::SeqCst);
        }

        /// Hold every send with this body for `delay` before recording it.
        pub fn delay_body(&self, body: &str, delay: Duration) {
            self.delays.lock().insert(body.to_string(), delay);
        }

        /// Successfully delivered requests, in order.
        pub fn sent(&self) -> Vec<NotificationRequest> {
            self.sent.lock().clone()
        }

        /// Delivery attempts, including failed ones.
        pub fn attempts(&self) -> usize {
            self.attempts.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl NotificationTransport for RecordingTransport {
        async fn send(
            &self,
            recipient: &str,
            subject: &str,
            body: &str,
        ) -> Result<(), DispatchError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            let delay = self.delays.lock().get(body).copied();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail.load(Ordering::SeqCst) {
                return Err(DispatchError::Transport("connection refused".to_string()));
            }
            self.sent.lock().push(NotificationRequest {
                recipient: recipient.to_string(),
                subject: subject.to_string(),
                body: body.to_string(),
            });
            Ok(())
        }
    }
}
