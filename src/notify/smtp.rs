//! E-mail notification transport.

use super::NotificationTransport;
use crate::config::SmtpConfig;
use crate::error::{DispatchError, StartupError};
use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use log::info;

/// Sends plain-text e-mail through an authenticated SMTP relay over
/// implicit TLS (port 465).
pub struct SmtpTransport {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

fn parse_mailbox(address: &str) -> Result<Mailbox, DispatchError> {
    address
        .parse()
        .map_err(|e: lettre::address::AddressError| DispatchError::InvalidAddress {
            address: address.to_string(),
            reason: e.to_string(),
        })
}

impl SmtpTransport {
    /// Build a transport for `config`. The SMTP username is also the sender.
    pub fn new(config: &SmtpConfig) -> Result<Self, StartupError> {
        let from =
            parse_mailbox(&config.username).map_err(|e| StartupError::Smtp(e.to_string()))?;

        let mailer = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
            .map_err(|e| StartupError::Smtp(e.to_string()))?
            .credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ))
            .build();

        info!("[Notify] SMTP relay {} as {}", config.host, config.username);
        Ok(Self { mailer, from })
    }

    fn build_message(
        &self,
        recipient: &str,
        subject: &str,
        body: &str,
    ) -> Result<Message, DispatchError> {
        Message::builder()
            .from(self.from.clone())
            .to(parse_mailbox(recipient)?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .map_err(|e| DispatchError::Message(e.to_string()))
    }
}

#[async_trait]
impl NotificationTransport for SmtpTransport {
    async fn send(&self, recipient: &str, subject: &str, body: &str) -> Result<(), DispatchError> {
        let message = self.build_message(recipient, subject, body)?;
        self.mailer
            .send(message)
            .await
            .map_err(|e| DispatchError::Transport(e.to_string()))?;
        info!("[Notify] E-mail sent to {}: {} - {}", recipient, subject, body);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(username: &str) -> SmtpConfig {
        SmtpConfig {
            host: "smtp.gmail.com".to_string(),
            username: username.to_string(),
            password: "app-password".to_string(),
            recipient: username.to_string(),
        }
    }

    #[test]
    fn test_invalid_sender_rejected() {
        let result = SmtpTransport::new(&config("not an address"));
        assert!(matches!(result, Err(StartupError::Smtp(_))));
    }

    #[test]
    fn test_build_message() {
        let transport = SmtpTransport::new(&config("me@gmail.com")).unwrap();
        let message = transport
            .build_message("me@gmail.com", "mostert/motion/hall", "Motion detected")
            .unwrap();

        let raw = String::from_utf8(message.formatted()).unwrap();
        assert!(raw.contains("Subject: mostert/motion/hall"));
        assert!(raw.contains("Motion detected"));
        assert!(raw.contains("To: me@gmail.com"));
    }

    #[test]
    fn test_invalid_recipient_rejected() {
        let transport = SmtpTransport::new(&config("me@gmail.com")).unwrap();
        let err = transport
            .build_message("nobody", "mostert/motion/hall", "Motion detected")
            .unwrap_err();
        assert!(matches!(err, DispatchError::InvalidAddress { .. }));
    }
}
