//! Email delivery for magic links.
//!
//! Handlers never talk to SMTP directly. They [`submit`](MailQueue::submit)
//! messages to a bounded queue drained by a background worker; submission
//! never blocks and delivery failures are logged, not returned.

use lettre::{
    message::MultiPart, transport::smtp::authentication::Credentials, AsyncSmtpTransport,
    AsyncTransport, Message, Tokio1Executor,
};
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Messages waiting for the worker beyond this are dropped.
pub const MAIL_QUEUE_CAPACITY: usize = 256;

pub const VERIFICATION_SUBJECT: &str = "Auth Verification";

/// SMTP configuration.
#[derive(Clone, Deserialize)]
pub struct EmailConfig {
    /// SMTP server hostname.
    pub host: String,
    /// SMTP server port.
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    /// SMTP username (optional for local testing).
    #[serde(default)]
    pub user: Option<String>,
    /// SMTP password (optional for local testing).
    #[serde(default)]
    pub pass: Option<String>,
    /// From email address.
    pub from_email: String,
    /// From display name.
    #[serde(default = "default_from_name")]
    pub from_name: String,
}

fn default_smtp_port() -> u16 {
    587
}

fn default_from_name() -> String {
    "Ebookchi".to_string()
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: default_smtp_port(),
            user: None,
            pass: None,
            from_email: "no-reply@localhost".to_string(),
            from_name: default_from_name(),
        }
    }
}

impl std::fmt::Debug for EmailConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("from_email", &self.from_email)
            .field("from_name", &self.from_name)
            .finish_non_exhaustive()
    }
}

/// Errors that can occur when sending email.
#[derive(Debug, Error)]
pub enum EmailError {
    #[error("Failed to build email: {0}")]
    Message(String),
    #[error("Failed to send email: {0}")]
    Transport(String),
    #[error("Email sending is not configured")]
    NotConfigured,
}

/// A rendered message waiting to be sent.
#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub html: String,
    pub text: String,
}

/// Builds the sign-in email for a magic link.
pub fn verification_email(to: &str, link: &str, ttl_minutes: i64) -> OutgoingEmail {
    let text = format!(
        "Hi,\n\n\
         Click the link below to sign in to Ebookchi:\n\n\
         {link}\n\n\
         This link expires in {ttl_minutes} minutes and can only be used once.\n\n\
         If you didn't request this, you can ignore this email.\n\n\
         - Ebookchi"
    );

    let html = format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="UTF-8">
  <meta name="viewport" content="width=device-width, initial-scale=1">
  <title>Sign in to Ebookchi</title>
</head>
<body style="background-color: #f4f4f4; margin: 0; padding: 0;">
  <table border="0" cellpadding="0" cellspacing="0" width="100%">
    <tr>
      <td align="center" style="padding: 40px 10px;">
        <table border="0" cellpadding="0" cellspacing="0" width="600" style="background-color: #ffffff; border-radius: 4px;">
          <tr>
            <td align="center" style="padding: 40px 20px 20px; font-family: Helvetica, Arial, sans-serif;">
              <h1 style="font-size: 36px; font-weight: 400; margin: 0;">Welcome!</h1>
            </td>
          </tr>
          <tr>
            <td align="left" style="padding: 20px 30px; font-family: Helvetica, Arial, sans-serif; font-size: 16px; line-height: 24px;">
              <p style="margin: 0;">Press the button below to sign in. The link expires in {ttl_minutes} minutes and works once.</p>
            </td>
          </tr>
          <tr>
            <td align="center" style="padding: 0 30px 40px;">
              <a href="{link}" target="_blank" style="font-size: 20px; font-family: Helvetica, Arial, sans-serif; color: #ffffff; background-color: #FFA73B; text-decoration: none; padding: 15px 30px; border-radius: 3px; display: inline-block;">Sign in</a>
            </td>
          </tr>
          <tr>
            <td align="center" style="padding: 0 30px 30px; font-family: Helvetica, Arial, sans-serif; font-size: 12px; line-height: 18px; color: #666666;">
              <p style="margin: 0;">If you didn't request this email, no further action is required.</p>
            </td>
          </tr>
        </table>
      </td>
    </tr>
  </table>
</body>
</html>
"#
    );

    OutgoingEmail {
        to: to.to_string(),
        subject: VERIFICATION_SUBJECT.to_string(),
        html,
        text,
    }
}

/// SMTP email sender.
#[derive(Clone)]
pub struct EmailSender {
    config: EmailConfig,
}

impl EmailSender {
    /// Creates a new email sender with the given configuration.
    pub fn new(config: EmailConfig) -> Self {
        Self { config }
    }

    /// Sends one message and waits for the server to accept it.
    pub async fn send(&self, email: &OutgoingEmail) -> Result<(), EmailError> {
        let from = format!("{} <{}>", self.config.from_name, self.config.from_email);

        let message = Message::builder()
            .from(
                from.parse()
                    .map_err(|e| EmailError::Message(format!("{}", e)))?,
            )
            .to(email
                .to
                .parse()
                .map_err(|e| EmailError::Message(format!("{}", e)))?)
            .subject(email.subject.clone())
            .multipart(MultiPart::alternative_plain_html(
                email.text.clone(),
                email.html.clone(),
            ))
            .map_err(|e| EmailError::Message(e.to_string()))?;

        let transport = self.build_transport()?;

        transport
            .send(message)
            .await
            .map_err(|e| EmailError::Transport(e.to_string()))?;

        Ok(())
    }

    /// Builds the SMTP transport.
    fn build_transport(&self) -> Result<AsyncSmtpTransport<Tokio1Executor>, EmailError> {
        let mut builder = if self.config.port == 465 {
            // SSL/TLS on port 465
            AsyncSmtpTransport::<Tokio1Executor>::relay(&self.config.host)
                .map_err(|e| EmailError::Transport(e.to_string()))?
                .port(465)
        } else if self.config.port == 587 {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.config.host)
                .map_err(|e| EmailError::Transport(e.to_string()))?
                .port(587)
        } else {
            // Plain SMTP for local sandboxes (mailpit, mailtrap on 2525, ...)
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&self.config.host)
                .port(self.config.port)
        };

        if let (Some(user), Some(pass)) = (&self.config.user, &self.config.pass) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }

        Ok(builder.build())
    }
}

impl std::fmt::Debug for EmailSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailSender")
            .field("host", &self.config.host)
            .field("port", &self.config.port)
            .field("from_email", &self.config.from_email)
            .finish()
    }
}

/// Non-blocking handle for queueing outgoing mail.
#[derive(Debug, Clone)]
pub struct MailQueue {
    tx: mpsc::Sender<OutgoingEmail>,
}

impl MailQueue {
    /// Creates a queue and the receiver a worker drains.
    pub fn channel() -> (Self, mpsc::Receiver<OutgoingEmail>) {
        Self::with_capacity(MAIL_QUEUE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> (Self, mpsc::Receiver<OutgoingEmail>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// Queues a message without waiting. Returns `false` if it was dropped.
    pub fn submit(&self, email: OutgoingEmail) -> bool {
        match self.tx.try_send(email) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(email)) => {
                tracing::warn!(to = %email.to, "Mail queue full, dropping message");
                false
            }
            Err(mpsc::error::TrySendError::Closed(email)) => {
                tracing::error!(to = %email.to, "Mail worker is gone, dropping message");
                false
            }
        }
    }
}

/// Spawns the task that delivers queued mail until every queue handle is
/// dropped.
///
/// With no sender configured, messages are discarded with a warning.
pub fn spawn_mail_worker(
    sender: Option<EmailSender>,
    mut rx: mpsc::Receiver<OutgoingEmail>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(email) = rx.recv().await {
            let result = match &sender {
                Some(sender) => sender.send(&email).await,
                None => Err(EmailError::NotConfigured),
            };

            match result {
                Ok(()) => tracing::info!(to = %email.to, subject = %email.subject, "Sent email"),
                Err(e) => tracing::warn!(to = %email.to, "Email not delivered: {}", e),
            }
        }
        tracing::debug!("Mail worker stopped");
    })
}
