//! The `email` channel: one plain-text SMTP message per recipient.
//!
//! The channel is provisioned only when `SMTP_HOST` is set.

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use warehouse_core::alert::Notification;

use super::{DeliveryError, NotificationSink};

const DEFAULT_SMTP_PORT: u16 = 587;
const DEFAULT_FROM_ADDRESS: &str = "alerts@warehouse.local";

/// Why an alert email was not sent.
#[derive(Debug, thiserror::Error)]
pub enum EmailError {
    /// The relay could not be reached, refused the credentials or rejected
    /// the message.
    #[error("SMTP transport error: {0}")]
    Transport(#[from] lettre::transport::smtp::Error),

    /// A sender or recipient is not a valid mailbox.
    #[error("Email address parse error: {0}")]
    Address(#[from] lettre::address::AddressError),

    /// Headers or body could not be assembled into a message.
    #[error("Email build error: {0}")]
    Build(#[from] lettre::error::Error),
}

/// SMTP settings.
///
/// | Variable        | Default                  |
/// |-----------------|--------------------------|
/// | `SMTP_HOST`     | required                 |
/// | `SMTP_PORT`     | `587` (STARTTLS)         |
/// | `SMTP_FROM`     | `alerts@warehouse.local` |
/// | `SMTP_USER`     | none                     |
/// | `SMTP_PASSWORD` | none                     |
#[derive(Debug, Clone)]
pub struct EmailConfig {
    /// Relay hostname; STARTTLS is always negotiated.
    pub smtp_host: String,
    pub smtp_port: u16,
    /// Sender mailbox on every alert email.
    pub from_address: String,
    /// Credentials are used only when both user and password are set.
    pub smtp_user: Option<String>,
    pub smtp_password: Option<String>,
}

impl EmailConfig {
    /// `None` when `SMTP_HOST` is unset.
    pub fn from_env() -> Option<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Option<Self> {
        Some(Self {
            smtp_host: lookup("SMTP_HOST").filter(|h| !h.is_empty())?,
            smtp_port: lookup("SMTP_PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(DEFAULT_SMTP_PORT),
            from_address: lookup("SMTP_FROM").unwrap_or_else(|| DEFAULT_FROM_ADDRESS.to_string()),
            smtp_user: lookup("SMTP_USER"),
            smtp_password: lookup("SMTP_PASSWORD"),
        })
    }
}

/// Sink for the `email` channel.
pub struct EmailDelivery {
    from_address: String,
    /// Pooled STARTTLS transport, shared by every send.
    mailer: AsyncSmtpTransport<Tokio1Executor>,
}

impl EmailDelivery {
    /// Build the SMTP transport. Connections are opened lazily on send.
    pub fn new(config: EmailConfig) -> Result<Self, EmailError> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)?
            .port(config.smtp_port);
        if let (Some(user), Some(pass)) = (config.smtp_user, config.smtp_password) {
            builder = builder.credentials(Credentials::new(user, pass));
        }
        Ok(Self {
            from_address: config.from_address,
            mailer: builder.build(),
        })
    }

    /// Send `notification` to a single mailbox.
    pub async fn deliver(&self, to: &str, notification: &Notification) -> Result<(), EmailError> {
        let message = build_message(&self.from_address, to, notification)?;
        self.mailer.send(message).await?;
        tracing::info!(to, subject = %notification.subject, "Alert email sent");
        Ok(())
    }
}

#[async_trait]
impl NotificationSink for EmailDelivery {
    /// Stops at the first recipient that fails.
    async fn notify(&self, notification: &Notification) -> Result<(), DeliveryError> {
        for recipient in &notification.recipients {
            self.deliver(recipient, notification).await?;
        }
        Ok(())
    }
}

/// Plain-text message; the body gains the alert name and raise time when
/// the notification carries an alert.
fn build_message(from: &str, to: &str, notification: &Notification) -> Result<Message, EmailError> {
    let body = match &notification.alert {
        Some(alert) => format!(
            "{}\n\nAlert: {alert}\nRaised at: {}",
            notification.body,
            notification.created_at.to_rfc3339()
        ),
        None => notification.body.clone(),
    };
    Ok(Message::builder()
        .from(from.parse()?)
        .to(to.parse()?)
        .subject(notification.subject.as_str())
        .header(ContentType::TEXT_PLAIN)
        .body(body)?)
}
