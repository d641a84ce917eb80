//! Notification port.
//!
//! Transports (mail, SMS gateways, push) live outside the engine. The engine
//! builds [`Outbound`] messages after a transaction commits and hands them to
//! a [`NotificationDispatcher`], which delivers them in the background.

pub mod dispatcher;
pub mod models;

use async_trait::async_trait;
use log::info;
use thiserror::Error;

pub use dispatcher::NotificationDispatcher;
pub use models::{Notification, NotificationKind, Outbound};

/// Notification delivery errors
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Invalid recipient: {0}")]
    InvalidRecipient(String),
}

/// Result type for notification delivery
pub type NotifyResult<T> = Result<T, NotifyError>;

/// Outbound notification transport
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Store or push an in-app notification
    async fn notify(&self, notification: &Notification) -> NotifyResult<()>;

    /// Send an email
    async fn send_email(&self, to: &str, subject: &str, body: &str) -> NotifyResult<()>;

    /// Send an SMS
    async fn send_sms(&self, to: &str, body: &str) -> NotifyResult<()>;
}

/// Notifier that writes every message to the log
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notification: &Notification) -> NotifyResult<()> {
        info!(
            "[notify] user={} type={} {}",
            notification.user_id, notification.kind, notification.message
        );
        Ok(())
    }

    async fn send_email(&self, to: &str, subject: &str, body: &str) -> NotifyResult<()> {
        if to.is_empty() {
            return Err(NotifyError::InvalidRecipient("empty email address".to_string()));
        }
        info!("[email] to={} subject={:?} {}", to, subject, body);
        Ok(())
    }

    async fn send_sms(&self, to: &str, body: &str) -> NotifyResult<()> {
        if to.is_empty() {
            return Err(NotifyError::InvalidRecipient("empty phone number".to_string()));
        }
        info!("[sms] to={} {}", to, body);
        Ok(())
    }
}
