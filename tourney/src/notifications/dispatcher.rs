//! Fire-and-forget delivery with bounded retries.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use tokio::task::JoinHandle;

use super::{Notifier, NotifyResult, Outbound};

/// Default delivery attempts per message
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default delay before the first retry; doubles each attempt
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(200);

/// Dispatches messages on background tasks after the owning transaction
/// commits. Delivery failures are logged and never reach the caller.
#[derive(Clone)]
pub struct NotificationDispatcher {
    notifier: Arc<dyn Notifier>,
    max_attempts: u32,
    retry_backoff: Duration,
}

impl NotificationDispatcher {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self {
            notifier,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
        }
    }

    /// Override the retry policy
    pub fn with_retry(mut self, max_attempts: u32, retry_backoff: Duration) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.retry_backoff = retry_backoff;
        self
    }

    /// Spawn delivery of a batch of messages
    ///
    /// Returns immediately. The handle is only useful to callers that want
    /// to wait for delivery, such as shutdown paths.
    pub fn dispatch(&self, messages: Vec<Outbound>) -> JoinHandle<()> {
        let notifier = Arc::clone(&self.notifier);
        let max_attempts = self.max_attempts;
        let backoff = self.retry_backoff;

        tokio::spawn(async move {
            for message in messages {
                deliver(notifier.as_ref(), &message, max_attempts, backoff).await;
            }
        })
    }
}

async fn send(notifier: &dyn Notifier, message: &Outbound) -> NotifyResult<()> {
    match message {
        Outbound::InApp(notification) => notifier.notify(notification).await,
        Outbound::Email { to, subject, body } => notifier.send_email(to, subject, body).await,
        Outbound::Sms { to, body } => notifier.send_sms(to, body).await,
    }
}

async fn deliver(notifier: &dyn Notifier, message: &Outbound, max_attempts: u32, backoff: Duration) {
    let mut delay = backoff;
    for attempt in 1..=max_attempts {
        match send(notifier, message).await {
            Ok(()) => {
                debug!("Delivered {} notification on attempt {}", message.channel(), attempt);
                return;
            }
            Err(e) if attempt < max_attempts => {
                debug!(
                    "Notification attempt {}/{} over {} failed: {}",
                    attempt,
                    max_attempts,
                    message.channel(),
                    e
                );
                tokio::time::sleep(delay).await;
                delay = delay.saturating_mul(2);
            }
            Err(e) => {
                warn!(
                    "Dropping {} notification after {} attempts: {}",
                    message.channel(),
                    max_attempts,
                    e
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifications::{Notification, NotificationKind, NotifyError};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Fails the first `failures` sends, then records
    struct Flaky {
        failures: Mutex<u32>,
        delivered: Mutex<Vec<Outbound>>,
    }

    impl Flaky {
        fn new(failures: u32) -> Self {
            Self {
                failures: Mutex::new(failures),
                delivered: Mutex::new(Vec::new()),
            }
        }

        fn attempt(&self, message: Outbound) -> NotifyResult<()> {
            let mut failures = self.failures.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                return Err(NotifyError::Transport("unavailable".to_string()));
            }
            self.delivered.lock().unwrap().push(message);
            Ok(())
        }
    }

    #[async_trait]
    impl Notifier for Flaky {
        async fn notify(&self, notification: &Notification) -> NotifyResult<()> {
            self.attempt(Outbound::InApp(notification.clone()))
        }

        async fn send_email(&self, to: &str, subject: &str, body: &str) -> NotifyResult<()> {
            self.attempt(Outbound::Email {
                to: to.to_string(),
                subject: subject.to_string(),
                body: body.to_string(),
            })
        }

        async fn send_sms(&self, to: &str, body: &str) -> NotifyResult<()> {
            self.attempt(Outbound::Sms {
                to: to.to_string(),
                body: body.to_string(),
            })
        }
    }

    fn message() -> Outbound {
        Outbound::InApp(Notification::new(7, NotificationKind::ReportNew, "hello"))
    }

    #[tokio::test]
    async fn test_retries_until_delivered() {
        let notifier = Arc::new(Flaky::new(2));
        let dispatcher = NotificationDispatcher::new(notifier.clone())
            .with_retry(3, Duration::from_millis(1));

        dispatcher.dispatch(vec![message()]).await.unwrap();

        assert_eq!(notifier.delivered.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let notifier = Arc::new(Flaky::new(5));
        let dispatcher = NotificationDispatcher::new(notifier.clone())
            .with_retry(2, Duration::from_millis(1));

        dispatcher.dispatch(vec![message(), message()]).await.unwrap();

        // First message burns 2 failures, second burns 2 more
        assert!(notifier.delivered.lock().unwrap().is_empty());
        assert_eq!(*notifier.failures.lock().unwrap(), 1);
    }
}
