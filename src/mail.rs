//! Send emails to user for important updates.

use std::borrow::Cow;

use async_trait::async_trait;
use serde::Serialize;

/// Mail templates list.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Template {
    /// Greets a new user and carries the activation token.
    Welcome,
}

/// Payload handed to a [`Mailer`].
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Content<'a> {
    pub to: Cow<'a, str>,
    pub template: Template,
    pub user_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub activation_token: Option<Cow<'a, str>>,
}

#[derive(Debug, thiserror::Error)]
#[error("mail delivery failed: {0}")]
pub struct MailError(pub String);

/// Outbound mail port.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, content: Content<'static>) -> Result<(), MailError>;
}

/// Mailer writing deliveries to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, content: Content<'static>) -> Result<(), MailError> {
        tracing::info!(
            to = %content.to,
            template = ?content.template,
            user_id = content.user_id,
            "mail delivered"
        );
        let payload =
            serde_json::to_string(&content).map_err(|e| MailError(e.to_string()))?;
        tracing::debug!(%payload, "mail payload");
        Ok(())
    }
}

/// Hand a mail to the mailer on a background task.
/// Failures are logged and never reach the caller.
pub fn dispatch(mailer: std::sync::Arc<dyn Mailer>, content: Content<'static>) {
    tokio::spawn(async move {
        let to = content.to.clone();
        if let Err(err) = mailer.send(content).await {
            tracing::error!(%to, error = %err, "mail not delivered");
        }
    });
}

#[cfg(test)]
pub mod tests {
    use parking_lot::Mutex;

    use super::*;

    /// Keeps every delivery for assertions.
    #[derive(Debug, Default)]
    pub struct MemoryMailer {
        pub sent: Mutex<Vec<Content<'static>>>,
    }

    #[async_trait]
    impl Mailer for MemoryMailer {
        async fn send(&self, content: Content<'static>) -> Result<(), MailError> {
            self.sent.lock().push(content);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_dispatch_runs_in_background() {
        let mailer = std::sync::Arc::new(MemoryMailer::default());
        dispatch(
            mailer.clone(),
            Content {
                to: "giovanna@gmail.com".into(),
                template: Template::Welcome,
                user_id: 1,
                activation_token: Some("GZDAMCLCS6QHZ6FBTVB4WKH3EI".into()),
            },
        );

        for _ in 0..50 {
            if !mailer.sent.lock().is_empty() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }

        let sent = mailer.sent.lock();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].template, Template::Welcome);
    }

    #[test]
    fn test_content_shape() {
        let content = Content {
            to: "a@b.c".into(),
            template: Template::Welcome,
            user_id: 3,
            activation_token: None,
        };

        assert_eq!(
            serde_json::to_string(&content).unwrap(),
            r#"{"to":"a@b.c","template":"welcome","user_id":3}"#
        );
    }
}
