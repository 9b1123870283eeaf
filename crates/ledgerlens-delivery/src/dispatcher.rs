//! Routes a payload to the channel registered for a delivery method.

use ledgerlens_core::{DeliveryMethod, LedgerLensConfig, ReportError, Result};
use std::collections::HashMap;
use std::sync::Arc;

use crate::channel::{DeliveryChannel, DeliveryPayload};
use crate::email::{EmailChannel, SmtpMailer};
use crate::slack::SlackChannel;
use crate::webhook::WebhookChannel;

#[derive(Default)]
pub struct Dispatcher {
    channels: HashMap<DeliveryMethod, Arc<dyn DeliveryChannel>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build channels for every configured delivery section.
    pub fn from_config(config: &LedgerLensConfig) -> Result<Self> {
        let mut dispatcher = Self::new();
        if let Some(email) = &config.email {
            let mailer = SmtpMailer::new(email)?;
            dispatcher.register(Arc::new(EmailChannel::new(email, Box::new(mailer))?));
        }
        if let Some(slack) = &config.slack {
            dispatcher.register(Arc::new(SlackChannel::new(slack)));
        }
        if let Some(webhook) = &config.webhook {
            dispatcher.register(Arc::new(WebhookChannel::new(webhook)));
        }
        Ok(dispatcher)
    }

    /// Register a channel, replacing any previous one for its method.
    pub fn register(&mut self, channel: Arc<dyn DeliveryChannel>) {
        let method = channel.method();
        if self.channels.insert(method, channel).is_some() {
            tracing::warn!("⚠️ Replaced delivery channel for {method}");
        } else {
            tracing::debug!("📮 Registered delivery channel: {method}");
        }
    }

    pub fn supports(&self, method: DeliveryMethod) -> bool {
        self.channels.contains_key(&method)
    }

    pub fn methods(&self) -> Vec<DeliveryMethod> {
        let mut methods: Vec<_> = self.channels.keys().copied().collect();
        methods.sort_by_key(|m| m.as_str());
        methods
    }

    pub async fn dispatch(&self, method: DeliveryMethod, payload: &DeliveryPayload) -> Result<()> {
        let channel = self.channels.get(&method).ok_or_else(|| {
            ReportError::delivery(method.as_str(), "no channel configured for this delivery method")
        })?;
        channel.deliver(payload).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::fixtures;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingChannel {
        method: DeliveryMethod,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl DeliveryChannel for CountingChannel {
        fn method(&self) -> DeliveryMethod {
            self.method
        }

        async fn deliver(&self, _payload: &DeliveryPayload) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_dispatch_routes_by_method() {
        let slack = Arc::new(CountingChannel {
            method: DeliveryMethod::Slack,
            calls: AtomicUsize::new(0),
        });
        let mut dispatcher = Dispatcher::new();
        dispatcher.register(slack.clone());
        assert!(dispatcher.supports(DeliveryMethod::Slack));
        assert_eq!(dispatcher.methods(), vec![DeliveryMethod::Slack]);

        let payload = fixtures::payload(&[]);
        dispatcher.dispatch(DeliveryMethod::Slack, &payload).await.unwrap();
        assert_eq!(slack.calls.load(Ordering::SeqCst), 1);

        let err = dispatcher.dispatch(DeliveryMethod::Email, &payload).await.unwrap_err();
        assert!(matches!(err, ReportError::Delivery { ref channel, .. } if channel == "email"));
    }

    #[test]
    fn test_from_config_registers_configured_sections() {
        let config: LedgerLensConfig = toml::from_str(
            r#"
            [slack]
            webhook_url = "https://hooks.slack.test/x"

            [webhook]
            url = "https://hooks.test/reports"
            "#,
        )
        .unwrap();
        let dispatcher = Dispatcher::from_config(&config).unwrap();
        assert_eq!(dispatcher.methods(), vec![DeliveryMethod::Slack, DeliveryMethod::Webhook]);
        assert!(!dispatcher.supports(DeliveryMethod::Email));
    }
}
