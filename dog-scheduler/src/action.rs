use std::future::Future;
use async_trait::async_trait;

use crate::{DeliveryError, EmailPayload};

/// The side effect a job performs when it comes due.
///
/// Errors are expected and drive the retry policy; they never abort the
/// scheduler.
#[async_trait]
pub trait DeliveryAction: Send + Sync + 'static {
    async fn perform(&self, payload: &EmailPayload) -> Result<(), DeliveryError>;
}

/// Adapts an async closure into a [`DeliveryAction`]
pub struct FnAction<F> {
    f: F,
}

impl<F> FnAction<F> {
    pub fn new<Fut>(f: F) -> Self
    where
        F: Fn(EmailPayload) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), DeliveryError>> + Send + 'static,
    {
        Self { f }
    }
}

#[async_trait]
impl<F, Fut> DeliveryAction for FnAction<F>
where
    F: Fn(EmailPayload) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), DeliveryError>> + Send + 'static,
{
    async fn perform(&self, payload: &EmailPayload) -> Result<(), DeliveryError> {
        (self.f)(payload.clone()).await
    }
}

#[cfg(feature = "json")]
pub use self::json::JsonTransport;

#[cfg(feature = "json")]
mod json {
    use std::sync::Arc;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::{json, Value};
    use tracing::info;

    use super::DeliveryAction;
    use crate::{DeliveryError, EmailPayload};

    /// Offline transport: renders each message as a JSON envelope, logs it,
    /// and keeps it in an outbox instead of talking to a mail server.
    #[derive(Clone)]
    pub struct JsonTransport {
        sender: String,
        outbox: Arc<Mutex<Vec<Value>>>,
    }

    impl JsonTransport {
        pub fn new(sender: impl Into<String>) -> Self {
            Self {
                sender: sender.into(),
                outbox: Arc::new(Mutex::new(Vec::new())),
            }
        }

        pub fn sender(&self) -> &str {
            &self.sender
        }

        /// Envelopes delivered so far, oldest first
        pub fn outbox(&self) -> Vec<Value> {
            self.outbox.lock().clone()
        }

        pub fn envelope(&self, payload: &EmailPayload) -> Value {
            json!({
                "from": self.sender,
                "to": payload.recipient,
                "subject": payload.subject,
                "text": payload.body,
            })
        }
    }

    #[async_trait]
    impl DeliveryAction for JsonTransport {
        async fn perform(&self, payload: &EmailPayload) -> Result<(), DeliveryError> {
            payload
                .validate()
                .map_err(|e| DeliveryError::new(e.to_string()))?;

            let envelope = self.envelope(payload);
            info!(target: "dog_scheduler::outbox", "{}", envelope);
            self.outbox.lock().push(envelope);
            Ok(())
        }
    }
}
