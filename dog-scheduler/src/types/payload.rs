use serde::{Deserialize, Serialize};

use crate::{SchedulerError, SchedulerResult};

/// Data needed to deliver one email
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailPayload {
    /// Destination address
    pub recipient: String,

    /// Subject line
    pub subject: String,

    /// Plain-text body
    pub body: String,
}

impl EmailPayload {
    pub fn new(
        recipient: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            recipient: recipient.into(),
            subject: subject.into(),
            body: body.into(),
        }
    }

    /// Reject payloads with absent or blank required fields
    pub fn validate(&self) -> SchedulerResult<()> {
        let missing: Vec<&str> = [
            ("recipient", &self.recipient),
            ("subject", &self.subject),
            ("body", &self.body),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
        .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(SchedulerError::InvalidPayload(format!(
                "Missing required fields: {}",
                missing.join(", ")
            )))
        }
    }
}
