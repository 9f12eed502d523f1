//! Dead-letter records
//!
//! A dead letter is published on `dlq.<subject>` and carries the original
//! bytes untouched, so an operator can replay it onto the source subject.

use chrono::{DateTime, Utc};
use event_bus::redelivery::{retry_with_backoff, RedeliveryPolicy};
use event_bus::subjects::dead_letter_subject;
use event_bus::{BusResult, EventBus};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetter {
    pub subject: String,
    pub group: String,
    pub attempt: u32,
    pub error: String,
    pub failed_at: DateTime<Utc>,
    /// Original payload; JSON when it parsed, otherwise a lossy UTF-8 string
    pub payload: serde_json::Value,
}

impl DeadLetter {
    pub fn new(subject: &str, group: &str, attempt: u32, error: &str, raw: &[u8]) -> Self {
        let payload = serde_json::from_slice(raw)
            .unwrap_or_else(|_| serde_json::Value::String(String::from_utf8_lossy(raw).into_owned()));

        Self {
            subject: subject.to_string(),
            group: group.to_string(),
            attempt,
            error: error.to_string(),
            failed_at: Utc::now(),
            payload,
        }
    }
}

/// Publish `letter` on its dead-letter subject, retrying briefly.
pub(crate) async fn publish_dead_letter(bus: &dyn EventBus, letter: &DeadLetter) -> BusResult<()> {
    let subject = dead_letter_subject(&letter.subject);
    let payload = serde_json::to_vec(letter)?;

    let policy = RedeliveryPolicy {
        max_deliver: 3,
        initial_backoff: Duration::from_millis(50),
        max_backoff: Duration::from_millis(500),
        ..RedeliveryPolicy::default()
    };

    retry_with_backoff(
        || bus.publish(&subject, payload.clone()),
        &policy,
        "publish_dead_letter",
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_payload_kept_structured() {
        let letter = DeadLetter::new("report.requested", "reporting", 5, "boom", br#"{"a":1}"#);
        assert_eq!(letter.payload["a"], 1);
        assert_eq!(letter.attempt, 5);
    }

    #[test]
    fn test_non_json_payload_kept_as_text() {
        let letter = DeadLetter::new("report.requested", "reporting", 1, "bad", b"not json");
        assert_eq!(letter.payload, serde_json::Value::String("not json".into()));
    }
}
