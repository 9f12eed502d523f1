//! Acknowledgeable deliveries handed out by consumer-group subscriptions

use crate::{BusMessage, BusResult};
use async_trait::async_trait;
use std::fmt;
use std::time::Duration;

/// Broker-side settlement of one delivery.
///
/// Each method consumes the acker: a delivery is settled exactly once.
#[async_trait]
pub trait Acker: Send + Sync {
    /// Processing succeeded; never redeliver.
    async fn ack(self: Box<Self>) -> BusResult<()>;

    /// Processing failed; redeliver after `delay`.
    async fn nak(self: Box<Self>, delay: Duration) -> BusResult<()>;

    /// Stop redelivering. Used after the message was dead-lettered.
    async fn term(self: Box<Self>) -> BusResult<()>;
}

/// One delivery of a message to a consumer-group member.
pub struct Delivery {
    pub message: BusMessage,
    /// 1 on first delivery, incremented on every redelivery
    pub attempt: u32,
    acker: Box<dyn Acker>,
}

impl Delivery {
    pub fn new(message: BusMessage, attempt: u32, acker: Box<dyn Acker>) -> Self {
        Self {
            message,
            attempt,
            acker,
        }
    }

    pub fn subject(&self) -> &str {
        &self.message.subject
    }

    pub fn payload(&self) -> &[u8] {
        &self.message.payload
    }

    pub async fn ack(self) -> BusResult<()> {
        self.acker.ack().await
    }

    pub async fn nak(self, delay: Duration) -> BusResult<()> {
        self.acker.nak(delay).await
    }

    pub async fn term(self) -> BusResult<()> {
        self.acker.term().await
    }
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delivery")
            .field("subject", &self.message.subject)
            .field("attempt", &self.attempt)
            .field("payload_len", &self.message.payload.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    struct Recording(Arc<Mutex<Vec<String>>>);

    #[async_trait]
    impl Acker for Recording {
        async fn ack(self: Box<Self>) -> BusResult<()> {
            self.0.lock().unwrap().push("ack".into());
            Ok(())
        }
        async fn nak(self: Box<Self>, delay: Duration) -> BusResult<()> {
            self.0.lock().unwrap().push(format!("nak:{}", delay.as_millis()));
            Ok(())
        }
        async fn term(self: Box<Self>) -> BusResult<()> {
            self.0.lock().unwrap().push("term".into());
            Ok(())
        }
    }

    fn delivery(log: &Arc<Mutex<Vec<String>>>) -> Delivery {
        Delivery::new(
            BusMessage::new("report.requested".into(), b"{}".to_vec()),
            2,
            Box::new(Recording(log.clone())),
        )
    }

    #[test]
    fn test_settlement_reaches_acker() {
        let log = Arc::new(Mutex::new(Vec::new()));

        tokio_test::block_on(delivery(&log).ack()).unwrap();
        tokio_test::block_on(delivery(&log).nak(Duration::from_millis(250))).unwrap();
        tokio_test::block_on(delivery(&log).term()).unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["ack", "nak:250", "term"]);
    }

    #[test]
    fn test_debug_omits_payload_bytes() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let d = delivery(&log);
        assert_eq!(d.subject(), "report.requested");
        let rendered = format!("{:?}", d);
        assert!(rendered.contains("attempt: 2"));
        assert!(rendered.contains("payload_len: 2"));
    }
}
