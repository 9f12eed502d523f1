use async_trait::async_trait;
use event_bus::EventEnvelope;
use std::future::Future;
use std::sync::Arc;

/// Why a handler could not finish.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// Broker, storage or collaborator trouble. The delivery is retried.
    #[error("retriable: {0}")]
    Retriable(String),

    /// Retrying cannot help (bad payload, violated contract). Dead-lettered now.
    #[error("permanent: {0}")]
    Permanent(String),
}

impl HandlerError {
    pub fn retriable(e: impl std::fmt::Display) -> Self {
        HandlerError::Retriable(e.to_string())
    }

    pub fn permanent(e: impl std::fmt::Display) -> Self {
        HandlerError::Permanent(e.to_string())
    }
}

pub type HandlerResult = Result<(), HandlerError>;

/// Handles envelopes for one subject.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, envelope: EventEnvelope<serde_json::Value>) -> HandlerResult;
}

struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> EventHandler for FnHandler<F>
where
    F: Fn(EventEnvelope<serde_json::Value>) -> Fut + Send + Sync,
    Fut: Future<Output = HandlerResult> + Send,
{
    async fn handle(&self, envelope: EventEnvelope<serde_json::Value>) -> HandlerResult {
        (self.0)(envelope).await
    }
}

/// Adapt an async closure into a handler.
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn EventHandler>
where
    F: Fn(EventEnvelope<serde_json::Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    Arc::new(FnHandler(f))
}
