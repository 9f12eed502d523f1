use std::sync::Arc;

use crate::{BusError, BusResult, EventBus, InMemoryBus, NatsBus, StreamSettings};

/// Build the bus selected by `BUS_TYPE` (`inmemory` or `nats`).
pub async fn connect_bus(bus_type: &str, nats_url: &str) -> BusResult<Arc<dyn EventBus>> {
    match bus_type.to_lowercase().as_str() {
        "inmemory" => {
            tracing::info!("Using InMemory event bus");
            Ok(Arc::new(InMemoryBus::new()))
        }
        "nats" => {
            tracing::info!("Connecting to NATS at {}", nats_url);
            let client = async_nats::connect(nats_url)
                .await
                .map_err(|e| BusError::ConnectionError(e.to_string()))?;
            let bus = NatsBus::connect(client, StreamSettings::default()).await?;
            Ok(Arc::new(bus))
        }
        other => Err(BusError::ConnectionError(format!(
            "Invalid BUS_TYPE: {}. Must be 'inmemory' or 'nats'",
            other
        ))),
    }
}
