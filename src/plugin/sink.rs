//! Outbound event delivery.

use crate::protocol::OutboundEvent;
use async_trait::async_trait;
use thiserror::Error;

/// Errors raised while delivering an outbound event.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("connection closed")]
    Closed,
    #[error("transport error: {0}")]
    Transport(String),
}

/// Destination for the events produced by the command handlers.
#[async_trait]
pub trait EventSink: Send {
    async fn emit(&mut self, event: OutboundEvent) -> Result<(), SinkError>;
}

/// Collects events in memory.
#[async_trait]
impl EventSink for Vec<OutboundEvent> {
    async fn emit(&mut self, event: OutboundEvent) -> Result<(), SinkError> {
        self.push(event);
        Ok(())
    }
}
