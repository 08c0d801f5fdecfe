//! No-op sink, used by tests that don't care about emitted events.

use crate::sink::{Event, EventSink};
use async_trait::async_trait;

#[derive(Default)]
pub struct NullSink;

#[async_trait]
impl EventSink for NullSink {
    async fn publish(&self, _event: Event<'_>) {}
}
