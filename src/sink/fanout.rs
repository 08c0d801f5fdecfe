//! Fans one event out to several sinks, so the tracing log and a push
//! channel (e.g. Telegram) can both observe the same stream (spec §6:
//! "delivery is best-effort; loss is tolerated" — one sink's failure never
//! blocks another).

use crate::sink::{Event, EventSink};
use async_trait::async_trait;
use std::sync::Arc;

pub struct FanoutSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<Arc<dyn EventSink>>) -> Self {
        FanoutSink { sinks }
    }
}

#[async_trait]
impl EventSink for FanoutSink {
    async fn publish(&self, event: Event<'_>) {
        for s in &self.sinks {
            s.publish(event.clone()).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BotKind, Side};
    use std::sync::Mutex;

    struct RecordingSink {
        count: Mutex<usize>,
    }

    #[async_trait]
    impl EventSink for RecordingSink {
        async fn publish(&self, _event: Event<'_>) {
            *self.count.lock().unwrap() += 1;
        }
    }

    #[tokio::test]
    async fn publishes_to_every_inner_sink() {
        let a = Arc::new(RecordingSink { count: Mutex::new(0) });
        let b = Arc::new(RecordingSink { count: Mutex::new(0) });
        let fanout = FanoutSink::new(vec![a.clone(), b.clone()]);
        fanout
            .publish(Event::TradeOpened {
                symbol: "BTCUSDT",
                bot: BotKind::PainBuy,
                side: Side::Buy,
                qty: 1.0,
                entry: 1.0,
                stop_loss: 0.9,
                take_profit: 1.1,
            })
            .await;
        assert_eq!(*a.count.lock().unwrap(), 1);
        assert_eq!(*b.count.lock().unwrap(), 1);
    }
}
