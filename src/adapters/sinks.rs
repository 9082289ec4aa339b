use crate::domain::model::ProgressEvent;
use crate::domain::ports::ProgressSink;
use tokio::sync::mpsc::UnboundedSender;

/// Writes progress through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl ProgressSink for LogSink {
    fn on_event(&self, event: &ProgressEvent) {
        match event {
            ProgressEvent::Started { campaign_id, total } => {
                tracing::info!("🚀 Campaign {}: sending to {} recipients", campaign_id, total);
            }
            ProgressEvent::Status { event, stats } => {
                tracing::info!(
                    "📨 [{}/{}] recipient {}: {}",
                    stats.completed(),
                    stats.total,
                    event.recipient_id,
                    event.outcome
                );
            }
            ProgressEvent::Finished(summary) => {
                tracing::info!("✅ {}", summary);
            }
        }
    }
}

/// Forwards every event to a channel consumer (UI, test harness, ...).
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: UnboundedSender<ProgressEvent>,
}

impl ChannelSink {
    pub fn new(tx: UnboundedSender<ProgressEvent>) -> Self {
        Self { tx }
    }
}

impl ProgressSink for ChannelSink {
    fn on_event(&self, event: &ProgressEvent) {
        // 接收端已關閉時直接丟棄
        let _ = self.tx.send(event.clone());
    }
}

/// Fans an event out to two sinks.
#[derive(Debug, Clone)]
pub struct TeeSink<A, B>(pub A, pub B);

impl<A: ProgressSink, B: ProgressSink> ProgressSink for TeeSink<A, B> {
    fn on_event(&self, event: &ProgressEvent) {
        self.0.on_event(event);
        self.1.on_event(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_sink_forwards_and_tolerates_closed_receiver() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let sink = TeeSink(ChannelSink::new(tx), LogSink);
        let event = ProgressEvent::Started {
            campaign_id: 3,
            total: 10,
        };

        sink.on_event(&event);
        assert_eq!(rx.try_recv().unwrap(), event);

        drop(rx);
        sink.on_event(&event);
    }
}
