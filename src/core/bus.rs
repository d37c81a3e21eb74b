//! Per-run event fanout.
//!
//! Each run gets an ephemeral broadcast channel. Publishing never blocks
//! the pipeline: a slow observer lags and loses the oldest events rather
//! than stalling the executor. When the terminal event fires, the channel
//! is reclaimed once after a fixed linger window, whether or not anyone is
//! still attached — a slow observer can be disconnected mid-stream.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

use crate::domain::TriageEvent;

/// Buffered events per channel before lagging observers start losing them
const EVENT_BUFFER: usize = 64;

/// Registry of live run channels
#[derive(Clone)]
pub struct TriageBus {
    inner: Arc<BusInner>,
}

struct BusInner {
    channels: Mutex<HashMap<Uuid, Channel>>,
    linger: Duration,
}

struct Channel {
    tx: broadcast::Sender<TriageEvent>,
    /// Set once the terminal event has been published; guards reclamation
    /// so it is scheduled at most once.
    closing: bool,
}

impl TriageBus {
    pub fn new(linger: Duration) -> Self {
        Self {
            inner: Arc::new(BusInner {
                channels: Mutex::new(HashMap::new()),
                linger,
            }),
        }
    }

    /// Allocate the channel for a new run. The returned receiver is already
    /// attached, so the caller cannot miss events published right after.
    pub fn create(&self, run_id: Uuid) -> broadcast::Receiver<TriageEvent> {
        let (tx, rx) = broadcast::channel(EVENT_BUFFER);
        self.inner
            .channels
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(run_id, Channel { tx, closing: false });
        rx
    }

    /// Attach an observer. Unknown runs are a defined miss, not an error.
    pub fn subscribe(&self, run_id: Uuid) -> Option<broadcast::Receiver<TriageEvent>> {
        self.inner
            .channels
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&run_id)
            .map(|channel| channel.tx.subscribe())
    }

    /// Whether a run's channel is still registered
    pub fn is_live(&self, run_id: Uuid) -> bool {
        self.inner
            .channels
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(&run_id)
    }

    /// Fan an event out to every attached observer, in publish order.
    /// The terminal event schedules reclamation after the linger window.
    pub fn publish(&self, run_id: Uuid, event: TriageEvent) {
        let mut channels = self.inner.channels.lock().unwrap_or_else(|e| e.into_inner());
        let Some(channel) = channels.get_mut(&run_id) else {
            debug!(%run_id, "event for unknown run dropped");
            return;
        };

        let terminal = event.is_terminal();
        // Err means no attached observer; publishing is fire-and-forget
        let _ = channel.tx.send(event);

        if terminal && !channel.closing {
            channel.closing = true;
            let inner = Arc::clone(&self.inner);
            tokio::spawn(async move {
                tokio::time::sleep(inner.linger).await;
                inner
                    .channels
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .remove(&run_id);
                debug!(%run_id, "run channel reclaimed");
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{RecommendedAction, TriageEventType, TriageStep};
    use serde_json::json;

    #[tokio::test]
    async fn test_events_arrive_in_publish_order() {
        let bus = TriageBus::new(Duration::from_secs(30));
        let run_id = Uuid::new_v4();
        bus.create(run_id);

        let mut rx = bus.subscribe(run_id).unwrap();

        bus.publish(run_id, TriageEvent::plan_built(&TriageStep::DEFAULT_PLAN));
        bus.publish(
            run_id,
            TriageEvent::tool_update(TriageStep::GetProfile, json!({})),
        );

        assert_eq!(rx.recv().await.unwrap().event_type, TriageEventType::PlanBuilt);
        assert_eq!(rx.recv().await.unwrap().event_type, TriageEventType::ToolUpdate);
    }

    #[tokio::test]
    async fn test_unknown_run_is_a_defined_miss() {
        let bus = TriageBus::new(Duration::from_secs(30));
        assert!(bus.subscribe(Uuid::new_v4()).is_none());

        // Publishing to an unknown run must not panic
        bus.publish(Uuid::new_v4(), TriageEvent::fallback_triggered("nope"));
    }

    #[tokio::test]
    async fn test_publish_without_observers_does_not_block() {
        let bus = TriageBus::new(Duration::from_secs(30));
        let run_id = Uuid::new_v4();
        bus.create(run_id);

        for _ in 0..EVENT_BUFFER * 2 {
            bus.publish(run_id, TriageEvent::fallback_triggered("tool_error"));
        }
    }

    #[tokio::test]
    async fn test_channel_reclaimed_after_linger() {
        let bus = TriageBus::new(Duration::from_millis(20));
        let run_id = Uuid::new_v4();
        bus.create(run_id);

        bus.publish(
            run_id,
            TriageEvent::decision_finalized(&RecommendedAction::fallback()),
        );
        assert!(bus.is_live(run_id));

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(!bus.is_live(run_id));
        assert!(bus.subscribe(run_id).is_none());
    }

    #[tokio::test]
    async fn test_reclamation_scheduled_at_most_once() {
        let bus = TriageBus::new(Duration::from_millis(50));
        let run_id = Uuid::new_v4();
        bus.create(run_id);

        let decision = RecommendedAction::fallback();
        bus.publish(run_id, TriageEvent::decision_finalized(&decision));
        // A second terminal publish must not restart the clock
        tokio::time::sleep(Duration::from_millis(30)).await;
        bus.publish(run_id, TriageEvent::decision_finalized(&decision));

        tokio::time::sleep(Duration::from_millis(35)).await;
        assert!(!bus.is_live(run_id));
    }
}
