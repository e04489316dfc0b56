use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Downstream listeners for ledger changes (receipts, reporting, extensions).
///
/// Calls are made synchronously after the owning write has committed. The
/// ledger never depends on a listener succeeding, so every method defaults
/// to a no-op.
pub trait OrderEventSink: Send + Sync {
    fn on_order_built(&self, _order_id: i64) {}

    fn on_status_changed(&self, _order_id: i64, _old_status: &str, _new_status: &str) {}

    fn on_refund_created(&self, _order_id: i64, _refund_id: i64) {}

    fn on_gateway_event(&self, _event_type: &str, _event_id: &str) {}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    OrderBuilt(i64),
    OrderStatusChanged {
        order_id: i64,
        old_status: String,
        new_status: String,
    },
    RefundCreated {
        order_id: i64,
        refund_id: i64,
    },
    GatewayEvent {
        event_type: String,
        event_id: String,
    },
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::OrderBuilt(id) => write!(f, "order {} built", id),
            Event::OrderStatusChanged {
                order_id,
                old_status,
                new_status,
            } => write!(f, "order {} {} -> {}", order_id, old_status, new_status),
            Event::RefundCreated {
                order_id,
                refund_id,
            } => write!(f, "refund {} created for order {}", refund_id, order_id),
            Event::GatewayEvent {
                event_type,
                event_id,
            } => write!(f, "gateway event {} ({})", event_id, event_type),
        }
    }
}

/// Sink that forwards events onto a channel drained by [`process_events`].
#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Queues an event without waiting; a full or closed channel drops it.
    pub fn send(&self, event: Event) {
        if let Err(e) = self.sender.try_send(event) {
            warn!("Failed to queue event: {}", e);
            metrics::counter!("edd_orders.events.dropped", 1);
        }
    }
}

impl OrderEventSink for EventSender {
    fn on_order_built(&self, order_id: i64) {
        self.send(Event::OrderBuilt(order_id));
    }

    fn on_status_changed(&self, order_id: i64, old_status: &str, new_status: &str) {
        self.send(Event::OrderStatusChanged {
            order_id,
            old_status: old_status.to_string(),
            new_status: new_status.to_string(),
        });
    }

    fn on_refund_created(&self, order_id: i64, refund_id: i64) {
        self.send(Event::RefundCreated {
            order_id,
            refund_id,
        });
    }

    fn on_gateway_event(&self, event_type: &str, event_id: &str) {
        self.send(Event::GatewayEvent {
            event_type: event_type.to_string(),
            event_id: event_id.to_string(),
        });
    }
}

/// Drains the event channel until every sender is dropped.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::OrderBuilt(order_id) => {
                info!(order_id, "Order built");
                metrics::counter!("edd_orders.events.order_built", 1);
            }
            Event::OrderStatusChanged {
                order_id,
                old_status,
                new_status,
            } => {
                info!(order_id, old_status = %old_status, new_status = %new_status, "Order status changed");
            }
            Event::RefundCreated {
                order_id,
                refund_id,
            } => {
                info!(order_id, refund_id, "Refund order created");
                metrics::counter!("edd_orders.events.refund_created", 1);
            }
            Event::GatewayEvent {
                event_type,
                event_id,
            } => {
                info!(event_type = %event_type, event_id = %event_id, "Gateway event processed");
            }
        }
    }

    error!("Event channel closed; event processing loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sender_forwards_sink_calls() {
        let (tx, mut rx) = mpsc::channel(8);
        let sink = EventSender::new(tx);

        sink.on_status_changed(4, "complete", "refunded");
        sink.on_refund_created(4, 9);

        assert_eq!(
            rx.recv().await,
            Some(Event::OrderStatusChanged {
                order_id: 4,
                old_status: "complete".into(),
                new_status: "refunded".into(),
            })
        );
        assert_eq!(
            rx.recv().await,
            Some(Event::RefundCreated {
                order_id: 4,
                refund_id: 9
            })
        );
    }

    #[tokio::test]
    async fn full_channel_drops_instead_of_blocking() {
        let (tx, mut rx) = mpsc::channel(1);
        let sink = EventSender::new(tx);
        sink.on_order_built(1);
        sink.on_order_built(2);

        assert_eq!(rx.recv().await, Some(Event::OrderBuilt(1)));
        assert!(rx.try_recv().is_err());
    }
}
