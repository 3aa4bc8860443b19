use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

/// Events emitted by the services after a state transition commits.
///
/// The consumer is a logging fan-out; nothing in the request path depends on
/// delivery, so senders treat a full or closed channel as a warning only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    QuotationCreated {
        quotation_id: i64,
        provider_id: Uuid,
    },
    QuotationProposed {
        quotation_id: i64,
        service_id: Option<i64>,
    },
    QuotationRejected {
        quotation_id: i64,
    },
    QuotationDeleted {
        quotation_id: i64,
        hard: bool,
    },
    PaymentEnabled {
        quotation_id: i64,
    },
    OrderCreated {
        order_id: Uuid,
        quotation_id: i64,
    },
    OrderPaid {
        order_id: Uuid,
        payment_id: String,
    },
    OrderCancelled {
        order_id: Uuid,
    },
    ContractCreated {
        contract_id: Uuid,
        order_id: Uuid,
    },
    ContractCancelled {
        contract_id: Uuid,
    },
    MpAccountConnected {
        provider_id: Uuid,
    },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event, logging instead of failing when the consumer is gone.
    pub async fn send(&self, event: Event) {
        if let Err(e) = self.sender.send(event).await {
            warn!(error = %e, "event channel closed, dropping event");
        }
    }
}

/// Builds a connected sender/receiver pair with a bounded buffer.
pub fn channel() -> (EventSender, mpsc::Receiver<Event>) {
    let (tx, rx) = mpsc::channel(1024);
    (EventSender::new(tx), rx)
}

/// Drains the event channel, logging each event. Spawned once at startup.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    while let Some(event) = rx.recv().await {
        info!(?event, "domain event");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_after_receiver_dropped_does_not_panic() {
        let (tx, rx) = channel();
        drop(rx);
        tx.send(Event::QuotationRejected { quotation_id: 1 }).await;
    }
}
