use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Events emitted by the order lifecycle services after commit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    // Cart events
    CartItemAdded { cart_id: Uuid, variant_id: Uuid },
    CartItemUpdated { cart_id: Uuid, item_id: Uuid },
    CartItemRemoved { cart_id: Uuid, item_id: Uuid },
    CartCleared(Uuid),

    // Checkout / order events
    OrderCreated(Uuid),
    OrderCancelled(Uuid),
    OrderItemCancelled { order_id: Uuid, item_id: Uuid },
    OrderItemStatusChanged {
        order_id: Uuid,
        item_id: Uuid,
        new_status: String,
    },

    // Payment events
    PaymentCompleted { order_id: Uuid, transaction_id: String },
    PaymentFailed { order_id: Uuid, reason: String },

    // Return events
    ReturnRequested(Uuid),
    ReturnApproved(Uuid),
    ReturnCancelled(Uuid),

    // Wallet events
    WalletCredited { wallet_id: Uuid, amount: Decimal },
    WalletDebited { wallet_id: Uuid, amount: Decimal },

    // Pricing events
    VariantRepriced {
        variant_id: Uuid,
        selling_price: Decimal,
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

    /// Sends an event asynchronously.
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event, logging a warning instead of surfacing the error.
    /// Event delivery is best-effort; the originating transaction has
    /// already committed by the time this is called.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!("event dropped: {}", e);
        }
    }
}

/// Drains the event channel. Consumers (notification/report services) are
/// external collaborators; the core only logs what it publishes.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    while let Some(event) = rx.recv().await {
        debug!(?event, "event processed");
    }
}
