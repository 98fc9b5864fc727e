use log::{info, warn};
use thiserror::Error;

use crate::{
    catalog::KitCatalog,
    client::Client,
    config::Target,
    error::RconError,
    store::{DeliveryRecord, DeliveryStatus, DeliveryStore},
};

#[derive(Error, Debug)]
pub enum FulfillmentError {
    #[error("unknown kit: {0}")]
    UnknownKit(String),
    /// The order is already on record for a different player or kit.
    #[error("order {order} is recorded as {kit} for {destination}")]
    OrderMismatch {
        order: String,
        destination: String,
        kit: String,
    },
    /// The kit could not be delivered; the order has been queued for manual
    /// review.
    #[error("delivery of order {order} failed")]
    Delivery {
        order: String,
        #[source]
        source: RconError,
    },
}

/// Turns paid orders into kit deliveries and records how each one went.
pub struct Fulfillment<S> {
    client: Client,
    target: Target,
    catalog: KitCatalog,
    store: S,
}

impl<S: DeliveryStore> Fulfillment<S> {
    pub fn new(client: Client, target: Target, catalog: KitCatalog, store: S) -> Self {
        Fulfillment {
            client,
            target,
            catalog,
            store,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    pub fn catalog(&self) -> &KitCatalog {
        &self.catalog
    }

    /// Deliver `kit` to `destination` for order `order`. Repeated calls for
    /// an undelivered order count as retries; an order that was already
    /// delivered is returned as recorded without sending anything.
    pub async fn fulfill(
        &self,
        order: &str,
        destination: &str,
        kit: &str,
    ) -> Result<DeliveryRecord, FulfillmentError> {
        let command = self
            .catalog
            .command(kit)
            .ok_or_else(|| FulfillmentError::UnknownKit(kit.to_owned()))?;

        let mut record = match self.store.get(order) {
            Some(existing) if existing.destination != destination || existing.kit != kit => {
                return Err(FulfillmentError::OrderMismatch {
                    order: existing.id,
                    destination: existing.destination,
                    kit: existing.kit,
                });
            }
            Some(existing) if existing.status == DeliveryStatus::Delivered => {
                info!("order {}: already delivered, skipping", order);
                return Ok(existing);
            }
            Some(existing) => existing,
            None => DeliveryRecord::new(order, destination, kit),
        };
        record.status = DeliveryStatus::Pending;
        record.attempts += 1;
        self.store.put(record.clone());

        match self.client.deliver_to(&self.target, destination, command).await {
            Ok(()) => {
                info!("order {}: {} delivered to {}", order, kit, destination);
                record.status = DeliveryStatus::Delivered;
                self.store.put(record.clone());
                Ok(record)
            }
            Err(source) => {
                warn!(
                    "order {}: delivery to {} failed ({}), queued for manual review",
                    order, destination, source
                );
                record.status = DeliveryStatus::ManualReview {
                    reason: source.to_string(),
                };
                self.store.put(record);
                Err(FulfillmentError::Delivery {
                    order: order.to_owned(),
                    source,
                })
            }
        }
    }
}
