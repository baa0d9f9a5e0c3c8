//! waybill-delivery: delivery lifecycle service
//!
//! Records deliveries and publishes a completion event the first time one
//! reaches DELIVERED.
//!
//! ## Architecture
//! ```text
//! client --(HTTP)--> [waybill-delivery] --(AMQP delivery_completed)--> [waybill-bonus]
//!                           |
//!                           v
//!                        SQLite
//! ```
//!
//! ## Configuration
//! - WAYBILL_CONFIG: Path to a YAML config file (optional)
//! - WAYBILL__SERVER__PORT etc.: Overrides for individual settings
//! - AMQP_URL: Broker connection string
//! - WAYBILL_LOG: Log filter (default: info)

use std::sync::Arc;

use tracing::info;

use waybill::api;
use waybill::bus::{AmqpPublisher, CompletionNotifier};
use waybill::config::Config;
use waybill::delivery::DeliveryService;
use waybill::utils::bootstrap::{init_tracing, open_delivery_store};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config = Config::load(None)?;
    let store = open_delivery_store(&config).await?;
    let publisher = AmqpPublisher::new(&config.messaging.amqp)?;
    let service = Arc::new(DeliveryService::new(
        store,
        CompletionNotifier::new(Arc::new(publisher)),
    ));

    info!(queue = %config.messaging.amqp.queue, "waybill-delivery started");

    api::delivery::serve(service, &config.server).await?;

    Ok(())
}
