//! waybill-bonus: loyalty ledger service
//!
//! Serves accrual, write-off and balance calls, and consumes completion
//! events to credit the delivery bonus.
//!
//! ## Architecture
//! ```text
//! [waybill-delivery] --(AMQP delivery_completed)--> [waybill-bonus] <--(HTTP)-- client
//!                                                          |
//!                                                          v
//!                                                       SQLite
//! ```
//!
//! ## Configuration
//! - WAYBILL_CONFIG: Path to a YAML config file (optional)
//! - WAYBILL__MESSAGING__CONSUMER__ACK_MODE: after_commit (default) or always
//! - AMQP_URL: Broker connection string
//! - WAYBILL_LOG: Log filter (default: info)

use std::sync::Arc;

use tracing::{error, info};

use waybill::api::{self, bonus::BonusState};
use waybill::bus::{AmqpConsumer, LedgerAccrualHandler};
use waybill::config::Config;
use waybill::ledger::LedgerEngine;
use waybill::utils::bootstrap::{init_tracing, open_ledger_store};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config = Config::load(None)?;
    let store = open_ledger_store(&config).await?;
    let engine = Arc::new(LedgerEngine::new(store, config.ledger.clone()));

    let consumer = AmqpConsumer::new(
        config.messaging.amqp.clone(),
        config.messaging.consumer.clone(),
        Arc::new(LedgerAccrualHandler::new(engine.clone())),
    )?;
    let consumer_state = consumer.state();

    // The HTTP surface stays up even if the consumer gives up.
    tokio::spawn(async move {
        if let Err(e) = consumer.run().await {
            error!(error = %e, "Completion consumer stopped");
        }
    });

    info!(queue = %config.messaging.amqp.queue, "waybill-bonus started");

    api::bonus::serve(
        BonusState {
            engine,
            consumer: consumer_state,
        },
        &config.server,
    )
    .await?;

    Ok(())
}
