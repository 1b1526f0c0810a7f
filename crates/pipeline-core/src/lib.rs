//! Core of the order pipeline.
//!
//! Ties the broker and state store clients to the two halves of the pipeline:
//! the [`OrderIngestor`] that validates and publishes new orders, and the
//! [`OrderProcessor`] that handles deliveries and persists processed records.
//! A [`Pipeline`] owns both and is shared by the HTTP layer.

pub mod builder;
pub mod decode;
pub mod ingest;
pub mod processor;
pub mod subscription;

pub use builder::{BuilderError, PipelineBuilder, PipelineFactories};
pub use decode::{DecodeError, DeliveredOrder};
pub use ingest::{IngestError, OrderIngestor};
pub use processor::{DeliveryOutcome, DeliveryStage, OrderProcessor};

use pipeline_broker::{BrokerInterface, BrokerService};
use pipeline_config::Config;
use pipeline_state::{StateStoreInterface, StateStoreService};
use pipeline_types::Subscription;
use std::sync::Arc;

/// The assembled pipeline.
#[derive(Clone)]
pub struct Pipeline {
	config: Config,
	state: Arc<StateStoreService>,
	ingestor: Arc<OrderIngestor>,
	processor: Arc<OrderProcessor>,
	subscriptions: Arc<Vec<Subscription>>,
}

impl std::fmt::Debug for Pipeline {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Pipeline")
			.field("config", &self.config)
			.field("subscriptions", &self.subscriptions)
			.finish_non_exhaustive()
	}
}

impl Pipeline {
	pub fn new(
		config: Config,
		broker: Box<dyn BrokerInterface>,
		state: Box<dyn StateStoreInterface>,
	) -> Self {
		let broker = Arc::new(BrokerService::new(broker, config.broker.channel()));
		let state = Arc::new(StateStoreService::new(
			state,
			config.state.store_name.clone(),
			config.state.timeout(),
		));

		let ingestor = Arc::new(OrderIngestor::new(broker, config.ingestion.clone()));
		let processor = Arc::new(OrderProcessor::new(
			state.clone(),
			config.service.id.clone(),
			config.processor.processing_delay(),
		));
		let subscriptions = Arc::new(subscription::subscriptions(&config));

		Self {
			config,
			state,
			ingestor,
			processor,
			subscriptions,
		}
	}

	pub fn config(&self) -> &Config {
		&self.config
	}

	pub fn state(&self) -> &Arc<StateStoreService> {
		&self.state
	}

	pub fn ingestor(&self) -> &Arc<OrderIngestor> {
		&self.ingestor
	}

	pub fn processor(&self) -> &Arc<OrderProcessor> {
		&self.processor
	}

	pub fn subscriptions(&self) -> &[Subscription] {
		&self.subscriptions
	}
}
