use std::sync::Arc;

use beacon_config::Config;
use beacon_domain::Scenario;
use beacon_service::{Pipeline, Providers};
use beacon_storage::{db::Db, qdrant::QdrantStore};

#[derive(Clone)]
pub struct AppState {
	pub pipeline: Arc<Pipeline>,
	pub default_scenario: Arc<Scenario>,
	pub max_concurrent_requests: usize,
	/// Absent when the server runs without a database; the tuning routes are then unavailable.
	pub tuning: Option<Tuning>,
}
impl AppState {
	pub async fn new(config: Config) -> color_eyre::Result<Self> {
		let db = Db::connect(&config.storage.postgres).await?;

		db.ensure_schema().await?;

		let qdrant = QdrantStore::new(&config.storage.qdrant)?;
		let config = Arc::new(config);
		let pipeline = Pipeline::new(Providers::from_config(config.clone(), qdrant));

		pipeline.reranker().warm(&config.providers.rerank.model).await?;

		let mut state = Self::with_pipeline(
			Arc::new(pipeline),
			config.scenario.clone(),
			config.service.max_concurrent_requests,
		);

		state.tuning = Some(Tuning { db: Arc::new(db), config });

		Ok(state)
	}

	pub fn with_pipeline(
		pipeline: Arc<Pipeline>,
		default_scenario: Scenario,
		max_concurrent_requests: usize,
	) -> Self {
		Self {
			pipeline,
			default_scenario: Arc::new(default_scenario),
			max_concurrent_requests,
			tuning: None,
		}
	}
}

#[derive(Clone)]
pub struct Tuning {
	pub db: Arc<Db>,
	pub config: Arc<Config>,
}
