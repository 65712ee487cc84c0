//! Evaluation samples kept in the sample store under `{source_id}:{index}`.

use serde::{Deserialize, Serialize};

use beacon_service::{GenerationProvider, RetrievalProvider};
use beacon_storage::{db::Db, samples};

use crate::{Result, synth};

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Sample {
	pub question: String,
	pub answer: String,
	/// Reference passages the answer is grounded on.
	pub context: Vec<String>,
}

/// All samples for `source_ids`, grouped by source in the given order, each in index order.
pub async fn load(db: &Db, source_ids: &[String]) -> Result<Vec<Sample>> {
	let mut dataset = Vec::new();

	for source_id in source_ids {
		let samples: Vec<Sample> = samples::list(&db.pool, source_id).await?;

		tracing::debug!(source_id, count = samples.len(), "Evaluation samples loaded.");

		dataset.extend(samples);
	}

	Ok(dataset)
}

/// Replaces every stored sample of `source_id`. Returns the number stored.
pub async fn store(db: &Db, source_id: &str, dataset: &[Sample]) -> Result<usize> {
	let mut tx = db.pool.begin().await.map_err(beacon_storage::Error::from)?;

	samples::delete_prefix(&mut *tx, source_id).await?;

	for (index, sample) in dataset.iter().enumerate() {
		samples::set(&mut *tx, &samples::sample_key(source_id, index), sample).await?;
	}

	tx.commit().await.map_err(beacon_storage::Error::from)?;

	tracing::info!(source_id, count = dataset.len(), "Evaluation samples stored.");

	Ok(dataset.len())
}

/// Synthesizes fresh samples for every source and replaces the stored ones. Returns the total
/// number stored.
pub async fn regenerate(
	db: &Db,
	retrieval: &dyn RetrievalProvider,
	generation: &dyn GenerationProvider,
	source_ids: &[String],
	cfg: &beacon_config::TunerDataset,
	model: &str,
) -> Result<usize> {
	let mut total = 0;

	for source_id in source_ids {
		let dataset = synth::synthesize(retrieval, generation, source_id, cfg, model).await?;

		total += store(db, source_id, &dataset).await?;
	}

	Ok(total)
}
