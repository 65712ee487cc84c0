//! One tuning request as served by the binaries: prepare the dataset, then run a study or score
//! a single scenario.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use beacon_domain::Scenario;
use beacon_service::Pipeline;
use beacon_storage::db::Db;

use crate::{
	Error, Result, dataset,
	sampler::RandomSampler,
	store::PgStudyStore,
	tuner::{Evaluation, TuneReport, Tuner},
};

#[derive(Clone, Debug, Deserialize)]
pub struct TuneJob {
	pub source_ids: Vec<String>,
	/// Scores this scenario instead of running a study.
	#[serde(default)]
	pub scenario: Option<Scenario>,
	/// Replaces the stored samples with freshly synthesized ones first.
	#[serde(default)]
	pub generate_dataset: bool,
}
impl TuneJob {
	pub fn validate(&self) -> Result<()> {
		if self.source_ids.is_empty() {
			return Err(Error::InvalidParams {
				message: "source_ids must be non-empty.".to_string(),
			});
		}
		if let Some(scenario) = &self.scenario {
			scenario.validate()?;
		}

		Ok(())
	}
}

#[derive(Clone, Debug, Serialize)]
#[serde(untagged)]
pub enum TuneOutcome {
	Study(TuneReport),
	Evaluation(Evaluation),
}

pub async fn run_job(
	pipeline: Arc<Pipeline>,
	db: Arc<Db>,
	cfg: &beacon_config::Config,
	job: &TuneJob,
) -> Result<TuneOutcome> {
	job.validate()?;

	if job.generate_dataset {
		let providers = pipeline.providers();
		let stored = dataset::regenerate(
			&db,
			providers.retrieval.as_ref(),
			providers.generation.as_ref(),
			&job.source_ids,
			&cfg.tuner.dataset,
			&cfg.providers.generation.model,
		)
		.await?;

		tracing::info!(sources = job.source_ids.len(), samples = stored, "Dataset regenerated.");
	}

	let samples = dataset::load(&db, &job.source_ids).await?;
	let store = Arc::new(PgStudyStore::new(db));
	let tuner = Tuner::from_config(pipeline, store, cfg)?;

	match &job.scenario {
		Some(scenario) => {
			let evaluation = tuner.evaluate(scenario, &job.source_ids, &samples).await?;

			Ok(TuneOutcome::Evaluation(evaluation))
		},
		None => {
			let mut sampler = RandomSampler::new(cfg.tuner.seed);
			let report =
				tuner.run(&mut sampler, &job.source_ids, &samples, cfg.tuner.trials).await?;

			Ok(TuneOutcome::Study(report))
		},
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn empty_scope_is_rejected() {
		let job: TuneJob =
			serde_json::from_str(r#"{"source_ids":[]}"#).expect("Failed to parse job.");

		assert!(!job.generate_dataset);
		assert!(matches!(job.validate(), Err(Error::InvalidParams { .. })));
	}
}
