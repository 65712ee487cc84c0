//! The ask/tell loop.

use std::{collections::BTreeMap, sync::Arc};

use serde::Serialize;

use beacon_domain::Scenario;
use beacon_service::Pipeline;

use crate::{
	Result,
	dataset::Sample,
	evaluate::Evaluator,
	materialize::materialize,
	sampler::Sampler,
	space::{ParameterSet, SearchSpace},
	store::StudyStore,
	study::{Study, Trial},
};

#[derive(Clone, Debug, Serialize)]
pub struct TuneReport {
	pub study: String,
	pub best_trial: Option<Trial>,
	/// The best trial materialized over the base scenario, or the base itself when no trial
	/// completed.
	pub recommended: Scenario,
	pub trials_run: u32,
	pub failed: u32,
}

/// Scores of one explicit scenario, keyed by objective name.
#[derive(Clone, Debug, Serialize)]
pub struct Evaluation {
	pub scenario: Scenario,
	pub scores: BTreeMap<String, f64>,
}

/// Study name shared by every run over the same set of sources, in any order.
pub fn study_name(source_ids: &[String]) -> String {
	let mut sorted = source_ids.iter().map(String::as_str).collect::<Vec<_>>();

	sorted.sort_unstable();
	sorted.dedup();

	let digest = blake3::hash(sorted.join("\n").as_bytes());

	format!("rag:{}", &digest.to_hex()[..32])
}

pub struct Tuner {
	evaluator: Evaluator,
	store: Arc<dyn StudyStore>,
	space: SearchSpace,
	base: Scenario,
}
impl Tuner {
	pub fn new(
		evaluator: Evaluator,
		store: Arc<dyn StudyStore>,
		space: SearchSpace,
		base: Scenario,
	) -> Self {
		Self { evaluator, store, space, base }
	}

	/// Tuner over the configured search space, starting from the configured default scenario.
	pub fn from_config(
		pipeline: Arc<Pipeline>,
		store: Arc<dyn StudyStore>,
		cfg: &beacon_config::Config,
	) -> Result<Self> {
		let evaluator = Evaluator::from_config(pipeline, &cfg.tuner)?;
		let space = SearchSpace::from_config(&cfg.tuner.space);

		Ok(Self::new(evaluator, store, space, cfg.scenario.clone()))
	}

	/// Runs `trials` new trials over `dataset`, resuming the study persisted for `source_ids`.
	///
	/// A trial that fails for any reason scores zero and the loop moves on. Only store failures
	/// end the run early.
	pub async fn run(
		&self,
		sampler: &mut dyn Sampler,
		source_ids: &[String],
		dataset: &[Sample],
		trials: u32,
	) -> Result<TuneReport> {
		let objectives = self
			.evaluator
			.objectives()
			.iter()
			.map(|objective| objective.as_str().to_string())
			.collect();
		let mut study = Study::new(study_name(source_ids), objectives);
		let previous = self.store.open(&study.name, &study.objectives).await?;

		if !previous.is_empty() {
			tracing::info!(study = %study.name, trials = previous.len(), "Resuming study.");
		}

		for trial in previous {
			sampler.record(&trial);
			study.push(trial);
		}

		let mut failed = 0;

		for _ in 0..trials {
			let params = sampler.propose(&self.space);
			let scored = self.score(&params, source_ids, dataset).await;
			let provisional = study.next_number();
			let mut trial = match &scored {
				Ok(scores) => Trial::completed(provisional, params, scores.clone()),
				Err(err) =>
					Trial::failed(provisional, params, study.objectives.len(), err.to_string()),
			};

			trial.number = self.store.record(&study.name, &trial).await?;

			match scored {
				Ok(scores) => {
					tracing::info!(
						study = %study.name,
						number = trial.number,
						params = ?trial.params,
						?scores,
						"Trial completed."
					);
				},
				Err(err) => {
					tracing::error!(
						study = %study.name,
						number = trial.number,
						error = %err,
						"Trial failed."
					);

					failed += 1;
				},
			}

			sampler.record(&trial);
			study.push(trial);
		}

		let best_trial = study.best_trial().cloned();
		let recommended = match &best_trial {
			Some(best) => materialize(&best.params, &self.base)?,
			None => self.base.clone(),
		};

		tracing::info!(
			study = %study.name,
			trials_run = trials,
			failed,
			best = ?best_trial.as_ref().map(|trial| trial.number),
			"Tuning finished."
		);

		Ok(TuneReport { study: study.name, best_trial, recommended, trials_run: trials, failed })
	}

	/// Scores `scenario` once, outside any study.
	pub async fn evaluate(
		&self,
		scenario: &Scenario,
		source_ids: &[String],
		dataset: &[Sample],
	) -> Result<Evaluation> {
		let scores = self.evaluator.evaluate(scenario, source_ids, dataset).await?;
		let scores = self
			.evaluator
			.objectives()
			.iter()
			.map(|objective| objective.as_str().to_string())
			.zip(scores)
			.collect();

		Ok(Evaluation { scenario: scenario.clone(), scores })
	}

	async fn score(
		&self,
		params: &ParameterSet,
		source_ids: &[String],
		dataset: &[Sample],
	) -> Result<Vec<f64>> {
		let scenario = materialize(params, &self.base)?;

		self.evaluator.evaluate(&scenario, source_ids, dataset).await
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn study_name_ignores_source_order() {
		let forward = study_name(&["a".to_string(), "b".to_string()]);
		let backward = study_name(&["b".to_string(), "a".to_string(), "a".to_string()]);

		assert_eq!(forward, backward);
		assert!(forward.starts_with("rag:"));
		assert_ne!(forward, study_name(&["a".to_string()]));
	}
}
