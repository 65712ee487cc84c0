//! Scores one scenario over an evaluation dataset.

use std::sync::Arc;

use futures_util::{StreamExt, TryStreamExt, stream};

use beacon_domain::{Query, Scenario};
use beacon_service::{Pipeline, PipelineRequest};

use crate::{Error, Result, dataset::Sample, metrics};

const EVALUATION_USER: &str = "tuner";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Objective {
	ContextPrecision,
	SemanticSimilarity,
}
impl Objective {
	pub fn parse(raw: &str) -> Option<Self> {
		match raw {
			beacon_config::OBJECTIVE_CONTEXT_PRECISION => Some(Self::ContextPrecision),
			beacon_config::OBJECTIVE_SEMANTIC_SIMILARITY => Some(Self::SemanticSimilarity),
			_ => None,
		}
	}

	pub fn as_str(self) -> &'static str {
		match self {
			Self::ContextPrecision => beacon_config::OBJECTIVE_CONTEXT_PRECISION,
			Self::SemanticSimilarity => beacon_config::OBJECTIVE_SEMANTIC_SIMILARITY,
		}
	}
}

pub struct Evaluator {
	pipeline: Arc<Pipeline>,
	objectives: Vec<Objective>,
	concurrency: usize,
	context_match_threshold: f64,
}
impl Evaluator {
	pub fn new(
		pipeline: Arc<Pipeline>,
		objectives: Vec<Objective>,
		concurrency: usize,
		context_match_threshold: f64,
	) -> Self {
		Self { pipeline, objectives, concurrency: concurrency.max(1), context_match_threshold }
	}

	pub fn from_config(pipeline: Arc<Pipeline>, cfg: &beacon_config::Tuner) -> Result<Self> {
		let objectives = cfg
			.objectives
			.iter()
			.map(|raw| {
				Objective::parse(raw).ok_or_else(|| Error::InvalidParams {
					message: format!("Unknown objective {raw:?}."),
				})
			})
			.collect::<Result<Vec<_>>>()?;

		Ok(Self::new(
			pipeline,
			objectives,
			cfg.eval_concurrency,
			f64::from(cfg.context_match_threshold),
		))
	}

	pub fn objectives(&self) -> &[Objective] {
		&self.objectives
	}

	/// Mean score per objective, in objective order. Any failed sample fails the whole run.
	pub async fn evaluate(
		&self,
		scenario: &Scenario,
		source_ids: &[String],
		dataset: &[Sample],
	) -> Result<Vec<f64>> {
		if dataset.is_empty() {
			return Err(Error::Dataset { message: "Evaluation dataset is empty.".to_string() });
		}

		let per_sample: Vec<Vec<f64>> = stream::iter(dataset)
			.map(|sample| self.score_sample(scenario, source_ids, sample))
			.buffer_unordered(self.concurrency)
			.boxed()
			.try_collect()
			.await?;
		let mut totals = vec![0.0; self.objectives.len()];

		for scores in &per_sample {
			for (total, score) in totals.iter_mut().zip(scores) {
				*total += score;
			}
		}

		Ok(totals.into_iter().map(|total| total / per_sample.len() as f64).collect())
	}

	async fn score_sample(
		&self,
		scenario: &Scenario,
		source_ids: &[String],
		sample: &Sample,
	) -> Result<Vec<f64>> {
		let req = PipelineRequest {
			query: Query::new(sample.question.clone(), EVALUATION_USER),
			scenario: scenario.clone(),
			source_ids: source_ids.to_vec(),
		};
		let answer = self.pipeline.answer(&req).await?;
		let mut scores = Vec::with_capacity(self.objectives.len());

		for objective in &self.objectives {
			let score = match objective {
				Objective::ContextPrecision => metrics::context_precision(
					&answer.passages,
					&sample.context,
					self.context_match_threshold,
				),
				Objective::SemanticSimilarity => {
					let texts = [answer.answer.clone(), sample.answer.clone()];
					let vectors = self.pipeline.providers().embedding.embed(&texts).await?;

					match vectors.as_slice() {
						[left, right] => metrics::semantic_similarity(left, right),
						_ =>
							return Err(Error::Service(beacon_service::Error::UpstreamUnavailable {
								message: format!(
									"Embedding provider returned {} vectors for 2 texts.",
									vectors.len()
								),
							})),
					}
				},
			};

			scores.push(score);
		}

		Ok(scores)
	}
}
