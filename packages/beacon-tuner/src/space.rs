//! Knob domains the sampler draws from.

use std::{collections::BTreeMap, fmt::Display};

use serde::{Deserialize, Serialize};

pub const VECTOR_SEARCH_TOP_N: &str = "vector_search.top_n";
pub const VECTOR_SEARCH_THRESHOLD: &str = "vector_search.threshold";
pub const VECTOR_SEARCH_BY_QUERY: &str = "vector_search.search_by_query";
pub const RERANKER_ENABLED: &str = "reranker.enabled";
pub const RERANKER_TOP_K: &str = "reranker.top_k";
pub const RERANKER_MAX_LENGTH: &str = "reranker.max_length";
pub const RERANKER_MODEL: &str = "reranker.model";
pub const MODEL_TEMPERATURE: &str = "model.temperature";
pub const MODEL_TOP_K: &str = "model.top_k";
pub const MODEL_TOP_P: &str = "model.top_p";
pub const MULTI_QUERY_ENABLED: &str = "multi_query.enabled";
pub const MULTI_QUERY_N_QUERIES: &str = "multi_query.n_queries";

/// Knob name to value. Conditional knobs are absent when their parent is off.
pub type ParameterSet = BTreeMap<String, ParamValue>;

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ParamValue {
	Bool(bool),
	Int(i64),
	Float(f64),
	Text(String),
}
impl ParamValue {
	pub fn as_bool(&self) -> Option<bool> {
		match self {
			Self::Bool(value) => Some(*value),
			_ => None,
		}
	}

	pub fn as_i64(&self) -> Option<i64> {
		match self {
			Self::Int(value) => Some(*value),
			_ => None,
		}
	}

	/// Integers widen to floats, so a float knob stored as `1` still reads back.
	pub fn as_f64(&self) -> Option<f64> {
		match self {
			Self::Float(value) => Some(*value),
			Self::Int(value) => Some(*value as f64),
			_ => None,
		}
	}

	pub fn as_str(&self) -> Option<&str> {
		match self {
			Self::Text(value) => Some(value),
			_ => None,
		}
	}
}
impl Display for ParamValue {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::Bool(value) => write!(f, "{value}"),
			Self::Int(value) => write!(f, "{value}"),
			Self::Float(value) => write!(f, "{value}"),
			Self::Text(value) => f.write_str(value),
		}
	}
}

#[derive(Clone, Debug, PartialEq)]
pub enum Domain {
	Int { min: i64, max: i64 },
	Float { min: f64, max: f64, step: Option<f64> },
	Choice(Vec<ParamValue>),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Knob {
	pub name: String,
	pub domain: Domain,
	/// Boolean knob that must be `true` for this one to be sampled.
	pub parent: Option<String>,
}
impl Knob {
	fn new(name: &str, domain: Domain) -> Self {
		Self { name: name.to_string(), domain, parent: None }
	}

	fn under(mut self, parent: &str) -> Self {
		self.parent = Some(parent.to_string());

		self
	}

	/// True when the knob belongs in a parameter set that already holds its parent's value.
	pub fn is_active(&self, params: &ParameterSet) -> bool {
		match &self.parent {
			None => true,
			Some(parent) => params.get(parent).and_then(ParamValue::as_bool) == Some(true),
		}
	}

	pub fn admits(&self, value: &ParamValue) -> bool {
		match &self.domain {
			Domain::Int { min, max } => value.as_i64().is_some_and(|v| (*min..=*max).contains(&v)),
			Domain::Float { min, max, .. } => value
				.as_f64()
				.is_some_and(|v| v >= *min - f64::EPSILON && v <= *max + f64::EPSILON),
			Domain::Choice(choices) => choices.contains(value),
		}
	}
}

/// Ordered knobs. Parents always precede their children.
#[derive(Clone, Debug, PartialEq)]
pub struct SearchSpace {
	knobs: Vec<Knob>,
}
impl SearchSpace {
	pub fn new(knobs: Vec<Knob>) -> Self {
		Self { knobs }
	}

	pub fn from_config(cfg: &beacon_config::SearchSpace) -> Self {
		let search = &cfg.vector_search;
		let reranker = &cfg.reranker;
		let model = &cfg.model;
		let multi_query = &cfg.multi_query;

		Self::new(vec![
			Knob::new(VECTOR_SEARCH_TOP_N, int(search.top_n)),
			Knob::new(VECTOR_SEARCH_THRESHOLD, float(search.threshold)),
			Knob::new(VECTOR_SEARCH_BY_QUERY, bools(&search.search_by_query)),
			Knob::new(RERANKER_ENABLED, bools(&reranker.enabled)),
			Knob::new(RERANKER_TOP_K, int(reranker.top_k)).under(RERANKER_ENABLED),
			Knob::new(
				RERANKER_MAX_LENGTH,
				Domain::Choice(
					reranker
						.max_length
						.iter()
						.map(|len| ParamValue::Int(i64::from(*len)))
						.collect(),
				),
			)
			.under(RERANKER_ENABLED),
			Knob::new(
				RERANKER_MODEL,
				Domain::Choice(reranker.model.iter().cloned().map(ParamValue::Text).collect()),
			)
			.under(RERANKER_ENABLED),
			Knob::new(MODEL_TEMPERATURE, float(model.temperature)),
			Knob::new(MODEL_TOP_K, int(model.top_k)),
			Knob::new(MODEL_TOP_P, float(model.top_p)),
			Knob::new(MULTI_QUERY_ENABLED, bools(&multi_query.enabled)),
			Knob::new(MULTI_QUERY_N_QUERIES, int(multi_query.n_queries)).under(MULTI_QUERY_ENABLED),
		])
	}

	pub fn knobs(&self) -> &[Knob] {
		&self.knobs
	}

	/// Checks that `params` holds exactly the active knobs, each inside its domain.
	pub fn contains(&self, params: &ParameterSet) -> bool {
		let mut expected = 0;

		for knob in &self.knobs {
			if !knob.is_active(params) {
				if params.contains_key(&knob.name) {
					return false;
				}

				continue;
			}

			match params.get(&knob.name) {
				Some(value) if knob.admits(value) => expected += 1,
				_ => return false,
			}
		}

		expected == params.len()
	}
}

fn int(range: beacon_config::IntRange) -> Domain {
	Domain::Int { min: range.min, max: range.max }
}

fn float(range: beacon_config::FloatRange) -> Domain {
	Domain::Float { min: range.min, max: range.max, step: range.step }
}

fn bools(choices: &[bool]) -> Domain {
	Domain::Choice(choices.iter().copied().map(ParamValue::Bool).collect())
}
