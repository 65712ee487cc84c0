//! Per-request pipeline configuration.
//!
//! On the wire every option group is always present and carries an `enabled` flag where the stage
//! is optional. In memory the optional stages are `Option` sub-groups that exist only when the
//! stage runs, so nothing downstream has to re-check flags or fall back to defaults.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(try_from = "ScenarioRepr", into = "ScenarioRepr")]
pub struct Scenario {
	pub model: ModelOptions,
	pub multi_query: Option<MultiQueryOptions>,
	pub vector_search: VectorSearchOptions,
	pub reranker: Option<RerankerOptions>,
}
impl Scenario {
	pub fn new(
		model: ModelOptions,
		multi_query: Option<MultiQueryOptions>,
		vector_search: VectorSearchOptions,
		reranker: Option<RerankerOptions>,
	) -> Result<Self> {
		let scenario = Self { model, multi_query, vector_search, reranker };

		scenario.validate()?;

		Ok(scenario)
	}

	pub fn validate(&self) -> Result<()> {
		let model = &self.model;

		if model.model_name.trim().is_empty() {
			return Err(invalid("model.model_name must be non-empty."));
		}
		if !model.temperature.is_finite() || model.temperature < 0.0 {
			return Err(invalid("model.temperature must be a finite number, zero or greater."));
		}
		if model.top_k == 0 {
			return Err(invalid("model.top_k must be greater than zero."));
		}
		if !(model.top_p > 0.0 && model.top_p <= 1.0) {
			return Err(invalid("model.top_p must be in the range (0, 1]."));
		}
		if self.vector_search.top_n == 0 {
			return Err(invalid("vector_search.top_n must be greater than zero."));
		}
		if !(0.0..=1.0).contains(&self.vector_search.threshold) {
			return Err(invalid("vector_search.threshold must be in the range [0, 1]."));
		}

		if let Some(multi_query) = &self.multi_query {
			if multi_query.n_queries == 0 {
				return Err(invalid("multi_query.n_queries must be greater than zero."));
			}
			if multi_query.query_model_name.as_deref().is_some_and(|name| name.trim().is_empty()) {
				return Err(invalid("multi_query.query_model_name must be non-empty when set."));
			}
		}
		if let Some(reranker) = &self.reranker {
			if reranker.model_name.trim().is_empty() {
				return Err(invalid(
					"reranker.model_name must be non-empty when reranking is enabled.",
				));
			}
			if reranker.top_k == 0 {
				return Err(invalid("reranker.top_k must be greater than zero."));
			}
			if reranker.max_length == 0 {
				return Err(invalid("reranker.max_length must be greater than zero."));
			}
		}

		Ok(())
	}

	/// Model used to phrase alternate questions. Falls back to the generation model.
	pub fn expansion_model(&self) -> &str {
		self.multi_query
			.as_ref()
			.and_then(|multi_query| multi_query.query_model_name.as_deref())
			.unwrap_or(&self.model.model_name)
	}
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct ModelOptions {
	pub model_name: String,
	pub temperature: f32,
	pub top_k: u32,
	pub top_p: f32,
	#[serde(default)]
	pub system_prompt: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct MultiQueryOptions {
	pub n_queries: u32,
	pub query_model_name: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct VectorSearchOptions {
	pub top_n: u32,
	pub threshold: f32,
	#[serde(default)]
	pub search_by_query: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RerankerOptions {
	pub top_k: u32,
	pub max_length: u32,
	pub model_name: String,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
struct ScenarioRepr {
	model: ModelOptions,
	#[serde(default)]
	multi_query: MultiQueryRepr,
	vector_search: VectorSearchOptions,
	#[serde(default)]
	reranker: RerankerRepr,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
struct MultiQueryRepr {
	enabled: bool,
	#[serde(default)]
	n_queries: u32,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	query_model_name: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
struct RerankerRepr {
	enabled: bool,
	#[serde(default)]
	top_k: u32,
	#[serde(default)]
	max_length: u32,
	#[serde(default)]
	model_name: String,
}

impl TryFrom<ScenarioRepr> for Scenario {
	type Error = Error;

	fn try_from(repr: ScenarioRepr) -> Result<Self> {
		// A zero count means the same as a disabled group.
		let multi_query = (repr.multi_query.enabled && repr.multi_query.n_queries > 0).then(|| {
			MultiQueryOptions {
				n_queries: repr.multi_query.n_queries,
				query_model_name: repr
					.multi_query
					.query_model_name
					.filter(|name| !name.trim().is_empty()),
			}
		});
		let reranker = repr.reranker.enabled.then(|| RerankerOptions {
			top_k: repr.reranker.top_k,
			max_length: repr.reranker.max_length,
			model_name: repr.reranker.model_name,
		});

		Scenario::new(repr.model, multi_query, repr.vector_search, reranker)
	}
}

impl From<Scenario> for ScenarioRepr {
	fn from(scenario: Scenario) -> Self {
		let multi_query = match scenario.multi_query {
			Some(options) => MultiQueryRepr {
				enabled: true,
				n_queries: options.n_queries,
				query_model_name: options.query_model_name,
			},
			None => MultiQueryRepr::default(),
		};
		let reranker = match scenario.reranker {
			Some(options) => RerankerRepr {
				enabled: true,
				top_k: options.top_k,
				max_length: options.max_length,
				model_name: options.model_name,
			},
			None => RerankerRepr::default(),
		};

		Self { model: scenario.model, multi_query, vector_search: scenario.vector_search, reranker }
	}
}

fn invalid(message: &str) -> Error {
	Error::InvalidScenario { message: message.to_string() }
}

#[cfg(test)]
mod tests {
	use super::*;

	fn model() -> ModelOptions {
		ModelOptions {
			model_name: "llama3".to_string(),
			temperature: 0.2,
			top_k: 20,
			top_p: 0.5,
			system_prompt: String::new(),
		}
	}

	fn vector_search() -> VectorSearchOptions {
		VectorSearchOptions { top_n: 5, threshold: 0.1, search_by_query: false }
	}

	#[test]
	fn disabled_groups_deserialize_to_none() {
		let json = serde_json::json!({
			"model": { "model_name": "llama3", "temperature": 0.2, "top_k": 20, "top_p": 0.5 },
			"multi_query": { "enabled": false, "n_queries": 3 },
			"vector_search": { "top_n": 5, "threshold": 0.1 },
			"reranker": { "enabled": false }
		});
		let scenario: Scenario = serde_json::from_value(json).expect("Failed to parse scenario.");

		assert!(scenario.multi_query.is_none());
		assert!(scenario.reranker.is_none());
		assert_eq!(scenario.vector_search.top_n, 5);
	}

	#[test]
	fn zero_query_count_skips_expansion() {
		let json = serde_json::json!({
			"model": { "model_name": "llama3", "temperature": 0.2, "top_k": 20, "top_p": 0.5 },
			"multi_query": { "enabled": true, "n_queries": 0 },
			"vector_search": { "top_n": 5, "threshold": 0.1 }
		});
		let scenario: Scenario = serde_json::from_value(json).expect("Failed to parse scenario.");

		assert!(scenario.multi_query.is_none());
	}

	#[test]
	fn enabled_reranker_requires_model_name() {
		let json = serde_json::json!({
			"model": { "model_name": "llama3", "temperature": 0.2, "top_k": 20, "top_p": 0.5 },
			"vector_search": { "top_n": 5, "threshold": 0.1 },
			"reranker": { "enabled": true, "top_k": 4, "max_length": 4096, "model_name": " " }
		});
		let err = serde_json::from_value::<Scenario>(json).expect_err("Expected validation error.");

		assert!(
			err.to_string().contains("reranker.model_name must be non-empty"),
			"Unexpected error: {err}"
		);
	}

	#[test]
	fn expansion_model_falls_back_to_generation_model() {
		let mut scenario = Scenario::new(
			model(),
			Some(MultiQueryOptions { n_queries: 3, query_model_name: None }),
			vector_search(),
			None,
		)
		.expect("Failed to build scenario.");

		assert_eq!(scenario.expansion_model(), "llama3");

		scenario.multi_query =
			Some(MultiQueryOptions { n_queries: 3, query_model_name: Some("qwen".to_string()) });

		assert_eq!(scenario.expansion_model(), "qwen");
	}

	#[test]
	fn serializes_enabled_flags() {
		let scenario = Scenario::new(
			model(),
			None,
			vector_search(),
			Some(RerankerOptions {
				top_k: 4,
				max_length: 4096,
				model_name: "BAAI/bge-reranker-v2-m3".to_string(),
			}),
		)
		.expect("Failed to build scenario.");
		let json = serde_json::to_value(&scenario).expect("Failed to serialize scenario.");

		assert_eq!(json["reranker"]["enabled"], true);
		assert_eq!(json["multi_query"]["enabled"], false);
	}

	#[test]
	fn parses_from_toml_table() {
		let raw = r#"
[model]
model_name = "llama3"
temperature = 0.2
top_k = 20
top_p = 0.5

[multi_query]
enabled = true
n_queries = 3

[vector_search]
top_n = 10
threshold = 0.3
search_by_query = true
"#;
		let scenario: Scenario = toml::from_str(raw).expect("Failed to parse scenario.");

		assert_eq!(scenario.multi_query.map(|options| options.n_queries), Some(3));
		assert!(scenario.vector_search.search_by_query);
	}
}
