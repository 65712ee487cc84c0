use serde::Deserialize;
use serde_json::{Map, Value};

use beacon_domain::Scenario;

pub const OBJECTIVE_CONTEXT_PRECISION: &str = "context_precision";
pub const OBJECTIVE_SEMANTIC_SIMILARITY: &str = "semantic_similarity";

#[derive(Debug, Deserialize)]
pub struct Config {
	pub service: Service,
	pub storage: Storage,
	pub providers: Providers,
	pub scenario: Scenario,
	#[serde(default)]
	pub tuner: Tuner,
}

#[derive(Debug, Deserialize)]
pub struct Service {
	pub http_bind: String,
	pub log_level: String,
	#[serde(default = "default_max_concurrent_requests")]
	pub max_concurrent_requests: usize,
}

#[derive(Debug, Deserialize)]
pub struct Storage {
	pub postgres: Postgres,
	pub qdrant: Qdrant,
}

#[derive(Debug, Deserialize)]
pub struct Postgres {
	pub dsn: String,
	pub pool_max_conns: u32,
}

#[derive(Debug, Deserialize)]
pub struct Qdrant {
	pub url: String,
	pub collection: String,
	pub vector_dim: u32,
}

#[derive(Debug, Deserialize)]
pub struct Providers {
	pub embedding: EmbeddingProviderConfig,
	pub generation: GenerationProviderConfig,
	pub rerank: ProviderConfig,
}

#[derive(Debug, Deserialize)]
pub struct EmbeddingProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	#[serde(default)]
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub dimensions: u32,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
pub struct GenerationProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	#[serde(default)]
	pub api_key: String,
	pub path: String,
	/// Model used when a caller does not name one, e.g. for dataset synthesis.
	pub model: String,
	pub timeout_ms: u64,
	#[serde(default)]
	pub num_ctx: Option<u32>,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
pub struct ProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	#[serde(default)]
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Tuner {
	pub trials: u32,
	pub eval_concurrency: usize,
	pub seed: Option<u64>,
	/// Declared order is the tie-break priority when several trials are Pareto-optimal.
	pub objectives: Vec<String>,
	pub context_match_threshold: f32,
	pub dataset: TunerDataset,
	pub space: SearchSpace,
}
impl Default for Tuner {
	fn default() -> Self {
		Self {
			trials: 50,
			eval_concurrency: 4,
			seed: None,
			objectives: vec![OBJECTIVE_CONTEXT_PRECISION.to_string()],
			context_match_threshold: 0.5,
			dataset: TunerDataset::default(),
			space: SearchSpace::default(),
		}
	}
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct TunerDataset {
	pub page_size: u32,
	pub samples_per_document: u32,
}
impl Default for TunerDataset {
	fn default() -> Self {
		Self { page_size: 25, samples_per_document: 3 }
	}
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SearchSpace {
	pub vector_search: VectorSearchSpace,
	pub reranker: RerankerSpace,
	pub model: ModelSpace,
	pub multi_query: MultiQuerySpace,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct VectorSearchSpace {
	pub top_n: IntRange,
	pub threshold: FloatRange,
	pub search_by_query: Vec<bool>,
}
impl Default for VectorSearchSpace {
	fn default() -> Self {
		Self {
			top_n: IntRange { min: 8, max: 15 },
			threshold: FloatRange { min: 0.2, max: 0.9, step: Some(0.01) },
			search_by_query: vec![true, false],
		}
	}
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RerankerSpace {
	pub enabled: Vec<bool>,
	pub top_k: IntRange,
	pub max_length: Vec<u32>,
	pub model: Vec<String>,
}
impl Default for RerankerSpace {
	fn default() -> Self {
		Self {
			enabled: vec![true, false],
			top_k: IntRange { min: 4, max: 8 },
			max_length: vec![4_096, 8_192],
			model: vec!["BAAI/bge-reranker-v2-m3".to_string()],
		}
	}
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ModelSpace {
	pub temperature: FloatRange,
	pub top_k: IntRange,
	pub top_p: FloatRange,
}
impl Default for ModelSpace {
	fn default() -> Self {
		Self {
			temperature: FloatRange { min: 0.0, max: 1.0, step: None },
			top_k: IntRange { min: 1, max: 50 },
			top_p: FloatRange { min: 0.1, max: 1.0, step: None },
		}
	}
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct MultiQuerySpace {
	pub enabled: Vec<bool>,
	pub n_queries: IntRange,
}
impl Default for MultiQuerySpace {
	fn default() -> Self {
		Self { enabled: vec![true, false], n_queries: IntRange { min: 3, max: 5 } }
	}
}

#[derive(Clone, Copy, Debug, Deserialize)]
pub struct IntRange {
	pub min: i64,
	pub max: i64,
}

#[derive(Clone, Copy, Debug, Deserialize)]
pub struct FloatRange {
	pub min: f64,
	pub max: f64,
	#[serde(default)]
	pub step: Option<f64>,
}

fn default_max_concurrent_requests() -> usize {
	64
}
