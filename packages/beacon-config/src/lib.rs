mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	Config, EmbeddingProviderConfig, FloatRange, GenerationProviderConfig, IntRange, ModelSpace,
	MultiQuerySpace, OBJECTIVE_CONTEXT_PRECISION, OBJECTIVE_SEMANTIC_SIMILARITY, Postgres,
	ProviderConfig, Providers, Qdrant, RerankerSpace, SearchSpace, Service, Storage, Tuner,
	TunerDataset, VectorSearchSpace,
};

use std::{fs, path::Path};

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;

	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	if cfg.service.http_bind.trim().is_empty() {
		return Err(validation("service.http_bind must be non-empty."));
	}
	if cfg.service.max_concurrent_requests == 0 {
		return Err(validation("service.max_concurrent_requests must be greater than zero."));
	}
	if cfg.storage.postgres.pool_max_conns == 0 {
		return Err(validation("storage.postgres.pool_max_conns must be greater than zero."));
	}
	if cfg.storage.qdrant.collection.trim().is_empty() {
		return Err(validation("storage.qdrant.collection must be non-empty."));
	}
	if cfg.providers.embedding.dimensions == 0 {
		return Err(validation("providers.embedding.dimensions must be greater than zero."));
	}
	if cfg.providers.embedding.dimensions != cfg.storage.qdrant.vector_dim {
		return Err(validation(
			"providers.embedding.dimensions must match storage.qdrant.vector_dim.",
		));
	}

	let providers = &cfg.providers;

	validate_provider(
		"providers.embedding",
		&providers.embedding.api_base,
		providers.embedding.timeout_ms,
	)?;
	validate_provider(
		"providers.generation",
		&providers.generation.api_base,
		providers.generation.timeout_ms,
	)?;
	validate_provider("providers.rerank", &providers.rerank.api_base, providers.rerank.timeout_ms)?;

	if cfg.providers.generation.model.trim().is_empty() {
		return Err(validation("providers.generation.model must be non-empty."));
	}
	if cfg.providers.rerank.model.trim().is_empty() {
		return Err(validation("providers.rerank.model must be non-empty."));
	}

	cfg.scenario
		.validate()
		.map_err(|err| Error::Validation { message: format!("scenario: {err}") })?;

	validate_tuner(&cfg.tuner)
}

fn validate_tuner(tuner: &Tuner) -> Result<()> {
	if tuner.trials == 0 {
		return Err(validation("tuner.trials must be greater than zero."));
	}
	if tuner.eval_concurrency == 0 {
		return Err(validation("tuner.eval_concurrency must be greater than zero."));
	}
	if tuner.objectives.is_empty() {
		return Err(validation("tuner.objectives must be non-empty."));
	}

	for (idx, objective) in tuner.objectives.iter().enumerate() {
		if !matches!(
			objective.as_str(),
			OBJECTIVE_CONTEXT_PRECISION | OBJECTIVE_SEMANTIC_SIMILARITY
		) {
			return Err(validation(
				"tuner.objectives entries must be one of context_precision or semantic_similarity.",
			));
		}
		if tuner.objectives[..idx].contains(objective) {
			return Err(validation("tuner.objectives must not contain duplicates."));
		}
	}

	if !(0.0..=1.0).contains(&tuner.context_match_threshold) {
		return Err(validation("tuner.context_match_threshold must be in the range [0, 1]."));
	}
	if tuner.dataset.page_size == 0 {
		return Err(validation("tuner.dataset.page_size must be greater than zero."));
	}
	if tuner.dataset.samples_per_document == 0 {
		return Err(validation("tuner.dataset.samples_per_document must be greater than zero."));
	}

	let space = &tuner.space;

	validate_int("tuner.space.vector_search.top_n", space.vector_search.top_n, 1)?;
	validate_float("tuner.space.vector_search.threshold", space.vector_search.threshold)?;
	validate_choices(
		"tuner.space.vector_search.search_by_query",
		&space.vector_search.search_by_query,
	)?;
	validate_choices("tuner.space.reranker.enabled", &space.reranker.enabled)?;
	validate_int("tuner.space.reranker.top_k", space.reranker.top_k, 1)?;
	validate_choices("tuner.space.reranker.max_length", &space.reranker.max_length)?;
	validate_choices("tuner.space.reranker.model", &space.reranker.model)?;
	validate_float("tuner.space.model.temperature", space.model.temperature)?;
	validate_int("tuner.space.model.top_k", space.model.top_k, 1)?;
	validate_float("tuner.space.model.top_p", space.model.top_p)?;
	validate_choices("tuner.space.multi_query.enabled", &space.multi_query.enabled)?;
	validate_int("tuner.space.multi_query.n_queries", space.multi_query.n_queries, 1)?;

	if space.reranker.max_length.contains(&0) {
		return Err(validation(
			"tuner.space.reranker.max_length entries must be greater than zero.",
		));
	}
	if space.reranker.model.iter().any(|model| model.trim().is_empty()) {
		return Err(validation("tuner.space.reranker.model entries must be non-empty."));
	}

	Ok(())
}

fn validate_provider(key: &str, api_base: &str, timeout_ms: u64) -> Result<()> {
	if api_base.trim().is_empty() {
		return Err(Error::Validation { message: format!("{key}.api_base must be non-empty.") });
	}
	if timeout_ms == 0 {
		return Err(Error::Validation {
			message: format!("{key}.timeout_ms must be greater than zero."),
		});
	}

	Ok(())
}

fn validate_int(key: &str, range: IntRange, floor: i64) -> Result<()> {
	if range.min < floor {
		return Err(Error::Validation { message: format!("{key}.min must be at least {floor}.") });
	}
	if range.min > range.max {
		return Err(Error::Validation { message: format!("{key}.min must not exceed max.") });
	}

	Ok(())
}

fn validate_float(key: &str, range: FloatRange) -> Result<()> {
	if !range.min.is_finite() || !range.max.is_finite() {
		return Err(Error::Validation { message: format!("{key} bounds must be finite.") });
	}
	if range.min > range.max {
		return Err(Error::Validation { message: format!("{key}.min must not exceed max.") });
	}
	if range.step.is_some_and(|step| !(step.is_finite() && step > 0.0)) {
		return Err(Error::Validation {
			message: format!("{key}.step must be greater than zero."),
		});
	}

	Ok(())
}

fn validate_choices<T>(key: &str, choices: &[T]) -> Result<()> {
	if choices.is_empty() {
		return Err(Error::Validation { message: format!("{key} must list at least one choice.") });
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	cfg.service.log_level = cfg.service.log_level.trim().to_string();

	trim_api_base(&mut cfg.providers.embedding.api_base);
	trim_api_base(&mut cfg.providers.generation.api_base);
	trim_api_base(&mut cfg.providers.rerank.api_base);
}

fn trim_api_base(api_base: &mut String) {
	let trimmed = api_base.trim().trim_end_matches('/');

	*api_base = trimmed.to_string();
}

fn validation(message: &str) -> Error {
	Error::Validation { message: message.to_string() }
}
