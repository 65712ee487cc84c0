//! Parameter sets to scenarios.

use beacon_domain::{MultiQueryOptions, RerankerOptions, Scenario};

use crate::{
	Error, Result,
	space::{self, ParamValue, ParameterSet},
};

/// Applies `params` on top of `base`. Knobs missing from `params` keep the base value; a parent
/// knob set to `false` removes its option group.
pub fn materialize(params: &ParameterSet, base: &Scenario) -> Result<Scenario> {
	let mut scenario = base.clone();
	let search = &mut scenario.vector_search;

	if let Some(top_n) = int(params, space::VECTOR_SEARCH_TOP_N)? {
		search.top_n = to_u32(space::VECTOR_SEARCH_TOP_N, top_n)?;
	}
	if let Some(threshold) = float(params, space::VECTOR_SEARCH_THRESHOLD)? {
		search.threshold = threshold as f32;
	}
	if let Some(by_query) = boolean(params, space::VECTOR_SEARCH_BY_QUERY)? {
		search.search_by_query = by_query;
	}

	let model = &mut scenario.model;

	if let Some(temperature) = float(params, space::MODEL_TEMPERATURE)? {
		model.temperature = temperature as f32;
	}
	if let Some(top_k) = int(params, space::MODEL_TOP_K)? {
		model.top_k = to_u32(space::MODEL_TOP_K, top_k)?;
	}
	if let Some(top_p) = float(params, space::MODEL_TOP_P)? {
		model.top_p = top_p as f32;
	}

	scenario.reranker = reranker(params, base.reranker.as_ref())?;
	scenario.multi_query = multi_query(params, base.multi_query.as_ref())?;

	scenario.validate()?;

	Ok(scenario)
}

fn reranker(
	params: &ParameterSet,
	base: Option<&RerankerOptions>,
) -> Result<Option<RerankerOptions>> {
	let enabled = boolean(params, space::RERANKER_ENABLED)?.unwrap_or(base.is_some());

	if !enabled {
		return Ok(None);
	}

	let top_k = match int(params, space::RERANKER_TOP_K)? {
		Some(top_k) => to_u32(space::RERANKER_TOP_K, top_k)?,
		None => base.map(|opts| opts.top_k).ok_or_else(|| missing(space::RERANKER_TOP_K))?,
	};
	let max_length = match int(params, space::RERANKER_MAX_LENGTH)? {
		Some(max_length) => to_u32(space::RERANKER_MAX_LENGTH, max_length)?,
		None =>
			base.map(|opts| opts.max_length).ok_or_else(|| missing(space::RERANKER_MAX_LENGTH))?,
	};
	let model_name = match text(params, space::RERANKER_MODEL)? {
		Some(model) => model.to_string(),
		None => base
			.map(|opts| opts.model_name.clone())
			.ok_or_else(|| missing(space::RERANKER_MODEL))?,
	};

	Ok(Some(RerankerOptions { top_k, max_length, model_name }))
}

fn multi_query(
	params: &ParameterSet,
	base: Option<&MultiQueryOptions>,
) -> Result<Option<MultiQueryOptions>> {
	let enabled = boolean(params, space::MULTI_QUERY_ENABLED)?.unwrap_or(base.is_some());

	if !enabled {
		return Ok(None);
	}

	let n_queries = match int(params, space::MULTI_QUERY_N_QUERIES)? {
		Some(n_queries) => to_u32(space::MULTI_QUERY_N_QUERIES, n_queries)?,
		None => base
			.map(|opts| opts.n_queries)
			.ok_or_else(|| missing(space::MULTI_QUERY_N_QUERIES))?,
	};
	let query_model_name = base.and_then(|opts| opts.query_model_name.clone());

	Ok(Some(MultiQueryOptions { n_queries, query_model_name }))
}

fn int(params: &ParameterSet, name: &str) -> Result<Option<i64>> {
	read(params, name, ParamValue::as_i64, "an integer")
}

fn float(params: &ParameterSet, name: &str) -> Result<Option<f64>> {
	read(params, name, ParamValue::as_f64, "a number")
}

fn boolean(params: &ParameterSet, name: &str) -> Result<Option<bool>> {
	read(params, name, ParamValue::as_bool, "a boolean")
}

fn text<'a>(params: &'a ParameterSet, name: &str) -> Result<Option<&'a str>> {
	read(params, name, ParamValue::as_str, "a string")
}

fn read<'a, T>(
	params: &'a ParameterSet,
	name: &str,
	get: impl Fn(&'a ParamValue) -> Option<T>,
	kind: &str,
) -> Result<Option<T>> {
	match params.get(name) {
		None => Ok(None),
		Some(value) => get(value)
			.map(Some)
			.ok_or_else(|| Error::InvalidParams { message: format!("{name} must be {kind}.") }),
	}
}

fn to_u32(name: &str, value: i64) -> Result<u32> {
	u32::try_from(value).map_err(|_| Error::InvalidParams {
		message: format!("{name} must be a non-negative 32-bit integer."),
	})
}

fn missing(name: &str) -> Error {
	Error::InvalidParams { message: format!("{name} is required when its group is enabled.") }
}

#[cfg(test)]
mod tests {
	use beacon_domain::{ModelOptions, VectorSearchOptions};

	use super::*;

	fn base() -> Scenario {
		Scenario::new(
			ModelOptions {
				model_name: "llama3".to_string(),
				temperature: 0.5,
				top_k: 40,
				top_p: 0.9,
				system_prompt: String::new(),
			},
			None,
			VectorSearchOptions { top_n: 10, threshold: 0.5, search_by_query: false },
			Some(RerankerOptions { top_k: 5, max_length: 512, model_name: "bge".to_string() }),
		)
		.expect("Failed to build base scenario.")
	}

	fn params(entries: &[(&str, ParamValue)]) -> ParameterSet {
		entries.iter().map(|(name, value)| (name.to_string(), value.clone())).collect()
	}

	#[test]
	fn missing_knobs_keep_base_values() {
		let scenario = materialize(&ParameterSet::new(), &base()).expect("Failed to materialize.");

		assert_eq!(scenario, base());
	}

	#[test]
	fn knobs_override_base_values() {
		let scenario = materialize(
			&params(&[
				(space::VECTOR_SEARCH_TOP_N, ParamValue::Int(12)),
				(space::VECTOR_SEARCH_THRESHOLD, ParamValue::Float(0.3)),
				(space::MODEL_TEMPERATURE, ParamValue::Float(0.1)),
				(space::MULTI_QUERY_ENABLED, ParamValue::Bool(true)),
				(space::MULTI_QUERY_N_QUERIES, ParamValue::Int(4)),
				(space::RERANKER_TOP_K, ParamValue::Int(6)),
			]),
			&base(),
		)
		.expect("Failed to materialize.");

		assert_eq!(scenario.vector_search.top_n, 12);
		assert_eq!(scenario.vector_search.threshold, 0.3);
		assert_eq!(scenario.model.temperature, 0.1);
		assert_eq!(scenario.multi_query.map(|opts| opts.n_queries), Some(4));
		assert_eq!(scenario.reranker.as_ref().map(|opts| opts.top_k), Some(6));
		assert_eq!(scenario.reranker.map(|opts| opts.model_name), Some("bge".to_string()));
	}

	#[test]
	fn disabled_parent_removes_the_group() {
		let scenario =
			materialize(&params(&[(space::RERANKER_ENABLED, ParamValue::Bool(false))]), &base())
				.expect("Failed to materialize.");

		assert!(scenario.reranker.is_none());
	}

	#[test]
	fn enabled_group_without_values_is_rejected() {
		let err =
			materialize(&params(&[(space::MULTI_QUERY_ENABLED, ParamValue::Bool(true))]), &base())
				.expect_err("Expected a missing knob.");

		assert!(err.to_string().contains(space::MULTI_QUERY_N_QUERIES), "{err}");
	}

	#[test]
	fn out_of_range_values_fail_validation() {
		let err = materialize(
			&params(&[(space::VECTOR_SEARCH_THRESHOLD, ParamValue::Float(1.5))]),
			&base(),
		)
		.expect_err("Expected a validation error.");

		assert!(matches!(err, Error::InvalidParams { .. }));
	}
}
