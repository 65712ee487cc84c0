use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;

use crate::{Error, Result};

#[derive(Deserialize)]
struct EmbeddingResponse {
	data: Vec<EmbeddingItem>,
}

#[derive(Deserialize)]
struct EmbeddingItem {
	#[serde(default)]
	index: Option<usize>,
	embedding: Vec<f32>,
}

/// Embeds `texts` in one request. Returns one vector per input, in input order.
pub async fn embed(
	cfg: &beacon_config::EmbeddingProviderConfig,
	texts: &[String],
) -> Result<Vec<Vec<f32>>> {
	if texts.is_empty() {
		return Ok(Vec::new());
	}

	let client = Client::builder().timeout(Duration::from_millis(cfg.timeout_ms)).build()?;
	let body = serde_json::json!({
		"model": cfg.model,
		"input": texts,
		"dimensions": cfg.dimensions,
	});
	let json: Value = client
		.post(format!("{}{}", cfg.api_base, cfg.path))
		.headers(crate::auth_headers(&cfg.api_key, &cfg.default_headers)?)
		.json(&body)
		.send()
		.await?
		.error_for_status()?
		.json()
		.await?;
	let vectors = parse_embedding_response(json)?;

	if vectors.len() != texts.len() {
		return Err(Error::InvalidResponse {
			message: format!(
				"Embedding provider returned {} vectors for {} inputs.",
				vectors.len(),
				texts.len()
			),
		});
	}

	Ok(vectors)
}

/// Vectors in `index` order. Items without an index keep their position.
fn parse_embedding_response(json: Value) -> Result<Vec<Vec<f32>>> {
	let response: EmbeddingResponse = serde_json::from_value(json).map_err(|err| {
		Error::InvalidResponse { message: format!("Malformed embedding response: {err}.") }
	})?;
	let mut items = response
		.data
		.into_iter()
		.enumerate()
		.map(|(position, item)| (item.index.unwrap_or(position), item.embedding))
		.collect::<Vec<_>>();

	items.sort_by_key(|(index, _)| *index);

	Ok(items.into_iter().map(|(_, embedding)| embedding).collect())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_embeddings_in_index_order() {
		let json = serde_json::json!({
			"data": [
				{ "index": 1, "embedding": [2.0, 3.0] },
				{ "index": 0, "embedding": [0.5, 1.5] }
			]
		});
		let parsed = parse_embedding_response(json).expect("Failed to parse embeddings.");

		assert_eq!(parsed, vec![vec![0.5, 1.5], vec![2.0, 3.0]]);
	}

	#[test]
	fn rejects_missing_data() {
		let err = parse_embedding_response(serde_json::json!({ "object": "list" }))
			.expect_err("Expected missing data error.");

		assert!(matches!(err, Error::InvalidResponse { .. }), "Unexpected error: {err}");
	}
}
