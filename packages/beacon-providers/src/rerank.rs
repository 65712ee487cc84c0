// std
use std::time::Duration;

// crates.io
use reqwest::{Client, header::HeaderMap};
use serde_json::Value;
use tokenizers::Tokenizer;
use tokio::runtime::Handle;

// self
use crate::{Error, Result};

/// Special tokens a cross-encoder adds around a query/document pair.
const PAIR_SPECIAL_TOKENS: usize = 4;

/// A cross-encoder bound to one model identity.
///
/// Both [`CrossEncoder::load`] and [`CrossEncoder::score`] block the calling thread. Call them
/// from the blocking pool, never from an async worker thread.
pub struct CrossEncoder {
	model: String,
	tokenizer: Tokenizer,
	client: Client,
	url: String,
	headers: HeaderMap,
	runtime: Handle,
}
impl CrossEncoder {
	/// Fetches the model's tokenizer and binds the scoring endpoint.
	pub fn load(cfg: &beacon_config::ProviderConfig, model: &str) -> Result<Self> {
		let runtime = Handle::try_current().map_err(|err| Error::InvalidConfig {
			message: format!("Cross-encoder must be loaded inside a Tokio runtime: {err}."),
		})?;
		let tokenizer = Tokenizer::from_pretrained(model, None)
			.map_err(|err| Error::Tokenizer { message: err.to_string() })?;
		let client = Client::builder().timeout(Duration::from_millis(cfg.timeout_ms)).build()?;
		let headers = crate::auth_headers(&cfg.api_key, &cfg.default_headers)?;

		tracing::info!(model, "Cross-encoder loaded.");

		Ok(Self {
			model: model.to_string(),
			tokenizer,
			client,
			url: format!("{}{}", cfg.api_base, cfg.path),
			headers,
			runtime,
		})
	}

	/// Returns one relevance score per document, aligned with the input order.
	pub fn score(&self, query: &str, documents: &[String], max_length: usize) -> Result<Vec<f32>> {
		if documents.is_empty() {
			return Ok(Vec::new());
		}

		let truncated = self.truncate(query, documents, max_length)?;

		self.runtime.block_on(self.request(query, &truncated))
	}

	fn truncate(
		&self,
		query: &str,
		documents: &[String],
		max_length: usize,
	) -> Result<Vec<String>> {
		let query_tokens = self.token_count(query)?;
		let budget = max_length.saturating_sub(query_tokens + PAIR_SPECIAL_TOKENS);

		documents.iter().map(|doc| self.truncate_one(doc, budget)).collect()
	}

	fn truncate_one(&self, doc: &str, budget: usize) -> Result<String> {
		let encoding = self
			.tokenizer
			.encode(doc, false)
			.map_err(|err| Error::Tokenizer { message: err.to_string() })?;
		let ids = encoding.get_ids();

		if ids.len() <= budget {
			return Ok(doc.to_string());
		}

		self.tokenizer
			.decode(&ids[..budget], true)
			.map_err(|err| Error::Tokenizer { message: err.to_string() })
	}

	fn token_count(&self, text: &str) -> Result<usize> {
		self.tokenizer
			.encode(text, false)
			.map(|encoding| encoding.len())
			.map_err(|err| Error::Tokenizer { message: err.to_string() })
	}

	async fn request(&self, query: &str, documents: &[String]) -> Result<Vec<f32>> {
		let body = serde_json::json!({
			"model": self.model,
			"query": query,
			"documents": documents,
		});
		let res =
			self.client.post(&self.url).headers(self.headers.clone()).json(&body).send().await?;
		let json: Value = res.error_for_status()?.json().await?;

		parse_rerank_response(json, documents.len())
	}
}

fn parse_rerank_response(json: Value, doc_count: usize) -> Result<Vec<f32>> {
	let mut scores = vec![f32::NEG_INFINITY; doc_count];
	let results = json
		.get("results")
		.or_else(|| json.get("data"))
		.and_then(|v| v.as_array())
		.ok_or_else(|| Error::InvalidResponse {
			message: "Rerank response is missing results array.".to_string(),
		})?;

	for item in results {
		let index = item.get("index").and_then(|v| v.as_u64()).ok_or_else(|| {
			Error::InvalidResponse { message: "Rerank result missing index.".to_string() }
		})? as usize;
		let score = item
			.get("relevance_score")
			.or_else(|| item.get("score"))
			.and_then(|v| v.as_f64())
			.ok_or_else(|| Error::InvalidResponse {
				message: "Rerank result missing score.".to_string(),
			})? as f32;

		if index < scores.len() {
			scores[index] = score;
		}
	}

	Ok(scores)
}
