//! Cross-encoder reranking with a single cached model.

use std::sync::{Arc, Mutex};

use tokio::task;

use beacon_domain::RerankerOptions;

use crate::{CrossEncoder, CrossEncoderLoader, Error, Result, aggregate};

struct CacheEntry {
	model: String,
	scorer: Arc<dyn CrossEncoder>,
}

/// Owns the process-wide scorer. Cloning shares the cache.
#[derive(Clone)]
pub struct Reranker {
	loader: Arc<dyn CrossEncoderLoader>,
	cache: Arc<Mutex<Option<CacheEntry>>>,
}
impl Reranker {
	pub fn new(loader: Arc<dyn CrossEncoderLoader>) -> Self {
		Self { loader, cache: Arc::new(Mutex::new(None)) }
	}

	/// Loads `model` ahead of the first request.
	pub async fn warm(&self, model: &str) -> Result<()> {
		let reranker = self.clone();
		let model = model.to_string();

		run_blocking(move || reranker.scorer_for(&model).map(|_| ())).await
	}

	/// Returns at most `opts.top_k` passages ordered by cross-encoder score, descending.
	/// Equal scores keep their input order.
	pub async fn rerank(
		&self,
		query: &str,
		passages: Vec<String>,
		opts: &RerankerOptions,
	) -> Result<Vec<String>> {
		if passages.is_empty() {
			return Ok(passages);
		}

		let reranker = self.clone();
		let query = query.to_string();
		let model = opts.model_name.clone();
		let max_length = opts.max_length as usize;
		let top_k = opts.top_k as usize;

		run_blocking(move || {
			let scorer = reranker.scorer_for(&model)?;
			let scores = scorer.score(&query, &passages, max_length)?;

			if scores.len() != passages.len() {
				return Err(Error::UpstreamUnavailable {
					message: format!(
						"Reranker returned {} scores for {} passages.",
						scores.len(),
						passages.len()
					),
				});
			}

			Ok(select_top_k(passages, &scores, top_k))
		})
		.await
	}

	/// Identity check, reload and handle acquisition share one lock. The old entry is dropped
	/// before the replacement loads.
	fn scorer_for(&self, model: &str) -> Result<Arc<dyn CrossEncoder>> {
		let mut cache = self.cache.lock().unwrap_or_else(|err| err.into_inner());

		if let Some(entry) = cache.as_ref().filter(|entry| entry.model == model) {
			return Ok(entry.scorer.clone());
		}
		if let Some(previous) = cache.take() {
			tracing::info!(previous = %previous.model, next = model, "Replacing cross-encoder.");
		}

		let scorer = self.loader.load(model)?;

		*cache = Some(CacheEntry { model: model.to_string(), scorer: scorer.clone() });

		Ok(scorer)
	}
}

async fn run_blocking<T, F>(f: F) -> Result<T>
where
	T: Send + 'static,
	F: FnOnce() -> Result<T> + Send + 'static,
{
	task::spawn_blocking(f).await.map_err(|err| Error::UpstreamUnavailable {
		message: format!("Reranker task failed: {err}."),
	})?
}

fn select_top_k(passages: Vec<String>, scores: &[f32], top_k: usize) -> Vec<String> {
	let mut order = (0..passages.len()).collect::<Vec<_>>();

	order.sort_by(|&a, &b| aggregate::cmp_f32_desc(scores[a], scores[b]));
	order.truncate(top_k);

	let mut slots = passages.into_iter().map(Some).collect::<Vec<_>>();

	order.into_iter().filter_map(|idx| slots[idx].take()).collect()
}
