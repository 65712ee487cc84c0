pub mod aggregate;
pub mod expand;
pub mod generate;
pub mod pipeline;
pub mod rerank;

mod error;

pub use beacon_providers::generation::{GenerateRequest, SamplingOptions};
pub use error::{Error, Result};
pub use generate::StreamOutcome;
pub use pipeline::{Answer, Pipeline, PipelineEvent, PipelineRequest, Stage};
pub use rerank::Reranker;

use std::{future::Future, pin::Pin, sync::Arc};

use futures_util::{StreamExt, stream::BoxStream};

use beacon_config::Config;
use beacon_domain::{CandidatePassage, DocumentPage};
use beacon_providers::{embedding, generation};
use beacon_storage::qdrant::QdrantStore;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub type TokenStream = BoxStream<'static, Result<String>>;

#[derive(Clone, Copy, Debug)]
pub struct SearchRequest<'a> {
	pub text: &'a str,
	pub source_ids: &'a [String],
	pub limit: u32,
	pub threshold: f32,
	pub by_question: bool,
}

pub trait RetrievalProvider
where
	Self: Send + Sync,
{
	fn search<'a>(
		&'a self,
		req: SearchRequest<'a>,
	) -> BoxFuture<'a, Result<Vec<CandidatePassage>>>;

	fn list_documents<'a>(
		&'a self,
		source_ids: &'a [String],
		page: u32,
		size: u32,
	) -> BoxFuture<'a, Result<DocumentPage>>;
}

pub trait GenerationProvider
where
	Self: Send + Sync,
{
	fn generate<'a>(&'a self, req: &'a GenerateRequest<'a>) -> BoxFuture<'a, Result<String>>;

	fn stream<'a>(&'a self, req: &'a GenerateRequest<'a>) -> BoxFuture<'a, Result<TokenStream>>;
}

pub trait EmbeddingProvider
where
	Self: Send + Sync,
{
	fn embed<'a>(&'a self, texts: &'a [String]) -> BoxFuture<'a, Result<Vec<Vec<f32>>>>;
}

/// A loaded relevance scorer. Calls block; the reranker runs them on the blocking pool.
pub trait CrossEncoder
where
	Self: Send + Sync,
{
	fn score(&self, query: &str, documents: &[String], max_length: usize) -> Result<Vec<f32>>;
}

/// Loads scorers by model identity. Loading is slow and blocking.
pub trait CrossEncoderLoader
where
	Self: Send + Sync,
{
	fn load(&self, model: &str) -> Result<Arc<dyn CrossEncoder>>;
}

#[derive(Clone)]
pub struct Providers {
	pub retrieval: Arc<dyn RetrievalProvider>,
	pub generation: Arc<dyn GenerationProvider>,
	pub embedding: Arc<dyn EmbeddingProvider>,
	pub cross_encoder: Arc<dyn CrossEncoderLoader>,
}
impl Providers {
	pub fn new(
		retrieval: Arc<dyn RetrievalProvider>,
		generation: Arc<dyn GenerationProvider>,
		embedding: Arc<dyn EmbeddingProvider>,
		cross_encoder: Arc<dyn CrossEncoderLoader>,
	) -> Self {
		Self { retrieval, generation, embedding, cross_encoder }
	}

	/// HTTP providers from the config, with Qdrant-backed retrieval.
	pub fn from_config(cfg: Arc<Config>, qdrant: QdrantStore) -> Self {
		let defaults = Arc::new(DefaultProviders { cfg });
		let retrieval = Arc::new(QdrantRetrieval { qdrant, embedding: defaults.clone() });

		Self::new(retrieval, defaults.clone(), defaults.clone(), defaults)
	}
}

struct DefaultProviders {
	cfg: Arc<Config>,
}

impl GenerationProvider for DefaultProviders {
	fn generate<'a>(&'a self, req: &'a GenerateRequest<'a>) -> BoxFuture<'a, Result<String>> {
		Box::pin(async move {
			Ok(generation::generate(&self.cfg.providers.generation, req).await?)
		})
	}

	fn stream<'a>(&'a self, req: &'a GenerateRequest<'a>) -> BoxFuture<'a, Result<TokenStream>> {
		Box::pin(async move {
			let tokens = generation::generate_stream(&self.cfg.providers.generation, req).await?;

			Ok(tokens.map(|token| token.map_err(Error::from)).boxed())
		})
	}
}

impl EmbeddingProvider for DefaultProviders {
	fn embed<'a>(&'a self, texts: &'a [String]) -> BoxFuture<'a, Result<Vec<Vec<f32>>>> {
		Box::pin(async move { Ok(embedding::embed(&self.cfg.providers.embedding, texts).await?) })
	}
}

impl CrossEncoderLoader for DefaultProviders {
	fn load(&self, model: &str) -> Result<Arc<dyn CrossEncoder>> {
		let encoder =
			beacon_providers::rerank::CrossEncoder::load(&self.cfg.providers.rerank, model)?;

		Ok(Arc::new(encoder))
	}
}

impl CrossEncoder for beacon_providers::rerank::CrossEncoder {
	fn score(&self, query: &str, documents: &[String], max_length: usize) -> Result<Vec<f32>> {
		Ok(beacon_providers::rerank::CrossEncoder::score(self, query, documents, max_length)?)
	}
}

struct QdrantRetrieval {
	qdrant: QdrantStore,
	embedding: Arc<dyn EmbeddingProvider>,
}

impl RetrievalProvider for QdrantRetrieval {
	fn search<'a>(
		&'a self,
		req: SearchRequest<'a>,
	) -> BoxFuture<'a, Result<Vec<CandidatePassage>>> {
		Box::pin(async move {
			let texts = [req.text.to_string()];
			let vector = self.embedding.embed(&texts).await?.into_iter().next().ok_or_else(|| {
				Error::UpstreamUnavailable {
					message: "Embedding provider returned no vector.".to_string(),
				}
			})?;
			let passages = self
				.qdrant
				.search_passages(vector, req.source_ids, req.limit, req.threshold, req.by_question)
				.await?;

			Ok(passages)
		})
	}

	fn list_documents<'a>(
		&'a self,
		source_ids: &'a [String],
		page: u32,
		size: u32,
	) -> BoxFuture<'a, Result<DocumentPage>> {
		Box::pin(async move { Ok(self.qdrant.list_documents(source_ids, page, size).await?) })
	}
}
