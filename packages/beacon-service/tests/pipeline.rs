use std::{
	collections::HashMap,
	sync::{
		Arc, Mutex,
		atomic::{AtomicUsize, Ordering},
	},
};

use futures_util::{StreamExt, stream};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use beacon_domain::{
	CandidatePassage, DocumentPage, ModelOptions, MultiQueryOptions, Query, RerankerOptions,
	Scenario, VectorSearchOptions,
};
use beacon_service::{
	BoxFuture, CrossEncoder, CrossEncoderLoader, EmbeddingProvider, Error, GenerateRequest,
	GenerationProvider, Pipeline, PipelineEvent, PipelineRequest, Providers, Result,
	RetrievalProvider, SearchRequest, StreamOutcome, TokenStream, generate,
};

#[derive(Clone, Debug)]
struct SearchCall {
	text: String,
	limit: u32,
	threshold: f32,
	by_question: bool,
}

#[derive(Default)]
struct MockRetrieval {
	results: HashMap<String, Vec<CandidatePassage>>,
	failing: Option<String>,
	calls: Mutex<Vec<SearchCall>>,
}
impl MockRetrieval {
	fn with(mut self, question: &str, passages: Vec<CandidatePassage>) -> Self {
		self.results.insert(question.to_string(), passages);

		self
	}

	fn calls(&self) -> Vec<SearchCall> {
		self.calls.lock().expect("Failed to lock calls.").clone()
	}
}
impl RetrievalProvider for MockRetrieval {
	fn search<'a>(
		&'a self,
		req: SearchRequest<'a>,
	) -> BoxFuture<'a, Result<Vec<CandidatePassage>>> {
		Box::pin(async move {
			self.calls.lock().expect("Failed to lock calls.").push(SearchCall {
				text: req.text.to_string(),
				limit: req.limit,
				threshold: req.threshold,
				by_question: req.by_question,
			});

			if self.failing.as_deref() == Some(req.text) {
				return Err(Error::UpstreamUnavailable { message: "search failed".to_string() });
			}

			Ok(self.results.get(req.text).cloned().unwrap_or_default())
		})
	}

	fn list_documents<'a>(
		&'a self,
		_: &'a [String],
		_: u32,
		_: u32,
	) -> BoxFuture<'a, Result<DocumentPage>> {
		Box::pin(async { Ok(DocumentPage::default()) })
	}
}

struct MockGeneration {
	expansion: String,
	answer: Vec<String>,
	/// Cancels the token when the token at this index is pulled.
	cancel_at: Option<(usize, CancellationToken)>,
	pulls: Arc<AtomicUsize>,
	prompts: Mutex<Vec<String>>,
}
impl MockGeneration {
	fn new(answer: &[&str]) -> Self {
		Self {
			expansion: "{}".to_string(),
			answer: answer.iter().map(|token| token.to_string()).collect(),
			cancel_at: None,
			pulls: Arc::new(AtomicUsize::new(0)),
			prompts: Mutex::new(Vec::new()),
		}
	}

	fn with_expansion(mut self, expansion: &str) -> Self {
		self.expansion = expansion.to_string();

		self
	}
}
impl GenerationProvider for MockGeneration {
	fn generate<'a>(&'a self, req: &'a GenerateRequest<'a>) -> BoxFuture<'a, Result<String>> {
		Box::pin(async move {
			if req.format.is_some() {
				return Ok(self.expansion.clone());
			}

			self.prompts.lock().expect("Failed to lock prompts.").push(req.prompt.to_string());

			Ok(self.answer.concat())
		})
	}

	fn stream<'a>(&'a self, req: &'a GenerateRequest<'a>) -> BoxFuture<'a, Result<TokenStream>> {
		Box::pin(async move {
			self.prompts.lock().expect("Failed to lock prompts.").push(req.prompt.to_string());

			let cancel_at = self.cancel_at.clone();
			let pulls = self.pulls.clone();
			let tokens = stream::iter(self.answer.clone().into_iter().enumerate())
				.map(move |(idx, token)| {
					pulls.fetch_add(1, Ordering::SeqCst);

					match &cancel_at {
						Some((at, cancel)) if *at == idx => cancel.cancel(),
						_ => {},
					}

					Ok(token)
				})
				.boxed();

			Ok(tokens)
		})
	}
}

struct NoEmbedding;
impl EmbeddingProvider for NoEmbedding {
	fn embed<'a>(&'a self, texts: &'a [String]) -> BoxFuture<'a, Result<Vec<Vec<f32>>>> {
		Box::pin(async move { Ok(texts.iter().map(|_| vec![0.0; 4]).collect()) })
	}
}

struct ReverseScorer;
impl CrossEncoder for ReverseScorer {
	fn score(&self, _: &str, documents: &[String], _: usize) -> Result<Vec<f32>> {
		Ok((0..documents.len()).map(|idx| idx as f32).collect())
	}
}

#[derive(Default)]
struct CountingLoader {
	loads: AtomicUsize,
}
impl CrossEncoderLoader for CountingLoader {
	fn load(&self, _: &str) -> Result<Arc<dyn CrossEncoder>> {
		self.loads.fetch_add(1, Ordering::SeqCst);

		Ok(Arc::new(ReverseScorer))
	}
}

fn passage(id: &str, content: &str, similarity: f32) -> CandidatePassage {
	CandidatePassage { id: id.to_string(), content: content.to_string(), similarity }
}

fn scenario() -> Scenario {
	Scenario::new(
		ModelOptions {
			model_name: "llama3".to_string(),
			temperature: 0.2,
			top_k: 40,
			top_p: 0.9,
			system_prompt: String::new(),
		},
		None,
		VectorSearchOptions { top_n: 5, threshold: 0.1, search_by_query: false },
		None,
	)
	.expect("Failed to build scenario.")
}

fn request(question: &str, scenario: Scenario) -> PipelineRequest {
	PipelineRequest {
		query: Query::new(question, "user-1"),
		scenario,
		source_ids: vec!["source-a".to_string()],
	}
}

fn pipeline(
	retrieval: Arc<MockRetrieval>,
	generation: Arc<MockGeneration>,
	loader: Arc<CountingLoader>,
) -> Arc<Pipeline> {
	Arc::new(Pipeline::new(Providers::new(retrieval, generation, Arc::new(NoEmbedding), loader)))
}

async fn collect(mut rx: mpsc::Receiver<PipelineEvent>) -> Vec<PipelineEvent> {
	let mut events = Vec::new();

	while let Some(event) = rx.recv().await {
		events.push(event);
	}

	events
}

fn chunks(events: &[PipelineEvent]) -> Vec<String> {
	events
		.iter()
		.filter_map(|event| match event {
			PipelineEvent::Chunk(chunk) => Some(chunk.clone()),
			_ => None,
		})
		.collect()
}

#[tokio::test]
async fn answers_capital_of_france_with_single_question() {
	let question = "What is the capital of France?";
	let retrieval = Arc::new(
		MockRetrieval::default()
			.with(question, vec![passage("p1", "Paris is the capital of France.", 0.8)]),
	);
	let generation = Arc::new(MockGeneration::new(&["Paris", " is the", " capital."]));
	let pipeline = pipeline(retrieval.clone(), generation.clone(), Arc::default());
	let events =
		collect(pipeline.stream(request(question, scenario()), CancellationToken::new())).await;

	assert_eq!(chunks(&events), vec!["Paris", " is the", " capital."]);
	assert!(matches!(
		events.last(),
		Some(PipelineEvent::Passages(passages)) if passages == &["Paris is the capital of France."]
	));

	let calls = retrieval.calls();

	assert_eq!(calls.len(), 1);
	assert_eq!(calls[0].text, question);
	assert_eq!(calls[0].limit, 5);
	assert_eq!(calls[0].threshold, 0.1);
	assert!(!calls[0].by_question);

	let prompts = generation.prompts.lock().expect("Failed to lock prompts.").clone();

	assert!(prompts[0].contains("[1] Paris is the capital of France."));
}

#[tokio::test]
async fn shared_passage_keeps_later_score() {
	let question = "Where is the Louvre?";
	let retrieval = Arc::new(
		MockRetrieval::default()
			.with(question, vec![passage("p1", "old", 0.9), passage("p2", "museum", 0.6)])
			.with("Which city hosts the Louvre?", vec![passage("p1", "new", 0.4)]),
	);
	let generation = Arc::new(
		MockGeneration::new(&["Paris."])
			.with_expansion(r#"{"question_id_1":"Which city hosts the Louvre?"}"#),
	);
	let mut scenario = scenario();

	scenario.multi_query = Some(MultiQueryOptions { n_queries: 1, query_model_name: None });

	let answer = pipeline(retrieval.clone(), generation, Arc::default())
		.answer(&request(question, scenario))
		.await
		.expect("Failed to answer.");

	assert_eq!(answer.passages, vec!["museum", "new"]);
	assert_eq!(answer.answer, "Paris.");
	assert_eq!(retrieval.calls().len(), 2);
}

#[tokio::test]
async fn rephrasings_add_passages_without_a_reranker() {
	let question = "Who painted the Mona Lisa?";
	let rephrasing = "Which artist created the Mona Lisa?";
	let hits = |prefix: &str, top: f32| {
		(0..5)
			.map(|idx| {
				let id = format!("{prefix}{idx}");

				passage(&id, &id, top - idx as f32 * 0.1)
			})
			.collect::<Vec<_>>()
	};
	let retrieval = Arc::new(
		MockRetrieval::default().with(question, hits("a", 0.9)).with(rephrasing, hits("b", 0.85)),
	);
	let generation = Arc::new(
		MockGeneration::new(&["Leonardo."])
			.with_expansion(&format!(r#"{{"question_id_1":"{rephrasing}"}}"#)),
	);
	let mut scenario = scenario();

	scenario.multi_query = Some(MultiQueryOptions { n_queries: 1, query_model_name: None });

	let answer = pipeline(retrieval, generation, Arc::default())
		.answer(&request(question, scenario))
		.await
		.expect("Failed to answer.");

	assert_eq!(answer.passages.len(), 10);
	assert_eq!(answer.passages[..4], ["a0", "b0", "a1", "b1"]);
	assert!(["b2", "b3", "b4"].iter().all(|id| answer.passages.iter().any(|content| content == id)));
}

#[tokio::test]
async fn expansion_count_mismatch_is_a_contract_violation() {
	let question = "Why is the sky blue?";
	let retrieval = Arc::new(MockRetrieval::default());
	let generation = Arc::new(
		MockGeneration::new(&["Rayleigh."])
			.with_expansion(r#"{"question_id_1":"a","question_id_2":"b"}"#),
	);
	let mut scenario = scenario();

	scenario.multi_query = Some(MultiQueryOptions { n_queries: 3, query_model_name: None });

	let err = pipeline(retrieval.clone(), generation, Arc::default())
		.answer(&request(question, scenario))
		.await
		.expect_err("Expected a contract violation.");

	assert!(matches!(err, Error::ContractViolation { .. }), "{err:?}");
	assert_eq!(err.code(), "CONTRACT_VIOLATION");
	assert!(retrieval.calls().is_empty());
}

#[tokio::test]
async fn cancellation_after_chunk_stops_the_stream_quietly() {
	let cancel = CancellationToken::new();
	let mut generation = MockGeneration::new(&["a", "b", "c", "d", "e"]);

	// Cancelling while the third token is pulled simulates a disconnect after chunk 2.
	generation.cancel_at = Some((2, cancel.clone()));

	let generation = Arc::new(generation);
	let pipeline = pipeline(Arc::new(MockRetrieval::default()), generation.clone(), Arc::default());
	let events = collect(pipeline.stream(request("q", scenario()), cancel)).await;

	assert_eq!(chunks(&events), vec!["a", "b"]);
	assert!(events.iter().all(|event| matches!(event, PipelineEvent::Chunk(_))));
	assert_eq!(generation.pulls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn dropped_receiver_cancels_generation() {
	let generation = MockGeneration::new(&["a", "b"]);
	let (tx, rx) = mpsc::channel(1);

	drop(rx);

	let scenario = scenario();
	let req = GenerateRequest {
		model: &scenario.model.model_name,
		prompt: "prompt",
		system: None,
		options: Default::default(),
		format: None,
	};
	let outcome = generate::stream_answer(&generation, &req, &tx, &CancellationToken::new())
		.await
		.expect("Failed to stream.");

	assert_eq!(outcome, StreamOutcome::Cancelled { chunks: 0 });
}

#[tokio::test]
async fn closed_receiver_stops_before_retrieval() {
	let retrieval = Arc::new(MockRetrieval::default().with("q", vec![passage("p1", "one", 0.5)]));
	let generation = Arc::new(MockGeneration::new(&["x"]));
	let pipeline = pipeline(retrieval.clone(), generation.clone(), Arc::default());
	let (tx, rx) = mpsc::channel(1);

	drop(rx);

	let outcome = pipeline
		.run_streaming(&request("q", scenario()), &tx, &CancellationToken::new())
		.await
		.expect("Failed to run.");

	assert_eq!(outcome, StreamOutcome::Cancelled { chunks: 0 });
	assert!(retrieval.calls().is_empty());
	assert!(generation.prompts.lock().expect("Failed to lock prompts.").is_empty());
}

#[tokio::test]
async fn reranker_model_loads_once_across_requests() {
	let question = "q";
	let retrieval = Arc::new(MockRetrieval::default().with(
		question,
		vec![
			passage("p1", "first", 0.9),
			passage("p2", "second", 0.8),
			passage("p3", "third", 0.7),
		],
	));
	let loader = Arc::new(CountingLoader::default());
	let pipeline = pipeline(retrieval, Arc::new(MockGeneration::new(&["ok"])), loader.clone());
	let mut scenario = scenario();

	scenario.reranker =
		Some(RerankerOptions { top_k: 2, max_length: 512, model_name: "bge".to_string() });

	for _ in 0..4 {
		let answer =
			pipeline.answer(&request(question, scenario.clone())).await.expect("Failed to answer.");

		assert_eq!(answer.passages, vec!["third", "second"]);
	}

	assert_eq!(loader.loads.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn invalid_scenario_fails_before_retrieval() {
	let retrieval = Arc::new(MockRetrieval::default());
	let generation = Arc::new(MockGeneration::new(&["x"]));
	let pipeline = pipeline(retrieval.clone(), generation, Arc::default());
	let mut scenario = scenario();

	scenario.reranker =
		Some(RerankerOptions { top_k: 2, max_length: 512, model_name: String::new() });

	let events = collect(pipeline.stream(request("q", scenario), CancellationToken::new())).await;

	assert_eq!(events.len(), 1);
	assert!(matches!(&events[0], PipelineEvent::Failed(Error::ConfigInvalid { .. })));
	assert!(retrieval.calls().is_empty());
}

#[tokio::test]
async fn failed_search_aborts_the_request() {
	let mut retrieval = MockRetrieval::default().with("q", vec![passage("p1", "one", 0.5)]);

	retrieval.failing = Some("q".to_string());

	let pipeline =
		pipeline(Arc::new(retrieval), Arc::new(MockGeneration::new(&["x"])), Arc::default());
	let events = collect(pipeline.stream(request("q", scenario()), CancellationToken::new())).await;

	assert_eq!(events.len(), 1);
	assert!(matches!(&events[0], PipelineEvent::Failed(Error::UpstreamUnavailable { .. })));
}

#[tokio::test]
async fn empty_retrieval_still_generates() {
	let generation = Arc::new(MockGeneration::new(&["I do not know."]));
	let pipeline = pipeline(Arc::new(MockRetrieval::default()), generation.clone(), Arc::default());
	let answer = pipeline.answer(&request("q", scenario())).await.expect("Failed to answer.");

	assert!(answer.passages.is_empty());
	assert_eq!(answer.answer, "I do not know.");
	assert_eq!(answer.request_id, Query::new("q", "user-1").request_id());
}
