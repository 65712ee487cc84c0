//! Per-request stage sequencing: `Init → Expand? → Retrieve → Rerank? → Generate → Done`, with
//! `Error` reachable from every stage.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use beacon_domain::{Query, RequestId, Scenario, prompt};

use crate::{
	Error, GenerateRequest, Providers, Reranker, Result, SamplingOptions, StreamOutcome,
	aggregate::{self, RetrieveOptions},
	expand, generate,
};

/// Events buffered between the pipeline task and the transport before backpressure applies.
const EVENT_BUFFER: usize = 16;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
	Init,
	Expand,
	Retrieve,
	Rerank,
	Generate,
	Done,
	Error,
}

#[derive(Clone, Debug)]
pub struct PipelineRequest {
	pub query: Query,
	pub scenario: Scenario,
	pub source_ids: Vec<String>,
}

#[derive(Debug)]
pub enum PipelineEvent {
	Chunk(String),
	/// The final ranked passage contents, sent once after the last chunk.
	Passages(Vec<String>),
	/// Terminal. Nothing follows it.
	Failed(Error),
}

/// Result of a non-streaming run.
#[derive(Clone, Debug, Serialize)]
pub struct Answer {
	pub request_id: RequestId,
	pub answer: String,
	pub passages: Vec<String>,
}

struct RequestRun {
	request_id: RequestId,
	stage: Stage,
}
impl RequestRun {
	fn start(req: &PipelineRequest) -> Self {
		let request_id = req.query.request_id();

		tracing::info!(
			request_id = %request_id,
			content_len = req.query.content.len(),
			sources = req.source_ids.len(),
			multi_query = req.scenario.multi_query.is_some(),
			reranker = req.scenario.reranker.is_some(),
			"Pipeline request started."
		);

		Self { request_id, stage: Stage::Init }
	}

	fn enter(&mut self, stage: Stage) {
		tracing::debug!(
			request_id = %self.request_id,
			from = ?self.stage,
			to = ?stage,
			"Pipeline stage entered."
		);

		self.stage = stage;
	}

	fn fail(&mut self, err: Error) -> Error {
		tracing::error!(
			request_id = %self.request_id,
			stage = ?self.stage,
			error_code = err.code(),
			error = %err,
			"Pipeline request failed."
		);

		self.stage = Stage::Error;

		err
	}
}

pub struct Pipeline {
	providers: Providers,
	reranker: Reranker,
}
impl Pipeline {
	pub fn new(providers: Providers) -> Self {
		let reranker = Reranker::new(providers.cross_encoder.clone());

		Self { providers, reranker }
	}

	pub fn providers(&self) -> &Providers {
		&self.providers
	}

	pub fn reranker(&self) -> &Reranker {
		&self.reranker
	}

	/// Runs the whole pipeline and collects the answer. Used by evaluation.
	pub async fn answer(&self, req: &PipelineRequest) -> Result<Answer> {
		let mut run = RequestRun::start(req);
		let prepared = self.prepare(&mut run, req).await;
		let passages = prepared.map_err(|err| run.fail(err))?;

		run.enter(Stage::Generate);

		let prompt = prompt::answer_prompt(&req.query.content, &passages);
		let generated = generate::generate_answer(
			self.providers.generation.as_ref(),
			&generate_request(&req.scenario, &prompt),
		)
		.await;
		let answer = generated.map_err(|err| run.fail(err))?;

		run.enter(Stage::Done);

		Ok(Answer { request_id: run.request_id, answer, passages })
	}

	/// Streams chunks into `tx`, then the passage list on completion.
	///
	/// Errors are returned, not sent. Cancelling or closing the receiver stops the run at any
	/// stage; a stopped run sends nothing further and is not an error.
	pub async fn run_streaming(
		&self,
		req: &PipelineRequest,
		tx: &mpsc::Sender<PipelineEvent>,
		cancel: &CancellationToken,
	) -> Result<StreamOutcome> {
		let mut run = RequestRun::start(req);
		let prepared = tokio::select! {
			biased;
			_ = cancel.cancelled() => None,
			_ = tx.closed() => None,
			prepared = self.prepare(&mut run, req) => Some(prepared),
		};
		let Some(prepared) = prepared else {
			tracing::info!(request_id = %run.request_id, "Pipeline request cancelled.");

			return Ok(StreamOutcome::Cancelled { chunks: 0 });
		};
		let passages = prepared.map_err(|err| run.fail(err))?;

		run.enter(Stage::Generate);

		let prompt = prompt::answer_prompt(&req.query.content, &passages);
		let streamed = generate::stream_answer(
			self.providers.generation.as_ref(),
			&generate_request(&req.scenario, &prompt),
			tx,
			cancel,
		)
		.await;
		let outcome = streamed.map_err(|err| run.fail(err))?;

		match outcome {
			StreamOutcome::Completed { chunks } => {
				// A closed receiver at this point only loses the trailing record.
				let _ = tx.send(PipelineEvent::Passages(passages)).await;

				run.enter(Stage::Done);
				tracing::info!(request_id = %run.request_id, chunks, "Pipeline request completed.");
			},
			StreamOutcome::Cancelled { chunks } => {
				run.enter(Stage::Done);
				tracing::info!(request_id = %run.request_id, chunks, "Pipeline request cancelled.");
			},
		}

		Ok(outcome)
	}

	/// Spawns [`Pipeline::run_streaming`] and returns the event receiver. Dropping the receiver
	/// cancels the run; a failure arrives as a final [`PipelineEvent::Failed`].
	pub fn stream(
		self: &Arc<Self>,
		req: PipelineRequest,
		cancel: CancellationToken,
	) -> mpsc::Receiver<PipelineEvent> {
		let (tx, rx) = mpsc::channel(EVENT_BUFFER);
		let pipeline = self.clone();

		tokio::spawn(async move {
			if let Err(err) = pipeline.run_streaming(&req, &tx, &cancel).await {
				let _ = tx.send(PipelineEvent::Failed(err)).await;
			}
		});

		rx
	}

	/// Init through Rerank. Returns the ranked passage contents.
	async fn prepare(&self, run: &mut RequestRun, req: &PipelineRequest) -> Result<Vec<String>> {
		let scenario = &req.scenario;

		scenario.validate()?;

		let question = &req.query.content;
		let mut questions = vec![question.clone()];

		if let Some(multi_query) = &scenario.multi_query {
			run.enter(Stage::Expand);

			let phrasings = expand::expand(
				self.providers.generation.as_ref(),
				question,
				multi_query.n_queries,
				scenario.expansion_model(),
			)
			.await?;

			questions.extend(phrasings);
		}

		run.enter(Stage::Retrieve);

		let search = &scenario.vector_search;
		let merged = aggregate::retrieve_all(
			self.providers.retrieval.as_ref(),
			&questions,
			RetrieveOptions {
				source_ids: &req.source_ids,
				limit: search.top_n,
				threshold: search.threshold,
				by_question: search.search_by_query,
			},
		)
		.await?;
		let mut passages = merged.into_iter().map(|passage| passage.content).collect::<Vec<_>>();

		// Without a reranker every merged passage grounds the answer, in similarity order.
		if let Some(reranker) = &scenario.reranker {
			run.enter(Stage::Rerank);

			passages = self.reranker.rerank(question, passages, reranker).await?;
		}

		Ok(passages)
	}
}

fn generate_request<'a>(scenario: &'a Scenario, prompt: &'a str) -> GenerateRequest<'a> {
	let model = &scenario.model;

	GenerateRequest {
		model: &model.model_name,
		prompt,
		system: Some(model.system_prompt.as_str()).filter(|system| !system.trim().is_empty()),
		options: SamplingOptions {
			temperature: Some(model.temperature),
			top_k: Some(model.top_k),
			top_p: Some(model.top_p),
		},
		format: None,
	}
}
