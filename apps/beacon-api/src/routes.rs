use std::mem;

use axum::{
	Json, Router,
	body::Body,
	extract::State,
	http::{StatusCode, header},
	response::{IntoResponse, Response},
	routing::{get, post},
};
use futures_util::stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, DropGuard};
use tower::limit::GlobalConcurrencyLimitLayer;

use beacon_domain::{Query, Scenario};
use beacon_service::{Error as ServiceError, PipelineEvent, PipelineRequest};
use beacon_tuner::{Error as TunerError, TuneJob, TuneOutcome};

use crate::state::AppState;

const NDJSON: &str = "application/x-ndjson";

#[derive(Debug, Deserialize)]
pub struct QueryBody {
	pub query: Query,
	/// Parsed after extraction so an invalid scenario maps to `INVALID_SCENARIO`.
	#[serde(default)]
	pub scenario: Option<Value>,
	#[serde(default)]
	pub source_ids: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct TuneAccepted {
	pub study: String,
}

/// One line of a query response stream.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Record {
	Chunk { content: String },
	Passages { passages: Vec<String>, source_ids: Vec<String> },
	Error { error_code: &'static str, message: String },
}

/// Turns pipeline events into NDJSON lines. Dropping it cancels the run.
struct RecordStream {
	pending: Option<PipelineEvent>,
	events: mpsc::Receiver<PipelineEvent>,
	source_ids: Vec<String>,
	finished: bool,
	_cancel: DropGuard,
}
impl RecordStream {
	async fn next_line(&mut self) -> Option<Result<String, serde_json::Error>> {
		if self.finished {
			return None;
		}

		let event = match self.pending.take() {
			Some(event) => event,
			None => self.events.recv().await?,
		};
		let record = match event {
			PipelineEvent::Chunk(content) => Record::Chunk { content },
			PipelineEvent::Passages(passages) => {
				self.finished = true;

				Record::Passages { passages, source_ids: mem::take(&mut self.source_ids) }
			},
			PipelineEvent::Failed(err) => {
				self.finished = true;

				tracing::warn!(error_code = err.code(), error = %err, "Query stream failed.");

				Record::Error { error_code: err.code(), message: err.to_string() }
			},
		};

		Some(serde_json::to_string(&record).map(|mut line| {
			line.push('\n');

			line
		}))
	}
}

pub fn router(state: AppState) -> Router {
	let limit = GlobalConcurrencyLimitLayer::new(state.max_concurrent_requests);

	Router::new()
		.route("/health", get(health))
		.route("/v1/query", post(query))
		.route("/v1/scenario/default", get(default_scenario))
		.route("/v1/tune", post(tune))
		.route("/v1/tune/sync", post(tune_sync))
		.layer(limit)
		.with_state(state)
}

async fn health() -> StatusCode {
	StatusCode::OK
}

async fn query(
	State(state): State<AppState>,
	Json(payload): Json<QueryBody>,
) -> Result<Response, ApiError> {
	let scenario = match payload.scenario {
		Some(raw) => serde_json::from_value(raw).map_err(|err| {
			ApiError::new(
				StatusCode::BAD_REQUEST,
				"INVALID_SCENARIO",
				err.to_string(),
				Some(vec!["$.scenario".to_string()]),
			)
		})?,
		None => state.default_scenario.as_ref().clone(),
	};
	let source_ids = payload.source_ids.clone();
	let req = PipelineRequest { query: payload.query, scenario, source_ids: payload.source_ids };
	let cancel = CancellationToken::new();
	let mut events = state.pipeline.stream(req, cancel.clone());
	// Failures before the first chunk still get a status code.
	let first = match events.recv().await {
		Some(PipelineEvent::Failed(err)) => return Err(err.into()),
		Some(event) => event,
		None => return Err(ApiError::internal("Pipeline ended without a response.")),
	};
	let records = RecordStream {
		pending: Some(first),
		events,
		source_ids,
		finished: false,
		_cancel: cancel.drop_guard(),
	};
	let body = stream::unfold(records, |mut records| async move {
		let line = records.next_line().await?;

		Some((line, records))
	});

	Ok(([(header::CONTENT_TYPE, NDJSON)], Body::from_stream(body)).into_response())
}

async fn default_scenario(State(state): State<AppState>) -> Json<Scenario> {
	Json(state.default_scenario.as_ref().clone())
}

async fn tune(
	State(state): State<AppState>,
	Json(job): Json<TuneJob>,
) -> Result<(StatusCode, Json<TuneAccepted>), ApiError> {
	validate_job(&job)?;

	let Some(tuning) = state.tuning.clone() else {
		return Err(ApiError::tuning_unavailable());
	};
	let study = beacon_tuner::study_name(&job.source_ids);
	let pipeline = state.pipeline.clone();

	tokio::spawn(async move {
		match beacon_tuner::run_job(pipeline, tuning.db, &tuning.config, &job).await {
			Ok(TuneOutcome::Study(report)) => tracing::info!(
				study = %report.study,
				trials_run = report.trials_run,
				failed = report.failed,
				"Tuning job finished."
			),
			Ok(TuneOutcome::Evaluation(evaluation)) => {
				tracing::info!(scores = ?evaluation.scores, "Evaluation job finished.")
			},
			Err(err) => tracing::error!(error = %err, "Tuning job failed."),
		}
	});

	Ok((StatusCode::ACCEPTED, Json(TuneAccepted { study })))
}

async fn tune_sync(
	State(state): State<AppState>,
	Json(job): Json<TuneJob>,
) -> Result<Response, ApiError> {
	validate_job(&job)?;

	let Some(tuning) = state.tuning.clone() else {
		return Err(ApiError::tuning_unavailable());
	};
	let outcome =
		beacon_tuner::run_job(state.pipeline.clone(), tuning.db, &tuning.config, &job).await?;
	let response = match outcome {
		TuneOutcome::Study(report) => Json(report.recommended).into_response(),
		TuneOutcome::Evaluation(evaluation) => Json(evaluation).into_response(),
	};

	Ok(response)
}

fn validate_job(job: &TuneJob) -> Result<(), ApiError> {
	if job.source_ids.is_empty() {
		return Err(ApiError::new(
			StatusCode::BAD_REQUEST,
			"INVALID_REQUEST",
			"source_ids must be non-empty.",
			Some(vec!["$.source_ids".to_string()]),
		));
	}

	job.validate()?;

	Ok(())
}

#[derive(Debug, Serialize)]
struct ErrorBody {
	error_code: String,
	message: String,
	fields: Option<Vec<String>>,
}

#[derive(Debug)]
pub struct ApiError {
	status: StatusCode,
	error_code: String,
	message: String,
	fields: Option<Vec<String>>,
}
impl ApiError {
	fn new(
		status: StatusCode,
		error_code: impl Into<String>,
		message: impl Into<String>,
		fields: Option<Vec<String>>,
	) -> Self {
		Self { status, error_code: error_code.into(), message: message.into(), fields }
	}

	fn internal(message: impl Into<String>) -> Self {
		Self::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL", message, None)
	}

	fn tuning_unavailable() -> Self {
		Self::new(
			StatusCode::SERVICE_UNAVAILABLE,
			"TUNING_UNAVAILABLE",
			"Tuning requires a configured database.",
			None,
		)
	}
}
impl From<ServiceError> for ApiError {
	fn from(err: ServiceError) -> Self {
		let status = match &err {
			ServiceError::ConfigInvalid { .. } => StatusCode::BAD_REQUEST,
			ServiceError::ContractViolation { .. } => StatusCode::BAD_GATEWAY,
			ServiceError::UpstreamUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
		};

		Self::new(status, err.code(), err.to_string(), None)
	}
}
impl From<TunerError> for ApiError {
	fn from(err: TunerError) -> Self {
		match err {
			TunerError::Service(err) => err.into(),
			TunerError::Storage(err) => Self::new(
				StatusCode::SERVICE_UNAVAILABLE,
				"UPSTREAM_UNAVAILABLE",
				err.to_string(),
				None,
			),
			TunerError::InvalidParams { message } => {
				Self::new(StatusCode::BAD_REQUEST, "INVALID_SCENARIO", message, None)
			},
			TunerError::Dataset { message } => {
				Self::new(StatusCode::UNPROCESSABLE_ENTITY, "INVALID_DATASET", message, None)
			},
			TunerError::SerdeJson(err) => Self::internal(err.to_string()),
		}
	}
}
impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let body =
			ErrorBody { error_code: self.error_code, message: self.message, fields: self.fields };

		(self.status, Json(body)).into_response()
	}
}
