//! Answer generation, streamed into a channel or collected for evaluation.

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::{GenerateRequest, GenerationProvider, PipelineEvent, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamOutcome {
	Completed { chunks: usize },
	/// The caller cancelled or dropped the receiver. Not an error.
	Cancelled { chunks: usize },
}

/// Forwards tokens into `tx` in arrival order until the provider finishes or the caller goes
/// away. Cancellation is checked before every read and every send; the provider stream is dropped
/// as soon as it is observed, which closes the upstream connection.
pub async fn stream_answer(
	generation: &dyn GenerationProvider,
	req: &GenerateRequest<'_>,
	tx: &mpsc::Sender<PipelineEvent>,
	cancel: &CancellationToken,
) -> Result<StreamOutcome> {
	let mut chunks = 0;
	let mut tokens = tokio::select! {
		biased;
		_ = cancel.cancelled() => return Ok(StreamOutcome::Cancelled { chunks }),
		_ = tx.closed() => return Ok(StreamOutcome::Cancelled { chunks }),
		tokens = generation.stream(req) => tokens?,
	};

	loop {
		let token = tokio::select! {
			biased;
			_ = cancel.cancelled() => return Ok(StreamOutcome::Cancelled { chunks }),
			_ = tx.closed() => return Ok(StreamOutcome::Cancelled { chunks }),
			token = tokens.next() => token,
		};
		let Some(token) = token else {
			return Ok(StreamOutcome::Completed { chunks });
		};
		let token = token?;

		if token.is_empty() {
			continue;
		}

		let sent = tokio::select! {
			biased;
			_ = cancel.cancelled() => false,
			sent = tx.send(PipelineEvent::Chunk(token)) => sent.is_ok(),
		};

		if !sent {
			return Ok(StreamOutcome::Cancelled { chunks });
		}

		chunks += 1;
	}
}

/// Single-shot generation. Returns the full answer once the provider completes.
pub async fn generate_answer(
	generation: &dyn GenerationProvider,
	req: &GenerateRequest<'_>,
) -> Result<String> {
	generation.generate(req).await
}
