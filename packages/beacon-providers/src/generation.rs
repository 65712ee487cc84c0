//! Client for Ollama-compatible `/api/generate` endpoints.
//!
//! Streaming responses are newline-delimited JSON objects, each carrying a `response` text
//! fragment, with `done: true` on the last one.

use std::time::Duration;

use futures_util::{
	Stream, StreamExt,
	stream::{self, BoxStream},
};
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;

use crate::{Error, Result};

pub type TokenStream = BoxStream<'static, Result<String>>;

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct SamplingOptions {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub temperature: Option<f32>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub top_k: Option<u32>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub top_p: Option<f32>,
}

#[derive(Clone, Debug)]
pub struct GenerateRequest<'a> {
	pub model: &'a str,
	pub prompt: &'a str,
	pub system: Option<&'a str>,
	pub options: SamplingOptions,
	/// JSON Schema the response must conform to.
	pub format: Option<&'a Value>,
}

pub async fn generate(
	cfg: &beacon_config::GenerationProviderConfig,
	req: &GenerateRequest<'_>,
) -> Result<String> {
	let json: Value = send(cfg, req, false).await?.json().await?;

	parse_generate_response(&json)
}

/// Opens a token stream. Dropping the stream closes the underlying connection.
pub async fn generate_stream(
	cfg: &beacon_config::GenerationProviderConfig,
	req: &GenerateRequest<'_>,
) -> Result<TokenStream> {
	let response = send(cfg, req, true).await?;
	let bytes = response.bytes_stream().map(|chunk| chunk.map(|bytes| bytes.to_vec())).boxed();

	Ok(decode_ndjson(bytes))
}

async fn send(
	cfg: &beacon_config::GenerationProviderConfig,
	req: &GenerateRequest<'_>,
	stream: bool,
) -> Result<reqwest::Response> {
	let client = Client::builder().timeout(Duration::from_millis(cfg.timeout_ms)).build()?;
	let url = format!("{}{}", cfg.api_base, cfg.path);
	let body = build_body(cfg, req, stream);
	let res = client
		.post(url)
		.headers(crate::auth_headers(&cfg.api_key, &cfg.default_headers)?)
		.json(&body)
		.send()
		.await?;

	Ok(res.error_for_status()?)
}

fn build_body(
	cfg: &beacon_config::GenerationProviderConfig,
	req: &GenerateRequest<'_>,
	stream: bool,
) -> Value {
	let mut options =
		serde_json::to_value(req.options).unwrap_or_else(|_| Value::Object(Default::default()));

	if let (Some(num_ctx), Some(map)) = (cfg.num_ctx, options.as_object_mut()) {
		map.insert("num_ctx".to_string(), Value::from(num_ctx));
	}

	let mut body = serde_json::json!({
		"model": req.model,
		"prompt": req.prompt,
		"stream": stream,
		"options": options,
	});

	if let Some(map) = body.as_object_mut() {
		if let Some(system) = req.system.filter(|system| !system.is_empty()) {
			map.insert("system".to_string(), Value::from(system));
		}
		if let Some(format) = req.format {
			map.insert("format".to_string(), format.clone());
		}
	}

	body
}

fn parse_generate_response(json: &Value) -> Result<String> {
	if let Some(err) = json.get("error").and_then(|v| v.as_str()) {
		return Err(Error::InvalidResponse { message: format!("Generation failed: {err}.") });
	}

	json.get("response").and_then(|v| v.as_str()).map(str::to_string).ok_or_else(|| {
		Error::InvalidResponse {
			message: "Generation response is missing response text.".to_string(),
		}
	})
}

struct StreamLine {
	text: String,
	done: bool,
}

fn parse_stream_line(line: &[u8]) -> Result<Option<StreamLine>> {
	let line = std::str::from_utf8(line).map_err(|err| Error::InvalidResponse {
		message: format!("Generation stream line is not valid UTF-8: {err}."),
	})?;
	let line = line.trim();

	if line.is_empty() {
		return Ok(None);
	}

	let json: Value = serde_json::from_str(line)?;

	if let Some(err) = json.get("error").and_then(|v| v.as_str()) {
		return Err(Error::InvalidResponse { message: format!("Generation failed: {err}.") });
	}

	let text = json.get("response").and_then(|v| v.as_str()).unwrap_or_default().to_string();
	let done = json.get("done").and_then(|v| v.as_bool()).unwrap_or(false);

	Ok(Some(StreamLine { text, done }))
}

struct NdjsonState<S> {
	bytes: S,
	buffer: Vec<u8>,
	eof: bool,
	done: bool,
}
impl<S> NdjsonState<S> {
	fn next_line(&mut self) -> Option<Vec<u8>> {
		let end = self.buffer.iter().position(|byte| *byte == b'\n')?;
		let line = self.buffer.drain(..=end).collect::<Vec<_>>();

		Some(line)
	}
}

/// Splits a byte stream into NDJSON lines and yields each non-empty `response` fragment in
/// arrival order. The stream ends after `done: true`, at EOF, or after the first error.
pub fn decode_ndjson<S, E>(bytes: S) -> TokenStream
where
	S: Stream<Item = Result<Vec<u8>, E>> + Send + Unpin + 'static,
	E: Into<Error>,
{
	let state = NdjsonState { bytes, buffer: Vec::new(), eof: false, done: false };

	stream::unfold(state, |mut state| async move {
		loop {
			if state.done {
				return None;
			}

			if let Some(line) = state.next_line() {
				match parse_stream_line(&line) {
					Ok(None) => continue,
					Ok(Some(parsed)) => {
						state.done = parsed.done;

						if parsed.text.is_empty() {
							continue;
						}

						return Some((Ok(parsed.text), state));
					},
					Err(err) => {
						state.done = true;

						return Some((Err(err), state));
					},
				}
			}
			if state.eof {
				return None;
			}

			match state.bytes.next().await {
				Some(Ok(chunk)) => state.buffer.extend_from_slice(&chunk),
				Some(Err(err)) => {
					state.done = true;

					return Some((Err(err.into()), state));
				},
				None => {
					state.eof = true;

					// Flush a final line that has no trailing newline.
					if !state.buffer.is_empty() {
						state.buffer.push(b'\n');
					}
				},
			}
		}
	})
	.boxed()
}
