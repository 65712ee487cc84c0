pub mod embedding;
pub mod generation;
pub mod rerank;

mod error;

pub use error::{Error, Result};

use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderName};
use serde_json::{Map, Value};

/// Builds request headers. An empty API key sends no `Authorization` header, which local
/// backends such as Ollama expect.
pub fn auth_headers(api_key: &str, default_headers: &Map<String, Value>) -> Result<HeaderMap> {
	let mut headers = HeaderMap::new();

	if !api_key.is_empty() {
		headers.insert(AUTHORIZATION, format!("Bearer {api_key}").parse()?);
	}

	for (key, value) in default_headers {
		let Some(raw) = value.as_str() else {
			return Err(Error::InvalidConfig {
				message: "Default header values must be strings.".to_string(),
			});
		};

		headers.insert(HeaderName::from_bytes(key.as_bytes())?, raw.parse()?);
	}

	Ok(headers)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn empty_api_key_skips_authorization() {
		let headers = auth_headers("", &Map::new()).expect("Failed to build headers.");

		assert!(headers.get(AUTHORIZATION).is_none());
	}

	#[test]
	fn rejects_non_string_default_header() {
		let mut default_headers = Map::new();

		default_headers.insert("x-retries".to_string(), Value::from(3));

		let err = auth_headers("key", &default_headers).expect_err("Expected header error.");

		assert!(err.to_string().contains("must be strings"), "Unexpected error: {err}");
	}
}
