//! Alternate phrasings of the user question through structured-output generation.

use serde_json::{Map, Value};

use beacon_domain::prompt;

use crate::{Error, GenerateRequest, GenerationProvider, Result, SamplingOptions};

const PHRASING_KEY_PREFIX: &str = "question_id_";

/// JSON Schema for an object with exactly `count` required string properties,
/// `question_id_1` through `question_id_{count}`.
pub fn rephrase_schema(count: u32) -> Value {
	let mut properties = Map::new();
	let mut required = Vec::with_capacity(count as usize);

	for idx in 1..=count {
		let key = format!("{PHRASING_KEY_PREFIX}{idx}");

		properties.insert(key.clone(), serde_json::json!({ "type": "string" }));
		required.push(Value::String(key));
	}

	serde_json::json!({
		"type": "object",
		"properties": properties,
		"required": required,
		"additionalProperties": false,
	})
}

/// Asks `model` for exactly `count` phrasings of `question`.
pub async fn expand(
	generation: &dyn GenerationProvider,
	question: &str,
	count: u32,
	model: &str,
) -> Result<Vec<String>> {
	let schema = rephrase_schema(count);
	let prompt = prompt::rephrase_prompt(question, count);
	let req = GenerateRequest {
		model,
		prompt: &prompt,
		system: None,
		options: SamplingOptions::default(),
		format: Some(&schema),
	};
	let raw = generation.generate(&req).await?;
	let phrasings = parse_rephrasings(&raw, count)?;

	tracing::debug!(count, model, "Question expanded.");

	Ok(phrasings)
}

/// Accepts either the keyed object described by [`rephrase_schema`] or a bare array of strings.
/// Anything with a different count or shape is rejected, never truncated or padded.
pub fn parse_rephrasings(raw: &str, count: u32) -> Result<Vec<String>> {
	let value: Value = serde_json::from_str(raw.trim()).map_err(|err| Error::ContractViolation {
		message: format!("Expansion output is not valid JSON: {err}."),
	})?;
	let phrasings = match value {
		Value::Object(object) => from_object(object, count)?,
		Value::Array(items) => from_array(items)?,
		_ => {
			return Err(Error::ContractViolation {
				message: "Expansion output must be a JSON object or array.".to_string(),
			});
		},
	};

	if phrasings.len() != count as usize {
		return Err(Error::ContractViolation {
			message: format!("Expected {count} phrasings, got {}.", phrasings.len()),
		});
	}
	if phrasings.iter().any(|phrasing| phrasing.trim().is_empty()) {
		return Err(Error::ContractViolation {
			message: "Expansion output contains an empty phrasing.".to_string(),
		});
	}

	Ok(phrasings)
}

fn from_object(mut object: Map<String, Value>, count: u32) -> Result<Vec<String>> {
	if object.len() != count as usize {
		return Err(Error::ContractViolation {
			message: format!("Expected {count} phrasings, got {}.", object.len()),
		});
	}

	(1..=count)
		.map(|idx| {
			let key = format!("{PHRASING_KEY_PREFIX}{idx}");

			match object.remove(&key) {
				Some(Value::String(text)) => Ok(text),
				Some(_) => Err(Error::ContractViolation {
					message: format!("Expansion field {key} must be a string."),
				}),
				None => Err(Error::ContractViolation {
					message: format!("Expansion output is missing {key}."),
				}),
			}
		})
		.collect()
}

fn from_array(items: Vec<Value>) -> Result<Vec<String>> {
	items
		.into_iter()
		.map(|item| match item {
			Value::String(text) => Ok(text),
			_ => Err(Error::ContractViolation {
				message: "Expansion array items must be strings.".to_string(),
			}),
		})
		.collect()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn schema_requires_every_key() {
		let schema = rephrase_schema(3);
		let required = schema["required"].as_array().expect("Expected a required array.");

		assert_eq!(required.len(), 3);
		assert_eq!(required[2], "question_id_3");
		assert_eq!(schema["properties"]["question_id_1"]["type"], "string");
	}

	#[test]
	fn keyed_object_is_read_in_index_order() {
		let raw = r#"{"question_id_2":"b","question_id_1":"a","question_id_3":"c"}"#;

		assert_eq!(parse_rephrasings(raw, 3).expect("Failed to parse."), vec!["a", "b", "c"]);
	}

	#[test]
	fn array_of_strings_is_accepted() {
		let raw = r#"["a", "b", "c"]"#;

		assert_eq!(parse_rephrasings(raw, 3).expect("Failed to parse."), vec!["a", "b", "c"]);
	}

	#[test]
	fn wrong_count_is_a_contract_violation() {
		for raw in [
			r#"["a", "b"]"#,
			r#"["a", "b", "c", "d"]"#,
			r#"{"question_id_1":"a","question_id_2":"b"}"#,
			r#"{"question_id_1":"a","question_id_2":"b","question_id_3":"c","question_id_4":"d"}"#,
		] {
			let err = parse_rephrasings(raw, 3).expect_err("Expected a count mismatch.");

			assert!(matches!(err, Error::ContractViolation { .. }), "{raw}: {err:?}");
		}
	}

	#[test]
	fn wrong_shape_is_a_contract_violation() {
		for raw in [
			"not json",
			r#""a string""#,
			r#"[1, 2, 3]"#,
			r#"{"question_id_1":"a","question_id_2":"b","other":"c"}"#,
			r#"["a", " ", "c"]"#,
		] {
			let err = parse_rephrasings(raw, 3).expect_err("Expected a shape error.");

			assert!(matches!(err, Error::ContractViolation { .. }), "{raw}: {err:?}");
		}
	}
}
