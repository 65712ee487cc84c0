//! Synthetic evaluation samples generated from indexed documents.

use serde::Deserialize;
use serde_json::Value;

use beacon_domain::{Document, prompt};
use beacon_service::{GenerateRequest, GenerationProvider, RetrievalProvider, SamplingOptions};

use crate::{Error, Result, dataset::Sample};

#[derive(Deserialize)]
struct GeneratedItems {
	items: Vec<GeneratedItem>,
}

#[derive(Deserialize)]
struct GeneratedItem {
	question: String,
	answer: String,
}

/// JSON Schema for exactly `count` question and answer pairs.
pub fn sample_schema(count: u32) -> Value {
	serde_json::json!({
		"type": "object",
		"properties": {
			"items": {
				"type": "array",
				"minItems": count,
				"maxItems": count,
				"items": {
					"type": "object",
					"properties": {
						"question": { "type": "string" },
						"answer": { "type": "string" },
					},
					"required": ["question", "answer"],
				},
			},
		},
		"required": ["items"],
	})
}

/// Pages through every document of `source_id` and asks `model` for
/// `cfg.samples_per_document` samples per document. Documents whose generation fails are
/// skipped.
pub async fn synthesize(
	retrieval: &dyn RetrievalProvider,
	generation: &dyn GenerationProvider,
	source_id: &str,
	cfg: &beacon_config::TunerDataset,
	model: &str,
) -> Result<Vec<Sample>> {
	let source_ids = [source_id.to_string()];
	let mut dataset = Vec::new();
	let mut seen = 0_u64;
	let mut page = 1;

	loop {
		let listing = retrieval.list_documents(&source_ids, page, cfg.page_size).await?;

		if listing.documents.is_empty() {
			break;
		}

		seen += listing.documents.len() as u64;

		for document in &listing.documents {
			match samples_for(generation, document, cfg.samples_per_document, model).await {
				Ok(samples) => dataset.extend(samples),
				Err(err) => tracing::warn!(
					source_id,
					document_id = %document.id,
					error = %err,
					"Skipping document during sample generation."
				),
			}
		}

		if seen >= listing.total {
			break;
		}

		page += 1;
	}

	tracing::info!(source_id, documents = seen, samples = dataset.len(), "Samples generated.");

	Ok(dataset)
}

async fn samples_for(
	generation: &dyn GenerationProvider,
	document: &Document,
	count: u32,
	model: &str,
) -> Result<Vec<Sample>> {
	let schema = sample_schema(count);
	let prompt = prompt::sample_prompt(&document.content, count);
	let req = GenerateRequest {
		model,
		prompt: &prompt,
		system: None,
		options: SamplingOptions::default(),
		format: Some(&schema),
	};
	let raw = generation.generate(&req).await?;

	parse_samples(&raw, count, &document.content)
}

fn parse_samples(raw: &str, count: u32, context: &str) -> Result<Vec<Sample>> {
	let generated: GeneratedItems = serde_json::from_str(raw.trim())?;

	if generated.items.len() != count as usize {
		return Err(Error::Dataset {
			message: format!("Expected {count} samples, got {}.", generated.items.len()),
		});
	}

	Ok(generated
		.items
		.into_iter()
		.map(|item| Sample {
			question: item.question,
			answer: item.answer,
			context: vec![context.to_string()],
		})
		.collect())
}
