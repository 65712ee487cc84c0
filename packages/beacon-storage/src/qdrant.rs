pub const CONTENT_VECTOR_NAME: &str = "content";
pub const QUESTION_VECTOR_NAME: &str = "question";
pub const SOURCE_ID_FIELD: &str = "source_id";
pub const CHUNK_ID_FIELD: &str = "chunk_id";
pub const CONTENT_FIELD: &str = "content";

use std::collections::HashMap;

use qdrant_client::qdrant::{
	Condition, CountPointsBuilder, Filter, PointId, Query, QueryPointsBuilder, ScoredPoint, Value,
	point_id::PointIdOptions, value::Kind,
};

use beacon_domain::{CandidatePassage, Document, DocumentPage};

use crate::{Error, Result};

pub struct QdrantStore {
	pub client: qdrant_client::Qdrant,
	pub collection: String,
	pub vector_dim: u32,
}
impl QdrantStore {
	pub fn new(cfg: &beacon_config::Qdrant) -> Result<Self> {
		let client = qdrant_client::Qdrant::from_url(&cfg.url).build()?;

		Ok(Self { client, collection: cfg.collection.clone(), vector_dim: cfg.vector_dim })
	}

	/// Nearest passages for one embedded question, restricted to `source_ids`.
	///
	/// `by_question` searches the vectors of questions generated for each passage instead of
	/// the passage content itself.
	pub async fn search_passages(
		&self,
		vector: Vec<f32>,
		source_ids: &[String],
		limit: u32,
		threshold: f32,
		by_question: bool,
	) -> Result<Vec<CandidatePassage>> {
		if vector.len() != self.vector_dim as usize {
			return Err(Error::InvalidArgument(format!(
				"Query vector has {} dimensions, expected {}.",
				vector.len(),
				self.vector_dim
			)));
		}

		let vector_name = if by_question { QUESTION_VECTOR_NAME } else { CONTENT_VECTOR_NAME };
		let search = QueryPointsBuilder::new(self.collection.clone())
			.query(Query::new_nearest(vector))
			.using(vector_name)
			.filter(source_filter(source_ids))
			.score_threshold(threshold)
			.limit(limit as u64)
			.with_payload(true);
		let response = self.client.query(search).await?;

		Ok(response.result.iter().filter_map(to_candidate).collect())
	}

	/// One page of passages for the given sources. Pages start at 1.
	pub async fn list_documents(
		&self,
		source_ids: &[String],
		page: u32,
		size: u32,
	) -> Result<DocumentPage> {
		if page == 0 || size == 0 {
			return Err(Error::InvalidArgument(
				"Document page and size must be greater than zero.".to_string(),
			));
		}

		let offset = (page as u64 - 1) * size as u64;
		let listing = QueryPointsBuilder::new(self.collection.clone())
			.filter(source_filter(source_ids))
			.offset(offset)
			.limit(size as u64)
			.with_payload(true);
		let response = self.client.query(listing).await?;
		let count = self
			.client
			.count(
				CountPointsBuilder::new(self.collection.clone())
					.filter(source_filter(source_ids))
					.exact(true),
			)
			.await?;
		let documents = response.result.iter().filter_map(to_document).collect();
		let total = count.result.map(|result| result.count).unwrap_or(0);

		Ok(DocumentPage { documents, total })
	}
}

fn source_filter(source_ids: &[String]) -> Filter {
	Filter::must([Condition::matches(SOURCE_ID_FIELD, source_ids.to_vec())])
}

fn to_candidate(point: &ScoredPoint) -> Option<CandidatePassage> {
	let id = passage_id(point)?;
	let content = payload_string(&point.payload, CONTENT_FIELD)?;

	Some(CandidatePassage { id, content, similarity: point.score })
}

fn to_document(point: &ScoredPoint) -> Option<Document> {
	let id = passage_id(point)?;
	let content = payload_string(&point.payload, CONTENT_FIELD)?;
	let source_id = payload_string(&point.payload, SOURCE_ID_FIELD)?;

	Some(Document { id, source_id, content })
}

/// Several points (one per generated question) may share a passage, so the `chunk_id` payload
/// is the identity when present.
fn passage_id(point: &ScoredPoint) -> Option<String> {
	payload_string(&point.payload, CHUNK_ID_FIELD)
		.or_else(|| point.id.as_ref().and_then(point_id_string))
}

fn point_id_string(point_id: &PointId) -> Option<String> {
	match &point_id.point_id_options {
		Some(PointIdOptions::Uuid(id)) => Some(id.clone()),
		Some(PointIdOptions::Num(id)) => Some(id.to_string()),
		None => None,
	}
}

fn payload_string(payload: &HashMap<String, Value>, key: &str) -> Option<String> {
	let value = payload.get(key)?;

	match &value.kind {
		Some(Kind::StringValue(text)) => Some(text.to_string()),
		Some(Kind::IntegerValue(number)) => Some(number.to_string()),
		_ => None,
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn string_value(text: &str) -> Value {
		Value { kind: Some(Kind::StringValue(text.to_string())) }
	}

	fn point(id: Option<PointIdOptions>, payload: &[(&str, &str)], score: f32) -> ScoredPoint {
		ScoredPoint {
			id: id.map(|options| PointId { point_id_options: Some(options) }),
			payload: payload
				.iter()
				.map(|(key, value)| (key.to_string(), string_value(value)))
				.collect(),
			score,
			..Default::default()
		}
	}

	#[test]
	fn chunk_id_payload_wins_over_point_id() {
		let point = point(
			Some(PointIdOptions::Num(7)),
			&[(CHUNK_ID_FIELD, "chunk-1"), (CONTENT_FIELD, "Paris is in France.")],
			0.8,
		);
		let candidate = to_candidate(&point).expect("Expected a candidate.");

		assert_eq!(candidate.id, "chunk-1");
		assert_eq!(candidate.similarity, 0.8);
	}

	#[test]
	fn falls_back_to_point_id() {
		let point = point(Some(PointIdOptions::Num(7)), &[(CONTENT_FIELD, "text")], 0.5);

		assert_eq!(to_candidate(&point).map(|candidate| candidate.id), Some("7".to_string()));
	}

	#[test]
	fn skips_points_without_content() {
		let point = point(Some(PointIdOptions::Num(7)), &[(CHUNK_ID_FIELD, "chunk-1")], 0.5);

		assert!(to_candidate(&point).is_none());
	}
}
