use serde::{Deserialize, Serialize};

/// One passage returned by the retrieval backend for one question variant.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct CandidatePassage {
	pub id: String,
	pub content: String,
	pub similarity: f32,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Document {
	pub id: String,
	pub source_id: String,
	pub content: String,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct DocumentPage {
	pub documents: Vec<Document>,
	pub total: u64,
}
