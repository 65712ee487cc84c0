//! Fan-out retrieval over every question variant and the identity-keyed merge of the results.

use std::{cmp::Ordering, collections::HashMap};

use futures_util::future;

use beacon_domain::CandidatePassage;

use crate::{Result, RetrievalProvider, SearchRequest};

#[derive(Clone, Copy, Debug)]
pub struct RetrieveOptions<'a> {
	pub source_ids: &'a [String],
	pub limit: u32,
	pub threshold: f32,
	pub by_question: bool,
}

/// Searches every question concurrently and merges the results.
///
/// The first failed search aborts the whole aggregation.
pub async fn retrieve_all(
	retrieval: &dyn RetrievalProvider,
	questions: &[String],
	opts: RetrieveOptions<'_>,
) -> Result<Vec<CandidatePassage>> {
	let searches = questions.iter().map(|question| {
		retrieval.search(SearchRequest {
			text: question,
			source_ids: opts.source_ids,
			limit: opts.limit,
			threshold: opts.threshold,
			by_question: opts.by_question,
		})
	});
	let results = future::try_join_all(searches).await?;
	let merged = merge(results);

	tracing::debug!(questions = questions.len(), passages = merged.len(), "Retrieval merged.");

	Ok(merged)
}

/// Folds per-question results in question order, keyed by passage id.
///
/// A passage seen again takes the later content and similarity but keeps its first position,
/// which makes it the tie-break for equal similarities. The output is ordered by similarity,
/// descending.
pub fn merge<I>(results: I) -> Vec<CandidatePassage>
where
	I: IntoIterator<Item = Vec<CandidatePassage>>,
{
	let mut positions: HashMap<String, usize> = HashMap::new();
	let mut merged: Vec<CandidatePassage> = Vec::new();

	for passage in results.into_iter().flatten() {
		match positions.get(&passage.id) {
			Some(&idx) => merged[idx] = passage,
			None => {
				positions.insert(passage.id.clone(), merged.len());
				merged.push(passage);
			},
		}
	}

	merged.sort_by(|a, b| cmp_f32_desc(a.similarity, b.similarity));

	merged
}

/// Descending order with NaN last. Equal values compare equal so stable sorts keep input order.
pub fn cmp_f32_desc(a: f32, b: f32) -> Ordering {
	match (a.is_nan(), b.is_nan()) {
		(true, true) => Ordering::Equal,
		(true, false) => Ordering::Greater,
		(false, true) => Ordering::Less,
		(false, false) => b.partial_cmp(&a).unwrap_or(Ordering::Equal),
	}
}
