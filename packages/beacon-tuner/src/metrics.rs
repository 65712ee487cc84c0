//! Retrieval and answer quality scores. Every score is in `[0, 1]`, higher is better.

const PRECISION_EPSILON: f64 = 1e-10;

/// Average precision of `retrieved` against `reference` contexts.
///
/// A retrieved context counts as relevant when its normalized Levenshtein similarity to any
/// reference context reaches `threshold`. Earlier relevant contexts weigh more.
pub fn context_precision(retrieved: &[String], reference: &[String], threshold: f64) -> f64 {
	if retrieved.is_empty() {
		return 0.0;
	}

	let mut relevant = 0_usize;
	let mut weighted = 0.0;

	for (rank, context) in retrieved.iter().enumerate() {
		let hit = reference
			.iter()
			.any(|expected| string_similarity(context, expected) >= threshold);

		if hit {
			relevant += 1;
			weighted += relevant as f64 / (rank + 1) as f64;
		}
	}

	weighted / (relevant as f64 + PRECISION_EPSILON)
}

/// Cosine similarity clamped to `[0, 1]`. Mismatched or zero vectors score 0.
pub fn semantic_similarity(left: &[f32], right: &[f32]) -> f64 {
	if left.len() != right.len() || left.is_empty() {
		return 0.0;
	}

	let (mut dot, mut left_norm, mut right_norm) = (0.0_f64, 0.0_f64, 0.0_f64);

	for (l, r) in left.iter().zip(right) {
		let (l, r) = (f64::from(*l), f64::from(*r));

		dot += l * r;
		left_norm += l * l;
		right_norm += r * r;
	}

	if left_norm == 0.0 || right_norm == 0.0 {
		return 0.0;
	}

	(dot / (left_norm.sqrt() * right_norm.sqrt())).clamp(0.0, 1.0)
}

/// `1 - distance / max_len` over characters. Two empty strings are identical.
pub fn string_similarity(a: &str, b: &str) -> f64 {
	let longest = a.chars().count().max(b.chars().count());

	if longest == 0 {
		return 1.0;
	}

	1.0 - levenshtein(a, b) as f64 / longest as f64
}

fn levenshtein(a: &str, b: &str) -> usize {
	let a = a.chars().collect::<Vec<_>>();
	let b = b.chars().collect::<Vec<_>>();

	if a.is_empty() {
		return b.len();
	}
	if b.is_empty() {
		return a.len();
	}

	let mut prev = (0..=b.len()).collect::<Vec<_>>();
	let mut curr = vec![0; b.len() + 1];

	for (i, ca) in a.iter().enumerate() {
		curr[0] = i + 1;

		for (j, cb) in b.iter().enumerate() {
			let cost = usize::from(ca != cb);

			curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
		}

		std::mem::swap(&mut prev, &mut curr);
	}

	prev[b.len()]
}

#[cfg(test)]
mod tests {
	use super::*;

	fn texts(items: &[&str]) -> Vec<String> {
		items.iter().map(|item| item.to_string()).collect()
	}

	#[test]
	fn levenshtein_counts_edits() {
		assert_eq!(levenshtein("kitten", "sitting"), 3);
		assert_eq!(levenshtein("", "abc"), 3);
		assert_eq!(levenshtein("café", "cafe"), 1);
	}

	#[test]
	fn string_similarity_is_normalized() {
		assert_eq!(string_similarity("", ""), 1.0);
		assert_eq!(string_similarity("abc", "abc"), 1.0);
		assert_eq!(string_similarity("abc", "xyz"), 0.0);
		assert!((string_similarity("kitten", "sitting") - (1.0 - 3.0 / 7.0)).abs() < 1e-12);
	}

	#[test]
	fn relevant_contexts_ranked_first_score_higher() {
		let reference = texts(&["Paris is the capital of France."]);
		let first = context_precision(
			&texts(&["Paris is the capital of France.", "Bananas are yellow."]),
			&reference,
			0.5,
		);
		let last = context_precision(
			&texts(&["Bananas are yellow.", "Paris is the capital of France."]),
			&reference,
			0.5,
		);

		assert!((first - 1.0).abs() < 1e-6, "{first}");
		assert!((last - 0.5).abs() < 1e-6, "{last}");
	}

	#[test]
	fn no_relevant_context_scores_zero() {
		let reference = texts(&["Paris is the capital of France."]);

		assert_eq!(context_precision(&[], &reference, 0.5), 0.0);
		assert_eq!(context_precision(&texts(&["zzz"]), &reference, 0.5), 0.0);
	}

	#[test]
	fn cosine_is_clamped() {
		assert!((semantic_similarity(&[1.0, 0.0], &[2.0, 0.0]) - 1.0).abs() < 1e-12);
		assert_eq!(semantic_similarity(&[1.0, 0.0], &[-1.0, 0.0]), 0.0);
		assert_eq!(semantic_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
		assert_eq!(semantic_similarity(&[1.0], &[1.0, 0.0]), 0.0);
	}
}
