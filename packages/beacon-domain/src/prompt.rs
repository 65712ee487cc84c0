use std::fmt::Write;

const ANSWER_PREAMBLE: &str = "\
You are an assistant answering questions with retrieval-augmented generation.
1. Find the relevant information in the provided context passages.
2. Combine it into a clear, accurate answer grounded in that context.
If the context does not contain the answer, say so instead of guessing.";

/// Builds the grounding prompt from the user question and the ranked passages.
///
/// An empty passage list still yields a valid prompt with an empty context block.
pub fn answer_prompt(question: &str, passages: &[String]) -> String {
	let context_len = passages.iter().map(String::len).sum::<usize>();
	let mut out = String::with_capacity(ANSWER_PREAMBLE.len() + question.len() + context_len + 64);

	out.push_str(ANSWER_PREAMBLE);
	out.push_str("\n\nQuestion:\n");
	out.push_str(question.trim());
	out.push_str("\n\nContext:\n");

	for (idx, passage) in passages.iter().enumerate() {
		let _ = writeln!(out, "[{}] {}", idx + 1, passage.trim());
	}

	out
}

pub fn rephrase_prompt(question: &str, count: u32) -> String {
	format!(
		"\
Rephrase the question: {question}
Produce {count} different versions that approach the topic from different angles.
Requirements:
- Every version keeps the original meaning but uses its own wording, style (analytical, hypothetical, \
practical) or emphasis (causes, consequences, examples).
- Avoid trivial paraphrases; vary the intended audience (expert, beginner, student).
Example for \"Why is the sky blue?\":
\"Which physical phenomena make the sky look blue?\"
\"How would you explain to a child why the sky is blue?\"
\"Has the color of the sky changed over Earth's history, and why?\""
	)
}

pub fn sample_prompt(document: &str, count: u32) -> String {
	format!(
		"\
Read the passage below and write {count} question and answer pairs about it.
Each question must be answerable from the passage alone, and each answer must be a short, \
self-contained statement taken from the passage.

Passage:
{document}"
	)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn answer_prompt_numbers_passages_in_rank_order() {
		let prompt = answer_prompt(
			"What is the capital of France?",
			&["Paris is the capital of France.".to_string(), "France is in Europe.".to_string()],
		);
		let first = prompt.find("[1] Paris").expect("Missing first passage.");
		let second = prompt.find("[2] France").expect("Missing second passage.");

		assert!(first < second);
		assert!(prompt.contains("Question:\nWhat is the capital of France?"));
	}

	#[test]
	fn answer_prompt_allows_empty_context() {
		let prompt = answer_prompt("Anything?", &[]);

		assert!(prompt.ends_with("Context:\n"));
	}
}
