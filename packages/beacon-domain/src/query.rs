use std::{
	collections::hash_map::DefaultHasher,
	fmt::{Display, Formatter},
	hash::{Hash, Hasher},
};

use serde::{Deserialize, Serialize};

/// A user question. Never modified once a request starts.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Query {
	pub content: String,
	pub user_id: String,
}
impl Query {
	pub fn new(content: impl Into<String>, user_id: impl Into<String>) -> Self {
		Self { content: content.into(), user_id: user_id.into() }
	}

	pub fn request_id(&self) -> RequestId {
		RequestId::derive(self)
	}
}

/// Trace identifier of one request: `{user_id}-{hash(content)}`.
///
/// The hash is non-cryptographic, so two different questions from the same user may collide.
/// The id is only used to correlate log records.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct RequestId(String);
impl RequestId {
	pub fn derive(query: &Query) -> Self {
		Self(format!("{}-{:016x}", query.user_id, hash_content(&query.content)))
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}
impl Display for RequestId {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		f.write_str(&self.0)
	}
}

fn hash_content(content: &str) -> u64 {
	let mut hasher = DefaultHasher::new();

	content.hash(&mut hasher);

	hasher.finish()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn request_id_is_stable_for_same_query() {
		let query = Query::new("What is the capital of France?", "42");

		assert_eq!(query.request_id(), query.request_id());
		assert!(query.request_id().as_str().starts_with("42-"));
	}

	#[test]
	fn request_id_differs_by_user() {
		let a = Query::new("same question", "alice");
		let b = Query::new("same question", "bob");

		assert_ne!(a.request_id(), b.request_id());
	}
}
