pub mod passage;
pub mod prompt;
pub mod query;
pub mod scenario;

mod error;

pub use error::{Error, Result};
pub use passage::{CandidatePassage, Document, DocumentPage};
pub use query::{Query, RequestId};
pub use scenario::{
	ModelOptions, MultiQueryOptions, RerankerOptions, Scenario, VectorSearchOptions,
};
