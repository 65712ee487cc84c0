pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error(transparent)]
	Service(#[from] beacon_service::Error),
	#[error(transparent)]
	Storage(#[from] beacon_storage::Error),
	#[error(transparent)]
	SerdeJson(#[from] serde_json::Error),
	#[error("Invalid parameters: {message}")]
	InvalidParams { message: String },
	#[error("Invalid dataset: {message}")]
	Dataset { message: String },
}

impl From<beacon_domain::Error> for Error {
	fn from(err: beacon_domain::Error) -> Self {
		Self::InvalidParams { message: err.to_string() }
	}
}
