pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Failure kinds surfaced to callers. Cancellation is not an error and has no variant.
#[derive(Debug, thiserror::Error)]
pub enum Error {
	/// A provider returned structured output of the wrong shape or count.
	#[error("Contract violation: {message}")]
	ContractViolation { message: String },
	/// A provider call failed or timed out.
	#[error("Upstream unavailable: {message}")]
	UpstreamUnavailable { message: String },
	/// The scenario failed validation.
	#[error("Invalid scenario: {message}")]
	ConfigInvalid { message: String },
}
impl Error {
	pub fn code(&self) -> &'static str {
		match self {
			Self::ContractViolation { .. } => "CONTRACT_VIOLATION",
			Self::UpstreamUnavailable { .. } => "UPSTREAM_UNAVAILABLE",
			Self::ConfigInvalid { .. } => "INVALID_SCENARIO",
		}
	}
}

impl From<beacon_providers::Error> for Error {
	fn from(err: beacon_providers::Error) -> Self {
		let message = if err.is_timeout() {
			format!("Provider call timed out: {err}")
		} else {
			err.to_string()
		};

		Self::UpstreamUnavailable { message }
	}
}

impl From<beacon_storage::Error> for Error {
	fn from(err: beacon_storage::Error) -> Self {
		Self::UpstreamUnavailable { message: err.to_string() }
	}
}

impl From<beacon_domain::Error> for Error {
	fn from(err: beacon_domain::Error) -> Self {
		Self::ConfigInvalid { message: err.to_string() }
	}
}
