pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Invalid BEACON_PG_DSN: {message}.")]
	InvalidDsn { message: String },
	#[error("Failed to create test database {name}.")]
	Create { name: String, source: sqlx::Error },
	#[error("Failed to drop test database {name}.")]
	Drop { name: String, source: sqlx::Error },
	#[error(transparent)]
	Sqlx(#[from] sqlx::Error),
}
