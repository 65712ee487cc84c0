//! Throwaway Postgres databases for the ignored integration tests.
//!
//! Point `BEACON_PG_DSN` at a server the tests may create databases on.

mod error;

pub use error::{Error, Result};

use std::{env, str::FromStr, thread};

use sqlx::{
	ConnectOptions, Connection, Executor,
	postgres::{PgConnectOptions, PgConnection},
};
use tokio::runtime::Builder;
use uuid::Uuid;

const DSN_VAR: &str = "BEACON_PG_DSN";

/// A database named `beacon_test_<uuid>`, dropped by [`TestDatabase::drop_now`] or, failing
/// that, when the value goes out of scope.
pub struct TestDatabase {
	name: String,
	dsn: String,
	maintenance: PgConnectOptions,
	dropped: bool,
}
impl TestDatabase {
	pub async fn create(base_dsn: &str) -> Result<Self> {
		let base = PgConnectOptions::from_str(base_dsn)
			.map_err(|err| Error::InvalidDsn { message: err.to_string() })?;
		let maintenance = base.clone().database("postgres");
		let name = format!("beacon_test_{}", Uuid::new_v4().simple());
		let mut conn = PgConnection::connect_with(&maintenance).await?;

		conn.execute(format!(r#"CREATE DATABASE "{name}""#).as_str())
			.await
			.map_err(|source| Error::Create { name: name.clone(), source })?;
		conn.close().await?;

		let dsn = base.database(&name).to_url_lossy().to_string();

		Ok(Self { name, dsn, maintenance, dropped: false })
	}

	pub fn dsn(&self) -> &str {
		&self.dsn
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	/// Connection settings for `beacon_storage::db::Db::connect`.
	pub fn postgres(&self, pool_max_conns: u32) -> beacon_config::Postgres {
		beacon_config::Postgres { dsn: self.dsn.clone(), pool_max_conns }
	}

	/// Drops the database now. Open pools on it should be closed first.
	pub async fn drop_now(mut self) -> Result<()> {
		self.dropped = true;

		drop_database(&self.name, &self.maintenance).await
	}
}
impl Drop for TestDatabase {
	fn drop(&mut self) {
		if self.dropped {
			return;
		}

		let name = self.name.clone();
		let maintenance = self.maintenance.clone();
		// The test runtime may be shutting down, so the drop gets a runtime of its own.
		let handle = thread::spawn(move || {
			let runtime = match Builder::new_current_thread().enable_all().build() {
				Ok(runtime) => runtime,
				Err(err) => {
					eprintln!("Failed to drop test database {name}: {err}");

					return;
				},
			};

			if let Err(err) = runtime.block_on(drop_database(&name, &maintenance)) {
				eprintln!("Failed to drop test database {name}: {err}");
			}
		});
		let _ = handle.join();
	}
}

pub fn env_dsn() -> Option<String> {
	env::var(DSN_VAR).ok().filter(|dsn| !dsn.trim().is_empty())
}

async fn drop_database(name: &str, maintenance: &PgConnectOptions) -> Result<()> {
	let mut conn = PgConnection::connect_with(maintenance).await?;

	conn.execute(format!(r#"DROP DATABASE IF EXISTS "{name}" WITH (FORCE)"#).as_str())
		.await
		.map_err(|source| Error::Drop { name: name.to_string(), source })?;
	conn.close().await?;

	Ok(())
}
