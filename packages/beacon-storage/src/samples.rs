//! Key-value store for evaluation samples.
//!
//! Keys follow `{prefix}:{index}`. Listing a prefix returns records in index order; keys without
//! a numeric suffix sort after numbered ones, by key.

use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use sqlx::PgExecutor;

use crate::{Error, Result, models::SampleRow};

pub fn sample_key(prefix: &str, index: usize) -> String {
	format!("{prefix}:{index}")
}

pub fn split_key(key: &str) -> Result<(&str, Option<i64>)> {
	let Some((prefix, suffix)) = key.rsplit_once(':') else {
		return Err(Error::InvalidArgument(format!("Sample key {key:?} has no prefix.")));
	};

	if prefix.is_empty() {
		return Err(Error::InvalidArgument(format!("Sample key {key:?} has an empty prefix.")));
	}

	Ok((prefix, suffix.parse::<i64>().ok()))
}

pub async fn set<'e, E, T>(executor: E, key: &str, value: &T) -> Result<()>
where
	E: PgExecutor<'e>,
	T: Serialize,
{
	let (prefix, position) = split_key(key)?;
	let value = serde_json::to_value(value)?;

	sqlx::query(
		"\
INSERT INTO samples (key, prefix, position, value, updated_at)
VALUES ($1, $2, $3, $4, now())
ON CONFLICT (key) DO UPDATE
SET value = EXCLUDED.value, updated_at = EXCLUDED.updated_at",
	)
	.bind(key)
	.bind(prefix)
	.bind(position)
	.bind(value)
	.execute(executor)
	.await?;

	Ok(())
}

pub async fn get<'e, E, T>(executor: E, key: &str) -> Result<Option<T>>
where
	E: PgExecutor<'e>,
	T: DeserializeOwned,
{
	let value: Option<Value> = sqlx::query_scalar("SELECT value FROM samples WHERE key = $1")
		.bind(key)
		.fetch_optional(executor)
		.await?;

	value.map(|value| serde_json::from_value(value).map_err(Error::from)).transpose()
}

pub async fn list_rows<'e, E>(executor: E, prefix: &str) -> Result<Vec<SampleRow>>
where
	E: PgExecutor<'e>,
{
	let rows = sqlx::query_as::<_, SampleRow>(
		"\
SELECT key, prefix, position, value, updated_at
FROM samples
WHERE prefix = $1
ORDER BY position ASC NULLS LAST, key ASC",
	)
	.bind(prefix)
	.fetch_all(executor)
	.await?;

	Ok(rows)
}

pub async fn list<'e, E, T>(executor: E, prefix: &str) -> Result<Vec<T>>
where
	E: PgExecutor<'e>,
	T: DeserializeOwned,
{
	list_rows(executor, prefix)
		.await?
		.into_iter()
		.map(|row| serde_json::from_value(row.value).map_err(Error::from))
		.collect()
}

pub async fn delete_prefix<'e, E>(executor: E, prefix: &str) -> Result<u64>
where
	E: PgExecutor<'e>,
{
	let result =
		sqlx::query("DELETE FROM samples WHERE prefix = $1").bind(prefix).execute(executor).await?;

	Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn splits_numbered_keys() {
		let (prefix, position) = split_key("source-1:12").expect("Failed to split key.");

		assert_eq!(prefix, "source-1");
		assert_eq!(position, Some(12));
	}

	#[test]
	fn keeps_non_numeric_suffix_unordered() {
		let (prefix, position) = split_key("a:b:latest").expect("Failed to split key.");

		assert_eq!(prefix, "a:b");
		assert_eq!(position, None);
	}

	#[test]
	fn rejects_key_without_prefix() {
		assert!(split_key("lonely").is_err());
		assert!(split_key(":3").is_err());
	}
}
