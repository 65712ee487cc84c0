use serde_json::Value;
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

use crate::{
	Result,
	models::{StudyRow, TrialRow},
};

pub struct NewTrial<'a> {
	pub study_id: Uuid,
	pub params: &'a Value,
	pub scores: &'a Value,
	pub status: &'a str,
	pub error: Option<&'a str>,
}

/// Study ids are derived from the name, so reruns under the same name resume the same study.
pub fn study_id_for(name: &str) -> Uuid {
	Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes())
}

pub async fn get_or_create_study<'e, E>(
	executor: E,
	name: &str,
	objectives: &Value,
) -> Result<StudyRow>
where
	E: PgExecutor<'e>,
{
	let row = sqlx::query_as::<_, StudyRow>(
		"\
WITH inserted AS (
\tINSERT INTO studies (study_id, name, objectives)
\tVALUES ($1, $2, $3)
\tON CONFLICT (name) DO NOTHING
\tRETURNING study_id, name, objectives, created_at
)
SELECT study_id, name, objectives, created_at FROM inserted
UNION ALL
SELECT study_id, name, objectives, created_at FROM studies WHERE name = $2
LIMIT 1",
	)
	.bind(study_id_for(name))
	.bind(name)
	.bind(objectives)
	.fetch_one(executor)
	.await?;

	Ok(row)
}

pub async fn load_trials<'e, E>(executor: E, study_id: Uuid) -> Result<Vec<TrialRow>>
where
	E: PgExecutor<'e>,
{
	let rows = sqlx::query_as::<_, TrialRow>(
		"\
SELECT study_id, number, params, scores, status, error, created_at
FROM trials
WHERE study_id = $1
ORDER BY number ASC",
	)
	.bind(study_id)
	.fetch_all(executor)
	.await?;

	Ok(rows)
}

/// Appends a trial under the next free number of its study and returns that number.
///
/// Concurrent appends to one study are serialized by a transaction-scoped advisory lock keyed on
/// the study id.
pub async fn append_trial(pool: &PgPool, trial: &NewTrial<'_>) -> Result<i32> {
	let mut tx = pool.begin().await?;

	sqlx::query("SELECT pg_advisory_xact_lock($1)")
		.bind(study_lock_key(trial.study_id))
		.execute(&mut *tx)
		.await?;

	let number: i32 = sqlx::query_scalar(
		"\
INSERT INTO trials (study_id, number, params, scores, status, error, created_at)
SELECT $1, COALESCE(MAX(number) + 1, 0), $2, $3, $4, $5, now()
FROM trials
WHERE study_id = $1
RETURNING number",
	)
	.bind(trial.study_id)
	.bind(trial.params)
	.bind(trial.scores)
	.bind(trial.status)
	.bind(trial.error)
	.fetch_one(&mut *tx)
	.await?;

	tx.commit().await?;

	Ok(number)
}

fn study_lock_key(study_id: Uuid) -> i64 {
	study_id.as_u64_pair().0 as i64
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn study_id_is_deterministic() {
		assert_eq!(study_id_for("rag:abc"), study_id_for("rag:abc"));
		assert_ne!(study_id_for("rag:abc"), study_id_for("rag:abd"));
	}

	#[test]
	fn lock_key_follows_the_study() {
		let study = study_id_for("rag:abc");

		assert_eq!(study_lock_key(study), study_lock_key(study_id_for("rag:abc")));
		assert_ne!(study_lock_key(study), study_lock_key(study_id_for("rag:abd")));
	}
}
