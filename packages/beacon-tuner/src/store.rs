//! Persistence of studies and their trials.

use std::{
	collections::HashMap,
	sync::{Arc, Mutex},
};

use beacon_service::BoxFuture;
use beacon_storage::{
	db::Db,
	models::TrialRow,
	studies::{self, NewTrial},
};

use crate::{
	Error, Result,
	study::{Trial, TrialStatus},
};

pub trait StudyStore
where
	Self: Send + Sync,
{
	/// Opens the study called `name`, creating it when absent. Returns its recorded trials in
	/// number order.
	fn open<'a>(
		&'a self,
		name: &'a str,
		objectives: &'a [String],
	) -> BoxFuture<'a, Result<Vec<Trial>>>;

	/// Appends `trial` under the next free number of the study and returns that number.
	/// `trial.number` is ignored, so concurrent runs over one study never collide.
	fn record<'a>(&'a self, name: &'a str, trial: &'a Trial) -> BoxFuture<'a, Result<u32>>;
}

/// Postgres-backed store. Reruns under the same study name resume its trials.
pub struct PgStudyStore {
	db: Arc<Db>,
}
impl PgStudyStore {
	pub fn new(db: Arc<Db>) -> Self {
		Self { db }
	}
}
impl StudyStore for PgStudyStore {
	fn open<'a>(
		&'a self,
		name: &'a str,
		objectives: &'a [String],
	) -> BoxFuture<'a, Result<Vec<Trial>>> {
		Box::pin(async move {
			let objectives = serde_json::to_value(objectives)?;
			let study = studies::get_or_create_study(&self.db.pool, name, &objectives).await?;
			let rows = studies::load_trials(&self.db.pool, study.study_id).await?;

			rows.into_iter().map(trial_from_row).collect()
		})
	}

	fn record<'a>(&'a self, name: &'a str, trial: &'a Trial) -> BoxFuture<'a, Result<u32>> {
		Box::pin(async move {
			let params = serde_json::to_value(&trial.params)?;
			let scores = serde_json::to_value(&trial.scores)?;
			let number = studies::append_trial(
				&self.db.pool,
				&NewTrial {
					study_id: studies::study_id_for(name),
					params: &params,
					scores: &scores,
					status: trial.status.as_str(),
					error: trial.error.as_deref(),
				},
			)
			.await?;

			stored_number(number)
		})
	}
}

/// Process-local store for runs that should not persist.
#[derive(Default)]
pub struct MemoryStudyStore {
	studies: Mutex<HashMap<String, Vec<Trial>>>,
}
impl MemoryStudyStore {
	pub fn trials(&self, name: &str) -> Vec<Trial> {
		self.studies
			.lock()
			.unwrap_or_else(|err| err.into_inner())
			.get(name)
			.cloned()
			.unwrap_or_default()
	}
}
impl StudyStore for MemoryStudyStore {
	fn open<'a>(&'a self, name: &'a str, _: &'a [String]) -> BoxFuture<'a, Result<Vec<Trial>>> {
		Box::pin(async move {
			let mut studies = self.studies.lock().unwrap_or_else(|err| err.into_inner());

			Ok(studies.entry(name.to_string()).or_default().clone())
		})
	}

	fn record<'a>(&'a self, name: &'a str, trial: &'a Trial) -> BoxFuture<'a, Result<u32>> {
		Box::pin(async move {
			let mut studies = self.studies.lock().unwrap_or_else(|err| err.into_inner());
			let trials = studies.entry(name.to_string()).or_default();
			let number = trials.iter().map(|trial| trial.number + 1).max().unwrap_or(0);

			trials.push(Trial { number, ..trial.clone() });

			Ok(number)
		})
	}
}

fn trial_from_row(row: TrialRow) -> Result<Trial> {
	let status = TrialStatus::parse(&row.status).ok_or_else(|| Error::InvalidParams {
		message: format!("Stored trial {} has unknown status {:?}.", row.number, row.status),
	})?;

	Ok(Trial {
		number: stored_number(row.number)?,
		params: serde_json::from_value(row.params)?,
		scores: serde_json::from_value(row.scores)?,
		status,
		error: row.error,
	})
}

fn stored_number(number: i32) -> Result<u32> {
	u32::try_from(number).map_err(|_| Error::InvalidParams {
		message: format!("Stored trial number {number} is negative."),
	})
}
