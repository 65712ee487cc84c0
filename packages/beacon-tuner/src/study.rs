use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::space::ParameterSet;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrialStatus {
	Completed,
	Failed,
}
impl TrialStatus {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Completed => "completed",
			Self::Failed => "failed",
		}
	}

	pub fn parse(raw: &str) -> Option<Self> {
		match raw {
			"completed" => Some(Self::Completed),
			"failed" => Some(Self::Failed),
			_ => None,
		}
	}
}

/// One evaluated parameter set. `scores` follow the study's objective order.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Trial {
	pub number: u32,
	pub params: ParameterSet,
	pub scores: Vec<f64>,
	pub status: TrialStatus,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
}
impl Trial {
	pub fn completed(number: u32, params: ParameterSet, scores: Vec<f64>) -> Self {
		Self { number, params, scores, status: TrialStatus::Completed, error: None }
	}

	/// A failed trial scores zero on every objective.
	pub fn failed(number: u32, params: ParameterSet, objectives: usize, error: String) -> Self {
		Self {
			number,
			params,
			scores: vec![0.0; objectives],
			status: TrialStatus::Failed,
			error: Some(error),
		}
	}
}

/// Trials of one tuning run, all maximized.
#[derive(Clone, Debug, Serialize)]
pub struct Study {
	pub name: String,
	/// Declared order is also the tie-break priority between Pareto-optimal trials.
	pub objectives: Vec<String>,
	trials: Vec<Trial>,
}
impl Study {
	pub fn new(name: impl Into<String>, objectives: Vec<String>) -> Self {
		Self { name: name.into(), objectives, trials: Vec::new() }
	}

	pub fn trials(&self) -> &[Trial] {
		&self.trials
	}

	pub fn next_number(&self) -> u32 {
		self.trials.iter().map(|trial| trial.number + 1).max().unwrap_or(0)
	}

	pub fn push(&mut self, trial: Trial) {
		self.trials.push(trial);
	}

	/// Completed trials that no other completed trial dominates.
	pub fn pareto_front(&self) -> Vec<&Trial> {
		let completed = self
			.trials
			.iter()
			.filter(|trial| trial.status == TrialStatus::Completed)
			.collect::<Vec<_>>();

		completed
			.iter()
			.filter(|candidate| !completed.iter().any(|other| dominates(other, candidate)))
			.copied()
			.collect()
	}

	/// The Pareto-optimal trial ranked first by objective priority. Earlier trials win exact
	/// ties. With one objective this is simply the highest score.
	pub fn best_trial(&self) -> Option<&Trial> {
		let mut best: Option<&Trial> = None;

		for trial in self.pareto_front() {
			let better = match best {
				Some(current) => cmp_scores(&trial.scores, &current.scores) == Ordering::Greater,
				None => true,
			};

			if better {
				best = Some(trial);
			}
		}

		best
	}
}

fn dominates(a: &Trial, b: &Trial) -> bool {
	let pairs = a.scores.iter().zip(&b.scores);
	let mut strictly = false;

	for (x, y) in pairs {
		if x < y {
			return false;
		}
		if x > y {
			strictly = true;
		}
	}

	strictly
}

fn cmp_scores(a: &[f64], b: &[f64]) -> Ordering {
	for (x, y) in a.iter().zip(b) {
		match x.partial_cmp(y) {
			Some(Ordering::Equal) | None => continue,
			Some(ordering) => return ordering,
		}
	}

	Ordering::Equal
}

#[cfg(test)]
mod tests {
	use super::*;

	fn objectives(count: usize) -> Vec<String> {
		(0..count).map(|idx| format!("objective_{idx}")).collect()
	}

	fn study_with(scores: &[&[f64]]) -> Study {
		let mut study = Study::new("test", objectives(scores[0].len()));

		for scores in scores {
			study.push(Trial::completed(study.next_number(), ParameterSet::new(), scores.to_vec()));
		}

		study
	}

	#[test]
	fn single_objective_picks_the_highest_score() {
		let study = study_with(&[&[0.2], &[0.7], &[0.5], &[0.7]]);

		assert_eq!(study.best_trial().map(|trial| trial.number), Some(1));
	}

	#[test]
	fn failed_trials_are_never_best() {
		let mut study = Study::new("test", objectives(1));

		study.push(Trial::failed(0, ParameterSet::new(), 1, "boom".to_string()));

		assert!(study.best_trial().is_none());
		assert_eq!(study.trials()[0].scores, vec![0.0]);
		assert_eq!(study.next_number(), 1);
	}

	#[test]
	fn pareto_front_drops_dominated_trials() {
		let study = study_with(&[&[0.9, 0.1], &[0.5, 0.5], &[0.4, 0.4], &[0.1, 0.9]]);
		let front = study.pareto_front().iter().map(|trial| trial.number).collect::<Vec<_>>();

		assert_eq!(front, vec![0, 1, 3]);
	}

	#[test]
	fn front_ties_break_by_objective_priority() {
		let study = study_with(&[&[0.5, 0.9], &[0.8, 0.2], &[0.8, 0.1]]);

		assert_eq!(study.best_trial().map(|trial| trial.number), Some(1));
	}
}
