//! The ask/tell seam between the search loop and a search algorithm.

use rand::{Rng, SeedableRng, rngs::StdRng, seq::SliceRandom};

use crate::{
	space::{Domain, Knob, ParamValue, ParameterSet, SearchSpace},
	study::Trial,
};

/// A sequential search algorithm. `propose` is the ask, `record` the tell.
///
/// The loop calls them strictly alternately, so implementations need no internal locking.
pub trait Sampler
where
	Self: Send,
{
	fn propose(&mut self, space: &SearchSpace) -> ParameterSet;

	fn record(&mut self, trial: &Trial);
}

/// Samples every active knob uniformly and ignores feedback.
pub struct RandomSampler {
	rng: StdRng,
}
impl RandomSampler {
	pub fn new(seed: Option<u64>) -> Self {
		let rng = match seed {
			Some(seed) => StdRng::seed_from_u64(seed),
			None => StdRng::from_entropy(),
		};

		Self { rng }
	}

	fn sample(&mut self, knob: &Knob) -> Option<ParamValue> {
		match &knob.domain {
			Domain::Int { min, max } => Some(ParamValue::Int(self.rng.gen_range(*min..=*max))),
			Domain::Float { min, max, step } =>
				Some(ParamValue::Float(self.sample_float(*min, *max, *step))),
			Domain::Choice(choices) => choices.choose(&mut self.rng).cloned(),
		}
	}

	fn sample_float(&mut self, min: f64, max: f64, step: Option<f64>) -> f64 {
		if max <= min {
			return min;
		}

		match step {
			Some(step) if step > 0.0 => {
				let steps = ((max - min) / step + 1e-9).floor() as u64;
				let idx = self.rng.gen_range(0..=steps);

				round_to_step(min + idx as f64 * step, step)
			},
			_ => self.rng.gen_range(min..=max),
		}
	}
}
impl Sampler for RandomSampler {
	fn propose(&mut self, space: &SearchSpace) -> ParameterSet {
		let mut params = ParameterSet::new();

		for knob in space.knobs() {
			if !knob.is_active(&params) {
				continue;
			}
			if let Some(value) = self.sample(knob) {
				params.insert(knob.name.clone(), value);
			}
		}

		params
	}

	fn record(&mut self, _: &Trial) {}
}

/// Removes the binary noise `min + idx * step` accumulates, e.g. `0.2 + 3 * 0.01`.
fn round_to_step(value: f64, step: f64) -> f64 {
	let decimals = (-step.log10()).ceil().max(0.0) as i32 + 2;
	let scale = 10_f64.powi(decimals);

	(value * scale).round() / scale
}

#[cfg(test)]
mod tests {
	use super::*;

	fn default_space() -> SearchSpace {
		SearchSpace::from_config(&beacon_config::SearchSpace::default())
	}

	#[test]
	fn proposals_stay_inside_the_space() {
		let space = default_space();
		let mut sampler = RandomSampler::new(Some(7));

		for _ in 0..200 {
			let params = sampler.propose(&space);

			assert!(space.contains(&params), "{params:?}");
		}
	}

	#[test]
	fn same_seed_same_proposals() {
		let space = default_space();
		let mut first = RandomSampler::new(Some(42));
		let mut second = RandomSampler::new(Some(42));

		for _ in 0..10 {
			assert_eq!(first.propose(&space), second.propose(&space));
		}
	}

	#[test]
	fn stepped_floats_land_on_the_grid() {
		let mut sampler = RandomSampler::new(Some(1));

		for _ in 0..100 {
			let value = sampler.sample_float(0.2, 0.9, Some(0.01));
			let steps = (value - 0.2) / 0.01;

			assert!((0.2..=0.9).contains(&value), "{value}");
			assert!((steps - steps.round()).abs() < 1e-6, "{value}");
		}
	}
}
