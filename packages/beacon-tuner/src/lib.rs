//! Parameter search over pipeline scenarios.
//!
//! A [`Sampler`] proposes parameter sets from a [`SearchSpace`], the [`Tuner`] materializes each
//! one into a scenario and scores it over an evaluation dataset, and the scores flow back into the
//! sampler. Trials are persisted through a [`StudyStore`] so later runs resume the same study.

pub mod dataset;
pub mod evaluate;
pub mod job;
pub mod materialize;
pub mod metrics;
pub mod sampler;
pub mod space;
pub mod store;
pub mod study;
pub mod synth;
pub mod tuner;

mod error;

pub use dataset::Sample;
pub use error::{Error, Result};
pub use evaluate::{Evaluator, Objective};
pub use job::{TuneJob, TuneOutcome, run_job};
pub use materialize::materialize;
pub use sampler::{RandomSampler, Sampler};
pub use space::{ParamValue, ParameterSet, SearchSpace};
pub use store::{MemoryStudyStore, PgStudyStore, StudyStore};
pub use study::{Study, Trial, TrialStatus};
pub use tuner::{Evaluation, TuneReport, Tuner, study_name};
