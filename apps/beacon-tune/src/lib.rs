use std::{
	fs,
	path::{Path, PathBuf},
	sync::Arc,
};

use clap::Parser;
use color_eyre::eyre;
use tracing_subscriber::EnvFilter;

use beacon_domain::Scenario;
use beacon_service::{Pipeline, Providers};
use beacon_storage::{db::Db, qdrant::QdrantStore};
use beacon_tuner::TuneJob;

#[derive(Debug, Parser)]
#[command(
	version = beacon_cli::VERSION,
	rename_all = "kebab",
	styles = beacon_cli::styles(),
)]
pub struct Args {
	#[arg(long, short = 'c', value_name = "FILE")]
	pub config: PathBuf,
	/// Sources to tune over. Repeat for several.
	#[arg(long = "source-id", value_name = "ID", required = true, num_args = 1..)]
	pub source_ids: Vec<String>,
	/// Scores this scenario (JSON) once instead of running a study.
	#[arg(long, value_name = "FILE")]
	pub scenario: Option<PathBuf>,
	/// Replaces the stored samples with freshly synthesized ones before scoring.
	#[arg(long)]
	pub generate_dataset: bool,
	/// Overrides `tuner.trials`.
	#[arg(long, value_name = "N")]
	pub trials: Option<u32>,
	/// Overrides `tuner.seed`.
	#[arg(long, value_name = "SEED")]
	pub seed: Option<u64>,
}

pub async fn run(args: Args) -> color_eyre::Result<()> {
	let mut config = beacon_config::load(&args.config)?;
	let filter =
		EnvFilter::try_new(&config.service.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

	tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

	if let Some(trials) = args.trials {
		if trials == 0 {
			return Err(eyre::eyre!("--trials must be greater than zero."));
		}

		config.tuner.trials = trials;
	}
	if args.seed.is_some() {
		config.tuner.seed = args.seed;
	}

	let scenario = match &args.scenario {
		Some(path) => Some(load_scenario(path)?),
		None => None,
	};
	let job = TuneJob {
		source_ids: args.source_ids.clone(),
		scenario,
		generate_dataset: args.generate_dataset,
	};
	let db = Db::connect(&config.storage.postgres).await?;

	db.ensure_schema().await?;

	let qdrant = QdrantStore::new(&config.storage.qdrant)?;
	let config = Arc::new(config);
	let pipeline = Arc::new(Pipeline::new(Providers::from_config(config.clone(), qdrant)));

	tracing::info!(
		sources = ?job.source_ids,
		evaluate_only = job.scenario.is_some(),
		generate_dataset = job.generate_dataset,
		"Tuning job started."
	);

	let outcome = beacon_tuner::run_job(pipeline, Arc::new(db), &config, &job).await?;
	let json = serde_json::to_string_pretty(&outcome)?;

	println!("{json}");

	Ok(())
}

fn load_scenario(path: &Path) -> color_eyre::Result<Scenario> {
	let raw = fs::read_to_string(path)
		.map_err(|err| eyre::eyre!("Failed to read scenario {}: {err}.", path.display()))?;
	let scenario = serde_json::from_str(&raw)
		.map_err(|err| eyre::eyre!("Failed to parse scenario {}: {err}.", path.display()))?;

	Ok(scenario)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn source_ids_repeat() {
		let args = Args::try_parse_from([
			"beacon-tune",
			"-c",
			"beacon.toml",
			"--source-id",
			"a",
			"--source-id",
			"b",
			"--generate-dataset",
		])
		.expect("Failed to parse args.");

		assert_eq!(args.source_ids, vec!["a".to_string(), "b".to_string()]);
		assert!(args.generate_dataset);
		assert!(args.scenario.is_none());
	}

	#[test]
	fn source_id_is_required() {
		assert!(Args::try_parse_from(["beacon-tune", "-c", "beacon.toml"]).is_err());
	}
}
