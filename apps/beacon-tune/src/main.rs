use clap::Parser;

use beacon_tune::Args;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;

	let args = Args::parse();

	beacon_tune::run(args).await
}
