use beet_cli::cli::Cli;
use beet_cli::context::CommandContext;
use beet_cli::{commands, logging};
use clap::Parser;
use tracing::error;

#[tokio::main]
async fn main() {
	let cli = Cli::parse();
	logging::init_logging(cli.verbose);

	let ctx = match CommandContext::from_cli(&cli) {
		Ok(ctx) => ctx,
		Err(err) => {
			error!(target = "beet", error = %err, "invalid configuration");
			std::process::exit(2);
		}
	};

	if let Err(err) = commands::dispatch(cli.command, &ctx).await {
		error!(target = "beet", error = %err, "command failed");
		std::process::exit(1);
	}
}
