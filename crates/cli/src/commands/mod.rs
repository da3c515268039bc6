mod connect;
mod identities;
mod probe;

use crate::cli::Commands;
use crate::context::CommandContext;
use crate::error::Result;

pub async fn dispatch(command: Commands, ctx: &CommandContext) -> Result<()> {
	match command {
		Commands::Ping => probe::ping(ctx).await?,
		Commands::Installed => probe::installed(ctx).await?,
		Commands::Identities => identities::list(ctx)?,
		Commands::Forget { identity_hash } => identities::forget(ctx, &identity_hash)?,
		Commands::Connect { chains, force } => connect::connect(ctx, &chains, force).await?,
		Commands::Call { method, params, chain } => connect::call(ctx, &method, params.as_deref(), chain.as_deref()).await?,
	}

	Ok(())
}
