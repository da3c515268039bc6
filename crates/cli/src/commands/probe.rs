use colored::Colorize;

use crate::context::CommandContext;
use crate::error::Result;

pub async fn ping(ctx: &CommandContext) -> Result<()> {
	let beet = ctx.beet(ctx.store()?);
	let version = beet.ping().await?;
	println!("{} {}", "companion".green().bold(), version);
	Ok(())
}

/// Never fails; an absent companion is a normal answer here.
pub async fn installed(ctx: &CommandContext) -> Result<()> {
	let beet = ctx.beet(ctx.store()?);
	match beet.is_installed().await {
		Some(version) => println!("{} (version {version})", "installed".green().bold()),
		None => println!("{}", "not installed".red().bold()),
	}
	Ok(())
}
