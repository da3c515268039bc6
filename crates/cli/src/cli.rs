use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "beet")]
#[command(about = "Beet companion wallet client - link accounts and call the wallet API")]
#[command(version)]
pub struct Cli {
	/// Increase verbosity (-v info, -vv debug)
	#[arg(short, long, global = true, action = clap::ArgAction::Count)]
	pub verbose: u8,

	/// Application name presented to the companion
	#[arg(long, global = true, default_value = "beet-cli")]
	pub app: String,

	/// Origin presented to the companion (defaults to the app name)
	#[arg(long, global = true)]
	pub origin: Option<String>,

	/// Identity store file
	#[arg(long, global = true, value_name = "FILE")]
	pub store: Option<PathBuf>,

	/// JSON options file (timeouts, endpoints)
	#[arg(long, global = true, value_name = "FILE")]
	pub config: Option<PathBuf>,

	/// Never retry on the local plain-text endpoint
	#[arg(long, global = true)]
	pub no_fallback: bool,

	/// Primary companion endpoint
	#[arg(long, global = true, value_name = "URL")]
	pub primary: Option<String>,

	/// Fallback companion endpoint
	#[arg(long, global = true, value_name = "URL")]
	pub fallback: Option<String>,

	#[command(subcommand)]
	pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
	/// Print the running companion's version
	Ping,

	/// Report whether a companion answers within the probe timeout
	Installed,

	/// List identities stored for the app
	#[command(alias = "ls")]
	Identities,

	/// Connect and link (or resume) identities, then print them
	Connect {
		/// Chain to link (repeatable); omitted means any chain
		#[arg(short, long = "chain")]
		chains: Vec<String>,
		/// Ask the user to choose an account even if one is stored
		#[arg(long)]
		force: bool,
	},

	/// Call a wallet API method on a linked identity
	Call {
		/// Method name, e.g. getAccount
		method: String,
		/// JSON parameters
		#[arg(short, long)]
		params: Option<String>,
		/// Chain of the identity to use
		#[arg(short, long)]
		chain: Option<String>,
	},

	/// Remove a stored identity
	Forget {
		#[arg(value_name = "IDENTITYHASH")]
		identity_hash: String,
	},
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn global_flags_work_after_subcommand() {
		let cli = Cli::try_parse_from(["beet", "call", "getAccount", "--chain", "BTS", "-vv", "--no-fallback"]).unwrap();
		assert_eq!(cli.verbose, 2);
		assert!(cli.no_fallback);
		assert_eq!(cli.app, "beet-cli");
		match cli.command {
			Commands::Call { method, params, chain } => {
				assert_eq!(method, "getAccount");
				assert_eq!(params, None);
				assert_eq!(chain.as_deref(), Some("BTS"));
			}
			other => panic!("unexpected command {other:?}"),
		}
	}

	#[test]
	fn connect_collects_repeated_chains() {
		let cli = Cli::try_parse_from(["beet", "--app", "dex", "connect", "-c", "BTS", "-c", "STEEM", "--force"]).unwrap();
		assert_eq!(cli.app, "dex");
		match cli.command {
			Commands::Connect { chains, force } => {
				assert_eq!(chains, ["BTS", "STEEM"]);
				assert!(force);
			}
			other => panic!("unexpected command {other:?}"),
		}
	}

	#[test]
	fn forget_requires_identity() {
		assert!(Cli::try_parse_from(["beet", "forget"]).is_err());
	}
}
