use std::path::Path;

use beet::{AppIdentity, IdentityRecord, IdentityStore};
use beet_cli::cli::{Cli, Commands};
use beet_cli::commands::dispatch;
use beet_cli::context::CommandContext;
use beet_cli::error::CliError;
use beet_cli::store::FileIdentityStore;
use clap::Parser;

fn context_for(store: &Path, app: &str) -> (CommandContext, Commands) {
	let cli = Cli::try_parse_from(["beet", "--app", app, "--store", store.to_str().unwrap(), "identities"]).unwrap();
	(CommandContext::from_cli(&cli).unwrap(), cli.command)
}

fn seed(store: &FileIdentityStore, app: &str, identity_hash: &str) {
	store
		.insert(IdentityRecord {
			app_hash: AppIdentity::new(app).app_hash().to_string(),
			identity_hash: identity_hash.to_string(),
			chain: "BTS".to_string(),
			app_name: app.to_string(),
			secret: "aa".repeat(32),
			next_id: 42,
		})
		.unwrap();
}

#[tokio::test]
async fn forget_removes_only_the_apps_identity() {
	let dir = tempfile::tempdir().unwrap();
	let path = dir.path().join("identities.json");
	{
		let store = FileIdentityStore::open(path.clone()).unwrap();
		seed(&store, "dex", "mine");
		seed(&store, "explorer", "theirs");
	}

	let (ctx, list) = context_for(&path, "dex");
	dispatch(list, &ctx).await.unwrap();

	let err = dispatch(
		Commands::Forget {
			identity_hash: "theirs".into(),
		},
		&ctx,
	)
	.await
	.unwrap_err();
	assert!(matches!(err, CliError::UnknownIdentity(ref hash) if hash == "theirs"));

	dispatch(
		Commands::Forget {
			identity_hash: "mine".into(),
		},
		&ctx,
	)
	.await
	.unwrap();

	let remaining = FileIdentityStore::open(path).unwrap().all();
	assert_eq!(remaining.len(), 1);
	assert_eq!(remaining[0].identity_hash, "theirs");
}

#[tokio::test]
async fn installed_reports_absence_without_failing() {
	let dir = tempfile::tempdir().unwrap();
	let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
	let dead = format!("ws://{}", listener.local_addr().unwrap());
	drop(listener);
	let store = dir.path().join("ids.json");

	let cli = Cli::try_parse_from([
		"beet",
		"--store",
		store.to_str().unwrap(),
		"--primary",
		&dead,
		"--no-fallback",
		"installed",
	])
	.unwrap();
	let ctx = CommandContext::from_cli(&cli).unwrap();
	dispatch(cli.command, &ctx).await.unwrap();
}
