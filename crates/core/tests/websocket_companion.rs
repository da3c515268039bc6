mod common;

use std::net::TcpListener as StdListener;
use std::sync::Arc;
use std::time::Duration;

use beet::{AppIdentity, Beet, BeetConnection, BeetOptions, ChainSelector, IdentityStore, MemoryIdentityStore};
use common::Companion;
use serde_json::json;

fn options_for(primary: String, fallback: Option<String>) -> BeetOptions {
	BeetOptions::default()
		.with_endpoints(primary, fallback)
		.with_init_timeout(Duration::from_secs(2))
		.with_link_timeout(Duration::from_secs(2))
}

/// A local address nothing listens on.
fn dead_endpoint() -> String {
	let listener = StdListener::bind("127.0.0.1:0").unwrap();
	let addr = listener.local_addr().unwrap();
	drop(listener);
	format!("ws://{addr}")
}

#[tokio::test]
async fn links_and_calls_over_websocket() {
	let _ = tracing_subscriber::fmt().with_test_writer().try_init();
	let companion = Companion::new();
	let addr = companion.serve_websocket().await;
	let store = Arc::new(MemoryIdentityStore::new());
	let session = BeetConnection::new(
		AppIdentity::new("dex"),
		store.clone(),
		options_for(format!("ws://{addr}"), None),
	);

	session.connect(None).await.unwrap();
	session.link(ChainSelector::named("BTS")).await.unwrap();
	let account = session.get_account().await.unwrap();
	assert_eq!(account["name"], "alice");
	let echoed = session.call("voteFor", json!({"witness": "init0"})).await.unwrap();
	assert_eq!(echoed["params"]["witness"], "init0");

	assert!(companion.api_calls().iter().all(|call| call.chain_ok));
	assert_eq!(store.records().len(), 1);
	session.disconnect().await;
	assert!(!session.is_connected());
}

#[tokio::test]
async fn session_reaches_companion_through_fallback() {
	let companion = Companion::new();
	let addr = companion.serve_websocket().await;
	let session = BeetConnection::new(
		AppIdentity::new("dex"),
		Arc::new(MemoryIdentityStore::new()),
		options_for(dead_endpoint(), Some(format!("ws://{addr}"))),
	);

	let reply = session.connect(None).await.unwrap();
	assert!(reply.authenticate);
	assert!(session.is_connected());
}

#[tokio::test]
async fn probe_over_websocket() {
	let companion = Companion::new();
	let addr = companion.serve_websocket().await;
	let beet = Beet::new(
		Arc::new(MemoryIdentityStore::new()),
		options_for(format!("ws://{addr}"), None),
	);
	assert_eq!(beet.is_installed().await.as_deref(), Some(common::VERSION));

	let nobody = Beet::new(Arc::new(MemoryIdentityStore::new()), options_for(dead_endpoint(), None));
	assert_eq!(nobody.is_installed().await, None);
}

#[tokio::test]
async fn revoked_identity_is_forgotten_over_websocket() {
	let companion = Companion::new();
	companion.configure(|state| state.revoke_on = Some("signMessage".into()));
	let addr = companion.serve_websocket().await;
	let store = Arc::new(MemoryIdentityStore::new());
	let mut beet = Beet::new(store.clone(), options_for(format!("ws://{addr}"), None));

	let sessions = beet.quick_connect("dex", &[ChainSelector::Any], false).await.unwrap();
	let session = sessions.get("ANY").unwrap();
	let identity = session.identity_hash().unwrap();

	assert!(session.sign_message("hi").await.unwrap_err().is_revoked());
	assert!(store.find(&identity).unwrap().is_none());
	assert!(!session.state().linked);
}
