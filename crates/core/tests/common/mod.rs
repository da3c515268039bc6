//! Scripted companion used by the integration tests.
//!
//! The same companion logic answers frames from in-memory fake transports and
//! from a real WebSocket listener, so every scenario can run either way.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use beet::linking::{encode_public_key, parse_public_key, shared_secret_hex};
use beet_protocol::ApiCall;
use beet_runtime::{FakeTransportController, IdChain, SessionCipher};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use rand::rngs::OsRng;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use x25519_dalek::{PublicKey, StaticSecret};

pub const VERSION: &str = "0.9.3";
pub const ACCOUNT: &str = r#"{"name":"alice","id":"1.2.100","chain":"BTS"}"#;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkMode {
	/// Derive a new identity from the client's key.
	Fresh,
	/// Claim the given identity already exists.
	Existing(String),
	/// Never answer (user ignores the prompt).
	Silent,
}

#[derive(Debug, Clone)]
pub struct Known {
	pub secret: String,
	pub chain: String,
	/// Commitment the next api request must reveal.
	pub commitment: String,
}

#[derive(Debug, Clone)]
pub struct ApiSeen {
	pub id: u64,
	pub identity: String,
	pub method: String,
	pub params: Value,
	pub chain_ok: bool,
}

pub struct CompanionState {
	secret: StaticSecret,
	public_hex: String,
	issued: usize,
	pub link_mode: LinkMode,
	/// Return the public key with the link reply instead of relying on the
	/// one from `authenticate`.
	pub key_in_link_reply: bool,
	/// Answer `authenticate` as linked for known identities.
	pub resume_known: bool,
	pub revoke_on: Option<String>,
	pub reject_on: Option<String>,
	pub known: HashMap<String, Known>,
	pub api: Vec<ApiSeen>,
	pub frames: Vec<Value>,
}

#[derive(Clone)]
pub struct Companion {
	state: Arc<Mutex<CompanionState>>,
}

impl Default for Companion {
	fn default() -> Self {
		Self::new()
	}
}

impl Companion {
	pub fn new() -> Self {
		let secret = StaticSecret::random_from_rng(OsRng);
		let public_hex = encode_public_key(&PublicKey::from(&secret));
		Self {
			state: Arc::new(Mutex::new(CompanionState {
				secret,
				public_hex,
				issued: 0,
				link_mode: LinkMode::Fresh,
				key_in_link_reply: false,
				resume_known: true,
				revoke_on: None,
				reject_on: None,
				known: HashMap::new(),
				api: Vec::new(),
				frames: Vec::new(),
			})),
		}
	}

	pub fn configure(&self, f: impl FnOnce(&mut CompanionState)) {
		f(&mut self.state.lock());
	}

	pub fn api_calls(&self) -> Vec<ApiSeen> {
		self.state.lock().api.clone()
	}

	pub fn frames(&self) -> Vec<Value> {
		self.state.lock().frames.clone()
	}

	pub fn knows(&self, identity_hash: &str) -> bool {
		self.state.lock().known.contains_key(identity_hash)
	}

	/// Handles one client frame within a channel; `bound` tracks which
	/// identity the channel authenticated or linked.
	pub fn handle(&self, frame: Value, bound: &mut Option<String>) -> Option<Value> {
		let mut state = self.state.lock();
		state.frames.push(frame.clone());
		let id = frame["id"].as_u64();
		let payload = &frame["payload"];

		match frame["type"].as_str()? {
			"version" => Some(json!({"type": "version", "result": VERSION})),
			"authenticate" => {
				let id = id?;
				let presented = payload["identityhash"].as_str().map(str::to_string);
				match presented.filter(|hash| state.resume_known && state.known.contains_key(hash)) {
					Some(hash) => {
						*bound = Some(hash);
						Some(json!({"id": id, "payload": {"authenticate": true, "link": true}}))
					}
					None => Some(json!({
						"id": id,
						"payload": {"authenticate": true, "link": false, "pub_key": state.public_hex}
					})),
				}
			}
			"link" => {
				let id = id?;
				match state.link_mode.clone() {
					LinkMode::Silent => None,
					LinkMode::Existing(hash) => {
						*bound = Some(hash.clone());
						Some(json!({
							"id": id,
							"payload": {"existing": true, "identityhash": hash, "authenticate": true, "link": true}
						}))
					}
					LinkMode::Fresh => {
						let client_key = parse_public_key(payload["pubkey"].as_str()?).ok()?;
						let shared = shared_secret_hex(&state.secret.diffie_hellman(&client_key)).ok()?;
						state.issued += 1;
						let hash = format!("identity-{}", state.issued);
						let chain = match payload["chain"].as_str() {
							Some("ANY") | None => "BTS".to_string(),
							Some(chain) => chain.to_string(),
						};
						state.known.insert(hash.clone(), Known {
							secret: shared,
							chain: chain.clone(),
							commitment: payload["next_hash"].as_str().unwrap_or_default().to_string(),
						});
						*bound = Some(hash.clone());
						let mut reply = json!({
							"existing": false,
							"identityhash": hash,
							"chain": chain,
							"authenticate": true,
							"link": true
						});
						if state.key_in_link_reply {
							reply["pub_key"] = json!(state.public_hex);
						}
						Some(json!({"id": id, "payload": reply}))
					}
				}
			}
			"api" => {
				let id = id?;
				let identity = bound.clone()?;
				let known = state.known.get(&identity)?.clone();
				let cipher = SessionCipher::from_secret_hex(&known.secret).ok()?;
				let body: ApiCall = serde_json::from_str(&cipher.decrypt(payload.as_str()?, id).ok()?).ok()?;
				let method = body.method.clone();
				let chain_ok = IdChain::verify(id, &known.commitment);
				if let (Some(next), Some(entry)) = (body.next_hash.as_deref(), state.known.get_mut(&identity)) {
					entry.commitment = next.to_string();
				}
				state.api.push(ApiSeen {
					id,
					identity: identity.clone(),
					method: method.clone(),
					params: body.params.clone(),
					chain_ok,
				});

				if state.revoke_on.as_deref() == Some(method.as_str()) {
					state.known.remove(&identity);
					return Some(json!({"id": id, "error": true, "payload": {"code": 2, "message": "identity revoked"}}));
				}
				if state.reject_on.as_deref() == Some(method.as_str()) {
					let sealed = cipher.encrypt(r#"{"code":1,"message":"user denied"}"#, id).ok()?;
					return Some(json!({"id": id, "error": true, "encrypted": true, "payload": sealed}));
				}
				let result = match method.as_str() {
					"getAccount" => Value::String(ACCOUNT.to_string()),
					_ => json!({"method": method, "params": body.params, "chain": known.chain}),
				};
				let sealed = cipher.encrypt(&result.to_string(), id).ok()?;
				Some(json!({"id": id, "encrypted": true, "payload": sealed}))
			}
			_ => None,
		}
	}

	/// Serves every fake transport a [`beet_runtime::FakeConnector`] opens.
	pub fn serve_fake(&self, mut controllers: mpsc::UnboundedReceiver<FakeTransportController>) {
		let companion = self.clone();
		tokio::spawn(async move {
			while let Some(controller) = controllers.recv().await {
				let companion = companion.clone();
				tokio::spawn(async move {
					let mut bound = None;
					while let Some(frame) = controller.next_sent().await {
						if let Some(reply) = companion.handle(frame, &mut bound) {
							controller.inject(reply);
						}
					}
				});
			}
		});
	}

	/// Listens on an ephemeral local port and serves WebSocket clients.
	pub async fn serve_websocket(&self) -> SocketAddr {
		let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
		let addr = listener.local_addr().unwrap();
		let companion = self.clone();
		tokio::spawn(async move {
			while let Ok((stream, _)) = listener.accept().await {
				let companion = companion.clone();
				tokio::spawn(async move {
					let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
						return;
					};
					let mut bound = None;
					while let Some(Ok(message)) = ws.next().await {
						let Message::Text(text) = message else {
							continue;
						};
						let Ok(frame) = serde_json::from_str::<Value>(&text) else {
							continue;
						};
						let Some(reply) = companion.handle(frame, &mut bound) else {
							continue;
						};
						if ws.send(Message::Text(reply.to_string())).await.is_err() {
							break;
						}
					}
				});
			}
		});
		addr
	}
}
