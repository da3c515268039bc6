//! Client options.
//!
//! All durations are stored in milliseconds so an options file reads the same
//! way the companion's own settings do.

use std::path::Path;
use std::time::Duration;

use beet_runtime::transport::{DEFAULT_FALLBACK_ENDPOINT, DEFAULT_PRIMARY_ENDPOINT};
use beet_runtime::{Endpoints, FallbackPolicy};
use serde::{Deserialize, Serialize};

use crate::error::{BeetError, Result};

pub const DEFAULT_INIT_TIMEOUT_MS: u64 = 3_000;
pub const DEFAULT_LINK_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_PROBE_TIMEOUT_MS: u64 = 500;
pub const DEFAULT_FALLBACK_GRACE_MS: u64 = 2_000;

/// Timeouts, endpoints, and fallback behaviour for a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BeetOptions {
	/// Bound on transport open plus the `authenticate` round trip.
	pub init_timeout_ms: u64,
	/// Bound on the `link` round trip, which waits for the user.
	pub link_timeout_ms: u64,
	/// Bound on the version probe behind `is_installed`.
	pub probe_timeout_ms: u64,
	/// Per-request bound for everything else; `None` waits indefinitely.
	pub request_timeout_ms: Option<u64>,
	pub allow_fallback: bool,
	pub fallback_grace_ms: u64,
	pub primary_endpoint: String,
	pub fallback_endpoint: Option<String>,
}

impl Default for BeetOptions {
	fn default() -> Self {
		Self {
			init_timeout_ms: DEFAULT_INIT_TIMEOUT_MS,
			link_timeout_ms: DEFAULT_LINK_TIMEOUT_MS,
			probe_timeout_ms: DEFAULT_PROBE_TIMEOUT_MS,
			request_timeout_ms: None,
			allow_fallback: true,
			fallback_grace_ms: DEFAULT_FALLBACK_GRACE_MS,
			primary_endpoint: DEFAULT_PRIMARY_ENDPOINT.to_string(),
			fallback_endpoint: Some(DEFAULT_FALLBACK_ENDPOINT.to_string()),
		}
	}
}

impl BeetOptions {
	/// Reads options from a JSON file; missing fields keep their defaults.
	pub fn load(path: &Path) -> Result<Self> {
		let content = std::fs::read_to_string(path)
			.map_err(|e| BeetError::usage(format!("cannot read options file {}: {e}", path.display())))?;
		Ok(serde_json::from_str(&content)?)
	}

	pub fn with_endpoints(mut self, primary: impl Into<String>, fallback: Option<String>) -> Self {
		self.primary_endpoint = primary.into();
		self.fallback_endpoint = fallback;
		self
	}

	pub fn with_fallback(mut self, enabled: bool) -> Self {
		self.allow_fallback = enabled;
		self
	}

	pub fn with_init_timeout(mut self, timeout: Duration) -> Self {
		self.init_timeout_ms = millis(timeout);
		self
	}

	pub fn with_link_timeout(mut self, timeout: Duration) -> Self {
		self.link_timeout_ms = millis(timeout);
		self
	}

	pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
		self.probe_timeout_ms = millis(timeout);
		self
	}

	pub fn with_request_timeout(mut self, timeout: Option<Duration>) -> Self {
		self.request_timeout_ms = timeout.map(millis);
		self
	}

	pub fn init_timeout(&self) -> Duration {
		Duration::from_millis(self.init_timeout_ms)
	}

	pub fn link_timeout(&self) -> Duration {
		Duration::from_millis(self.link_timeout_ms)
	}

	pub fn probe_timeout(&self) -> Duration {
		Duration::from_millis(self.probe_timeout_ms)
	}

	pub fn request_timeout(&self) -> Option<Duration> {
		self.request_timeout_ms.map(Duration::from_millis)
	}

	pub fn endpoints(&self) -> Endpoints {
		Endpoints::new(self.primary_endpoint.clone(), self.fallback_endpoint.clone())
	}

	pub fn fallback_policy(&self) -> FallbackPolicy {
		FallbackPolicy {
			enabled: self.allow_fallback,
			grace: Duration::from_millis(self.fallback_grace_ms),
		}
	}
}

fn millis(duration: Duration) -> u64 {
	u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn defaults_match_companion_expectations() {
		let options = BeetOptions::default();
		assert_eq!(options.init_timeout(), Duration::from_secs(3));
		assert_eq!(options.link_timeout(), Duration::from_secs(30));
		assert_eq!(options.probe_timeout(), Duration::from_millis(500));
		assert_eq!(options.request_timeout(), None);
		assert_eq!(options.endpoints(), Endpoints::default());
		assert_eq!(options.fallback_policy(), FallbackPolicy::default());
	}

	#[test]
	fn partial_json_keeps_defaults() {
		let options: BeetOptions =
			serde_json::from_str(r#"{"linkTimeoutMs": 1000, "allowFallback": false, "fallbackEndpoint": null}"#).unwrap();
		assert_eq!(options.link_timeout_ms, 1000);
		assert!(!options.fallback_policy().enabled);
		assert_eq!(options.endpoints().fallback, None);
		assert_eq!(options.init_timeout_ms, DEFAULT_INIT_TIMEOUT_MS);
	}

	#[test]
	fn load_reads_file() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("beet.json");
		std::fs::write(&path, r#"{"primaryEndpoint": "ws://127.0.0.1:9000", "requestTimeoutMs": 250}"#).unwrap();

		let options = BeetOptions::load(&path).unwrap();
		assert_eq!(options.primary_endpoint, "ws://127.0.0.1:9000");
		assert_eq!(options.request_timeout(), Some(Duration::from_millis(250)));
		assert!(BeetOptions::load(&dir.path().join("missing.json")).unwrap_err().is_usage());
	}
}
