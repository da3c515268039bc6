//! Chain selection for link handshakes.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Wire token meaning "let the companion pick any chain".
pub const ANY_CHAIN: &str = "ANY";

/// Which chain an identity is requested for.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum ChainSelector {
	/// No preference; the companion lets the user pick.
	#[default]
	Any,
	/// A specific chain symbol such as `BTS` or `STEEM`.
	Named(String),
}

impl ChainSelector {
	pub fn named(chain: impl Into<String>) -> Self {
		Self::Named(chain.into())
	}

	/// Returns `true` when an identity on `chain` satisfies this selector.
	pub fn matches(&self, chain: &str) -> bool {
		match self {
			Self::Any => true,
			Self::Named(name) => name == chain,
		}
	}

	pub fn as_str(&self) -> &str {
		match self {
			Self::Any => ANY_CHAIN,
			Self::Named(name) => name,
		}
	}
}

impl fmt::Display for ChainSelector {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for ChainSelector {
	type Err = std::convert::Infallible;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let trimmed = s.trim();
		if trimmed.is_empty() || trimmed.eq_ignore_ascii_case(ANY_CHAIN) {
			Ok(Self::Any)
		} else {
			Ok(Self::Named(trimmed.to_string()))
		}
	}
}

impl From<Option<&str>> for ChainSelector {
	fn from(value: Option<&str>) -> Self {
		match value {
			Some(chain) => chain.parse().unwrap_or_default(),
			None => Self::Any,
		}
	}
}

impl Serialize for ChainSelector {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.serialize_str(self.as_str())
	}
}

impl<'de> Deserialize<'de> for ChainSelector {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		let raw = Option::<String>::deserialize(deserializer)?;
		Ok(ChainSelector::from(raw.as_deref()))
	}
}
