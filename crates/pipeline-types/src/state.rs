//! State store entry types.

use serde::{Deserialize, Serialize};

/// A single key/value pair written to the state store.
///
/// The sidecar save endpoint takes a JSON array of these. Writing an entry
/// whose key already exists replaces the stored value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateEntry {
	pub key: String,
	pub value: serde_json::Value,
}

impl StateEntry {
	pub fn new(key: impl Into<String>, value: serde_json::Value) -> Self {
		Self {
			key: key.into(),
			value,
		}
	}
}
