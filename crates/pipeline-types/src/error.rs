//! Error classification shared across collaborator clients.

use serde::{Deserialize, Serialize};

/// Coarse class of a failure, used to decide how it is surfaced.
///
/// Ingestion maps these to HTTP status codes for the calling client; the
/// order processor maps them to a delivery outcome for the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
	/// Missing or malformed input. Never retried.
	Validation,
	/// Collaborator unreachable or timed out.
	Transport,
	/// Collaborator answered with a failure status.
	UpstreamRejection,
}
