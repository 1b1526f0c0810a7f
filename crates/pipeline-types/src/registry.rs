//! Registry trait for self-registering implementations.
//!
//! Broker and state store backends each expose a `Registry` type so the
//! service can build its factory maps from the names used in configuration.

/// Base trait for implementation registries.
pub trait ImplementationRegistry {
	/// The name used in configuration files to reference this implementation,
	/// e.g. `"sidecar"` for `[state.implementations.sidecar]`.
	const NAME: &'static str;

	/// The factory function type this implementation provides.
	type Factory;

	/// Returns the factory function for this implementation.
	fn factory() -> Self::Factory;
}
