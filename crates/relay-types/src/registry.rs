//! Registry trait for self-registering implementations.

/// Base trait for implementation registries.
///
/// Every pluggable backend (storage, account, fee oracle, target) exposes a
/// `Registry` struct implementing this trait so the builder can look up its
/// factory by the name used in configuration.
pub trait ImplementationRegistry {
	/// The name used in configuration files to reference this implementation,
	/// e.g. "memory" for `storage.implementations.memory` or "counter" for
	/// `targets.implementations.counter`.
	const NAME: &'static str;

	/// The factory function type this implementation provides.
	type Factory;

	/// Get the factory function for this implementation.
	fn factory() -> Self::Factory;
}
