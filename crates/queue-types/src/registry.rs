//! Registry trait for self-registering backend implementations.

/// Base trait for implementation registries.
///
/// Each backend module (storage, lock, shop, menu) provides a `Registry`
/// struct implementing this trait, declaring the name it is selected by in
/// configuration and the factory that builds it.
pub trait ImplementationRegistry {
	/// The name used in configuration files to reference this implementation.
	///
	/// This matches the key under the section's `implementations` table, for
	/// example `"file"` for `storage.implementations.file` or `"http"` for
	/// `menu.implementations.http`.
	const NAME: &'static str;

	/// The factory function type this implementation provides.
	type Factory;

	/// Get the factory function for this implementation.
	fn factory() -> Self::Factory;
}
