use indexmap::IndexMap;

/// The builtin module, which holds the `kabap` extension every engine registers over itself.
pub mod builtin;

/// The reserved registry key for extensions that registered with an empty prefix. These are consulted for any reference no prefixed extension handled.
pub const CATCH_ALL: &str = "*";

/// The kind of operation a reference dispatch asks an extension to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
	/// The reference is being read; The extension should place the result in the message value.
	Read,

	/// The reference is being written; The message value carries what the script assigned.
	Write,
}

/// What an extension did with a message. A handler must set one of the three outcomes before returning; Leaving the message unset is reported to the
/// script author as a broken extension, which is deliberate: silence is indistinguishable from a bug.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MessageResult {
	/// The extension has not decided yet. This is the state messages are created in.
	#[default]
	Unset,

	/// The extension chose not to handle the message; The next extension in the dispatch order is consulted.
	Ignored,

	/// The extension handled the message; For a read, the message value carries the result.
	HandledOkay,

	/// The extension tried to handle the message and failed; The message value carries the error to surface to the script.
	HandledFail,
}

/// A reference dispatch, passed to each candidate extension in turn until one handles it.
#[derive(Debug, Clone)]
pub struct Message {
	/// Whether the reference is being read or written.
	pub message_type: MessageType,

	/// The full (lowercase) reference name, prefix included.
	pub name: String,

	/// The value: what the script assigned for a write, or the result the extension produced for a read.
	pub value: String,

	/// What the extension did with the message.
	pub result: MessageResult,

	/// Opaque host data, untouched by the engine.
	pub custom: Option<String>,
}

impl Message {
	/// Creates an unhandled message for the given operation.
	#[must_use]
	pub fn new(message_type: MessageType, name: impl Into<String>, value: impl Into<String>) -> Self {
		Self { message_type, name: name.into(), value: value.into(), result: MessageResult::Unset, custom: None }
	}
}

/// A host capability exposed to scripts under a reference prefix. The engine calls `register` once when the extension is added, `reset` whenever the
/// engine resets, and `handle` for each reference dispatched to the extension's prefix.
pub trait Extension {
	/// Negotiates registration. The engine passes its major version; The extension returns the (lowercase) prefix it wants to serve, an empty string for
	/// the catch-all bucket, or `None` to decline, which is the expected response to an unsupported engine version.
	fn register(&mut self, engine_version: u32, debug: bool) -> Option<String>;

	/// Clears any state the extension accumulated; Called whenever the engine resets.
	fn reset(&mut self);

	/// Handles one reference dispatch. The message must be returned with its result set; `MessageResult::Ignored` passes it to the next candidate.
	fn handle(&mut self, message: Message) -> Message;

	/// A stable identity for the extension. An extension carrying a token can only be registered once and can be removed by handing it back to the
	/// engine; An anonymous extension (the default) registers freely but cannot be selectively removed.
	fn token(&self) -> Option<String> {
		None
	}
}

/// The extension registry: a mapping from lowercase prefix to the extensions serving it, in registration order, plus the catch-all bucket under `*`.
#[derive(Default)]
pub struct Registry {
	/// The registered extensions, keyed by prefix. Iteration order is registration order.
	buckets: IndexMap<String, Vec<Box<dyn Extension>>>,
}

impl Registry {
	/// Creates an empty registry.
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Returns whether an extension carrying the given identity token is already registered.
	#[must_use]
	pub fn is_registered(&self, token: &str) -> bool {
		self.buckets.values().flatten().any(|extension| extension.token().as_deref() == Some(token))
	}

	/// Files an already-negotiated extension under the given prefix.
	pub fn add(&mut self, prefix: &str, extension: Box<dyn Extension>) {
		self.buckets.entry(prefix.to_owned()).or_default().push(extension);
	}

	/// Removes every extension carrying the given identity token. Returns whether anything was removed.
	pub fn remove(&mut self, token: &str) -> bool {
		let mut removed = false;
		for extensions in self.buckets.values_mut() {
			let before = extensions.len();
			extensions.retain(|extension| extension.token().as_deref() != Some(token));
			removed |= extensions.len() != before;
		}
		self.buckets.retain(|_, extensions| !extensions.is_empty());
		removed
	}

	/// Removes every extension.
	pub fn clear(&mut self) {
		self.buckets.clear();
	}

	/// Invokes every extension's reset hook.
	pub fn reset_all(&mut self) {
		for extension in self.buckets.values_mut().flatten() {
			extension.reset();
		}
	}

	/// The registered prefixes in registration order, catch-all excluded. Recorded in saved token headers.
	#[must_use]
	pub fn prefixes(&self) -> Vec<String> {
		self.buckets.keys().filter(|prefix| *prefix != CATCH_ALL).cloned().collect()
	}

	/// Dispatches a reference operation. The prefix (everything before the first dot, lowercased) selects a bucket; Its extensions are consulted in
	/// registration order, then the catch-all bucket. The first to answer decides the outcome.
	///
	/// # Errors
	/// If a handler fails or misbehaves, or no extension recognises the reference.
	pub fn dispatch(&mut self, message_type: MessageType, name: &str, value: &str) -> anyhow::Result<String> {
		let prefix = name.split('.').next().unwrap_or(name).to_lowercase();

		for bucket in [prefix.as_str(), CATCH_ALL] {
			let Some(extensions) = self.buckets.get_mut(bucket) else { continue };
			for extension in extensions {
				let reply = extension.handle(Message::new(message_type, name, value));
				match reply.result {
					MessageResult::Ignored => {},
					MessageResult::HandledOkay => return Ok(reply.value),
					MessageResult::HandledFail => {
						if reply.value.is_empty() {
							anyhow::bail!("Extension is broken (no error message given)");
						}
						anyhow::bail!("{}", reply.value);
					},
					MessageResult::Unset => anyhow::bail!("Extension is broken (invalid result value)"),
				}
			}
		}

		anyhow::bail!("Reference not found: {name}")
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	/// A scripted test extension: answers reads under its prefix from a fixed response, or misbehaves on demand.
	struct StubExtension {
		prefix: &'static str,
		response: Option<&'static str>,
		outcome: MessageResult,
		identity: Option<&'static str>,
	}

	impl StubExtension {
		fn answering(prefix: &'static str, response: &'static str) -> Self {
			Self { prefix, response: Some(response), outcome: MessageResult::HandledOkay, identity: None }
		}

		fn with_outcome(prefix: &'static str, outcome: MessageResult) -> Self {
			Self { prefix, response: None, outcome, identity: None }
		}
	}

	impl Extension for StubExtension {
		fn register(&mut self, _engine_version: u32, _debug: bool) -> Option<String> {
			Some(self.prefix.to_owned())
		}

		fn reset(&mut self) {}

		fn handle(&mut self, mut message: Message) -> Message {
			message.result = self.outcome;
			if let Some(response) = self.response {
				message.value = response.to_owned();
			}
			message
		}

		fn token(&self) -> Option<String> {
			self.identity.map(str::to_owned)
		}
	}

	#[test]
	fn dispatches_to_the_prefix_bucket() {
		let mut registry = Registry::new();
		registry.add("test", Box::new(StubExtension::answering("test", "bar")));
		assert_eq!(registry.dispatch(MessageType::Read, "test.foo", "").unwrap(), "bar");
	}

	#[test]
	fn ignored_falls_through_in_registration_order() {
		let mut registry = Registry::new();
		registry.add("test", Box::new(StubExtension::with_outcome("test", MessageResult::Ignored)));
		registry.add("test", Box::new(StubExtension::answering("test", "second")));
		assert_eq!(registry.dispatch(MessageType::Read, "test.foo", "").unwrap(), "second");
	}

	#[test]
	fn unclaimed_references_fall_to_the_catch_all() {
		let mut registry = Registry::new();
		registry.add("test", Box::new(StubExtension::with_outcome("test", MessageResult::Ignored)));
		registry.add(CATCH_ALL, Box::new(StubExtension::answering("", "anything")));
		assert_eq!(registry.dispatch(MessageType::Read, "test.foo", "").unwrap(), "anything");
		assert_eq!(registry.dispatch(MessageType::Read, "other.thing", "").unwrap(), "anything");
	}

	#[test]
	fn unresolved_references_are_reported() {
		let mut registry = Registry::new();
		let error = registry.dispatch(MessageType::Read, "missing.thing", "").unwrap_err().to_string();
		assert_eq!(error, "Reference not found: missing.thing");
	}

	#[test]
	fn failures_surface_their_message_or_a_broken_notice() {
		let mut registry = Registry::new();
		registry.add("test", Box::new(StubExtension::with_outcome("test", MessageResult::HandledFail)));
		assert_eq!(
			registry.dispatch(MessageType::Read, "test.foo", "").unwrap_err().to_string(),
			"Extension is broken (no error message given)"
		);

		let mut registry = Registry::new();
		registry.add("test", Box::new(StubExtension { response: Some("device offline"), ..StubExtension::with_outcome("test", MessageResult::HandledFail) }));
		assert_eq!(registry.dispatch(MessageType::Read, "test.foo", "").unwrap_err().to_string(), "device offline");
	}

	#[test]
	fn an_unset_result_is_a_broken_extension() {
		let mut registry = Registry::new();
		registry.add("test", Box::new(StubExtension::with_outcome("test", MessageResult::Unset)));
		assert_eq!(
			registry.dispatch(MessageType::Read, "test.foo", "").unwrap_err().to_string(),
			"Extension is broken (invalid result value)"
		);
	}

	#[test]
	fn identity_tokens_register_once_and_remove() {
		let mut registry = Registry::new();
		registry.add("test", Box::new(StubExtension { identity: Some("stub"), ..StubExtension::answering("test", "bar") }));
		assert!(registry.is_registered("stub"));
		assert!(!registry.is_registered("other"));
		assert!(registry.remove("stub"));
		assert!(!registry.remove("stub"));
		assert!(registry.dispatch(MessageType::Read, "test.foo", "").is_err());
	}
}
