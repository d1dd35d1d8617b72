use std::{cell::Cell, rc::Rc};

// Bring the `Rng` trait into scope, which allows us to use `.gen_range()` on the thread-local generator. We assign this to `as _` to indicate clearly
// that the trait is not referenced directly and only used to bring its methods into scope to be called.
use rand::Rng as _;

use crate::extension::{Extension, Message, MessageResult, MessageType};
use crate::{VERSION_MAJOR, VERSION_MINOR};

/// The extension every engine registers over itself, serving the `kabap` prefix:
///
/// | Reference | Access | Meaning |
/// |---|---|---|
/// | `kabap.version` | read | The engine version as `major.minor`. |
/// | `kabap.scale` | read/write | The decimal scale used when formatting numeric results. |
/// | `kabap.random` | read | A fresh random integer in `0..10000`. |
///
/// The scale cell is shared with the engine, so a script writing `kabap.scale` changes how the rest of the same run formats numbers.
pub struct KabapExtension {
	/// The engine's scale, shared by reference.
	scale: Rc<Cell<u32>>,
}

impl KabapExtension {
	/// Creates the extension over the engine's shared scale cell.
	#[must_use]
	pub fn new(scale: Rc<Cell<u32>>) -> Self {
		Self { scale }
	}
}

impl Extension for KabapExtension {
	fn register(&mut self, engine_version: u32, _debug: bool) -> Option<String> {
		(engine_version == VERSION_MAJOR).then(|| "kabap".to_owned())
	}

	fn reset(&mut self) {}

	fn handle(&mut self, mut message: Message) -> Message {
		match (message.name.as_str(), message.message_type) {
			("kabap.version", MessageType::Read) => {
				message.value = format!("{VERSION_MAJOR}.{VERSION_MINOR}");
				message.result = MessageResult::HandledOkay;
			},
			("kabap.scale", MessageType::Read) => {
				message.value = self.scale.get().to_string();
				message.result = MessageResult::HandledOkay;
			},
			("kabap.scale", MessageType::Write) => match message.value.trim().parse::<u32>() {
				Ok(scale) => {
					self.scale.set(scale);
					message.result = MessageResult::HandledOkay;
				},
				Err(_) => {
					message.value = "Scale must be a whole number".to_owned();
					message.result = MessageResult::HandledFail;
				},
			},
			("kabap.random", MessageType::Read) => {
				message.value = rand::thread_rng().gen_range(0..10000).to_string();
				message.result = MessageResult::HandledOkay;
			},
			("kabap.version" | "kabap.random", MessageType::Write) => {
				message.value = format!("{} is read only", message.name);
				message.result = MessageResult::HandledFail;
			},
			_ => message.result = MessageResult::Ignored,
		}

		message
	}

	fn token(&self) -> Option<String> {
		Some("kabap".to_owned())
	}
}
