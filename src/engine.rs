use std::{cell::Cell, collections::HashMap, rc::Rc};

use crate::executor::Executor;
use crate::extension::{builtin::KabapExtension, Extension, Registry, CATCH_ALL};
use crate::kat;
use crate::lexer;
use crate::optimiser;
use crate::tokens::Program;
use crate::VERSION_MAJOR;

/// The default number of decimal digits retained when formatting numeric results.
pub const DEFAULT_SCALE: u32 = 3;

/// The default watchdog tick limit: the number of statement iterations a run may take before it is stopped.
pub const DEFAULT_WATCHDOG: u64 = 1000;

/// A Kabap engine: an in-process, sandboxed interpreter an application embeds so its users can supply small scripts without being handed the keys to the
/// machine. Scripts see nothing of the host - no filesystem, no network, no process state - unless the host deliberately registers an extension exposing
/// such a capability under a reference prefix.
///
/// The engine persists across calls: load a program once with [`script`](Self::script) or [`tokens_load`](Self::tokens_load), then
/// [`run`](Self::run) it as often as needed. Output lands in [`stdout`](Self::stdout) and errors in [`stderr`](Self::stderr) as plain strings; Nothing
/// here panics or escapes into the host as an exception.
///
/// An engine is single-threaded by design and not safe for concurrent use.
///
/// ```
/// let mut engine = kabap::Kabap::new();
/// assert!(engine.script("return = 2+2;"));
/// assert!(engine.run());
/// assert_eq!(engine.stdout(), "4");
/// ```
pub struct Kabap {
	/// The loaded program, if any.
	program: Option<Program>,

	/// The variable store. Scripts read and write it with `$name`; The host through the `variable_*` methods.
	variables: HashMap<String, String>,

	/// The extension registry.
	extensions: Registry,

	/// The configured scale, shared with the built-in extension so `kabap.scale` stays live.
	scale: Rc<Cell<u32>>,

	/// The watchdog tick limit. Zero disables the watchdog.
	watchdog: u64,

	/// Whether extensions are told to register in debug mode.
	debug: bool,

	/// Everything the program returned, in order.
	stdout: String,

	/// The first error the engine raised, or empty.
	stderr: String,
}

impl Default for Kabap {
	fn default() -> Self {
		Self::new()
	}
}

impl Kabap {
	/// Creates an engine with default configuration and the built-in `kabap` extension registered.
	#[must_use]
	pub fn new() -> Self {
		let mut engine = Self {
			program: None,
			variables: HashMap::new(),
			extensions: Registry::new(),
			scale: Rc::new(Cell::new(DEFAULT_SCALE)),
			watchdog: DEFAULT_WATCHDOG,
			debug: false,
			stdout: String::new(),
			stderr: String::new(),
		};
		let _ = engine.extension_add(Box::new(KabapExtension::new(Rc::clone(&engine.scale))));
		engine
	}

	/// Parses the given source code and makes it the loaded program, resetting the engine. Configuration returns to its defaults; Loading persisted
	/// tokens instead honours their header.
	///
	/// Returns whether parsing succeeded; On failure the parse error is in [`stderr`](Self::stderr) and stays there so a following
	/// [`run`](Self::run) reports it too.
	pub fn script(&mut self, source: &str) -> bool {
		self.scale.set(DEFAULT_SCALE);
		self.watchdog = DEFAULT_WATCHDOG;
		self.program = None;
		self.reset();

		let parsed = lexer::tokenize(source).and_then(|mut program| {
			optimiser::optimise(&mut program, 1)?;
			Ok(program)
		});
		match parsed {
			Ok(program) => {
				self.program = Some(program);
				true
			},
			Err(error) => {
				self.stderr = error.to_string();
				false
			},
		}
	}

	/// Loads a program from `.kat` token interchange text, resetting the engine and applying the scale and watchdog settings the header carries.
	///
	/// Returns whether loading succeeded; On failure the error is in [`stderr`](Self::stderr).
	pub fn tokens_load(&mut self, text: &str) -> bool {
		self.program = None;
		self.reset();

		match kat::load(text) {
			Ok((program, settings)) => {
				if let Some(scale) = settings.scale {
					self.scale.set(scale);
				}
				if let Some(watchdog) = settings.watchdog {
					self.watchdog = watchdog;
				}
				self.program = Some(program);
				true
			},
			Err(error) => {
				self.stderr = error.to_string();
				false
			},
		}
	}

	/// Optimises the loaded program at the given level and serialises it to `.kat` token interchange text.
	///
	/// Returns `None`, with the reason in [`stderr`](Self::stderr), when no program is loaded or the level is out of bounds.
	pub fn tokens_save(&mut self, level: i32) -> Option<String> {
		let Some(program) = self.program.as_mut() else {
			self.stderr = "Script or tokens must be loaded before saving".to_owned();
			return None;
		};
		if let Err(error) = optimiser::optimise(program, level) {
			self.stderr = error.to_string();
			return None;
		}
		Some(kat::save(program, self.scale.get(), self.watchdog, &self.extensions.prefixes()))
	}

	/// Runs the loaded program. [`stdout`](Self::stdout) and [`stderr`](Self::stderr) are cleared first and populated by the run; The variable store is
	/// left alone, so values the host seeded (or a previous run wrote) are visible to the script.
	///
	/// Returns whether the run completed without error. With no program loaded this fails, leaving any pending load error in place for the host to read.
	pub fn run(&mut self) -> bool {
		let Some(program) = self.program.as_ref() else {
			if self.stderr.is_empty() {
				self.stderr = "Script or tokens must be loaded before running".to_owned();
			}
			return false;
		};

		self.stdout.clear();
		self.stderr.clear();

		let mut executor = Executor::new(
			program,
			&mut self.variables,
			&mut self.extensions,
			Rc::clone(&self.scale),
			self.watchdog,
			&mut self.stdout,
		);
		match executor.run() {
			Ok(()) => true,
			Err(error) => {
				self.stderr = error.to_string();
				false
			},
		}
	}

	/// Clears the variable store, stdout and stderr, and resets every extension. The loaded program is kept.
	pub fn reset(&mut self) {
		self.variables.clear();
		self.stdout.clear();
		self.stderr.clear();
		self.extensions.reset_all();
	}

	/// Returns whether the named variable exists. The name is looked up exactly as given; Scripts always use lowercase names.
	#[must_use]
	pub fn variable_has(&self, name: &str) -> bool {
		self.variables.contains_key(name)
	}

	/// Returns the named variable's value, if set.
	#[must_use]
	pub fn variable_get(&self, name: &str) -> Option<&str> {
		self.variables.get(name).map(String::as_str)
	}

	/// Sets a variable. The name is stored exactly as given; Scripts look variables up by lowercase name, so a host that wants a script to see the value
	/// should use a lowercase name.
	pub fn variable_set(&mut self, name: &str, value: &str) {
		let _ = self.variables.insert(name.to_owned(), value.to_owned());
	}

	/// Removes the named variable. Returns whether it existed.
	pub fn variable_remove(&mut self, name: &str) -> bool {
		self.variables.remove(name).is_some()
	}

	/// Removes every variable.
	pub fn variable_remove_all(&mut self) {
		self.variables.clear();
	}

	/// The whole variable store.
	#[must_use]
	pub fn variable_store_get(&self) -> &HashMap<String, String> {
		&self.variables
	}

	/// Replaces the whole variable store.
	pub fn variable_store_set(&mut self, store: HashMap<String, String>) {
		self.variables = store;
	}

	/// The configured scale.
	#[must_use]
	pub fn scale_get(&self) -> u32 {
		self.scale.get()
	}

	/// Sets the scale: the number of decimal digits retained when formatting numeric results.
	pub fn scale_set(&mut self, scale: u32) {
		self.scale.set(scale);
	}

	/// The configured watchdog tick limit.
	#[must_use]
	pub const fn watchdog_get(&self) -> u64 {
		self.watchdog
	}

	/// Sets the watchdog tick limit: the number of statement iterations a run may take. Zero disables the watchdog; A negative value restores the
	/// default.
	pub fn watchdog_set(&mut self, limit: i64) {
		self.watchdog = if limit < 0 { DEFAULT_WATCHDOG } else { limit as u64 };
	}

	/// Offers an extension to the engine. The extension is asked to register against this engine's major version; It declines by returning no prefix. An
	/// extension carrying an identity token that is already registered is refused.
	///
	/// Returns whether the extension was registered.
	pub fn extension_add(&mut self, mut extension: Box<dyn Extension>) -> bool {
		if let Some(token) = extension.token() {
			if self.extensions.is_registered(&token) {
				return false;
			}
		}
		let Some(prefix) = extension.register(VERSION_MAJOR, self.debug) else {
			return false;
		};
		let prefix = if prefix.is_empty() { CATCH_ALL.to_owned() } else { prefix.to_lowercase() };
		self.extensions.add(&prefix, extension);
		true
	}

	/// Removes the given extension, identified by its token. An anonymous extension cannot be removed individually; Remove all and re-add the rest.
	///
	/// Returns whether anything was removed; Failure leaves the reason in [`stderr`](Self::stderr).
	pub fn extension_remove(&mut self, extension: &dyn Extension) -> bool {
		let Some(token) = extension.token() else {
			self.stderr = "An anonymous extension cannot be removed individually".to_owned();
			return false;
		};
		self.extensions.remove(&token)
	}

	/// Removes every extension, then re-registers the built-in `kabap` extension.
	pub fn extension_remove_all(&mut self) {
		self.extensions.clear();
		let _ = self.extension_add(Box::new(KabapExtension::new(Rc::clone(&self.scale))));
	}

	/// Everything the loaded program has returned, or empty.
	#[must_use]
	pub fn stdout(&self) -> &str {
		&self.stdout
	}

	/// The first error the engine raised, or empty.
	#[must_use]
	pub fn stderr(&self) -> &str {
		&self.stderr
	}
}
