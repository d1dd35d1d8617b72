//! # Kabap
//!
//! A small, sandboxed, embeddable scripting language for host applications.
//!
//! Kabap is meant to be dropped into a program so end-users can supply little expressions and control-flow snippets (shipping calculators, pricing
//! rules, custom conditions) without compromising the host. The only datum is the character string; Numbers and booleans are decoded on demand. Scripts
//! can touch nothing outside the engine unless the host registers an [extension](extension::Extension) exposing a capability under a reference prefix.
//!
//! ## Usage
//!
//! ```
//! let mut engine = kabap::Kabap::new();
//! assert!(engine.script("$total = $price * 1.2; return = $total;"));
//! engine.variable_set("price", "8");
//! assert!(engine.run());
//! assert_eq!(engine.stdout(), "9.6");
//! ```

/// The cli module, which handles the `kabap` command-line interface.
pub mod cli;

/// The engine module, which holds the [`Kabap`] engine facade hosts embed.
pub mod engine;

/// The extension module, which holds the protocol hosts use to expose capabilities to scripts.
pub mod extension;

/// The kat module, which reads and writes the `.kat` token interchange format.
pub mod kat;

/// The lexer module, which tokenizes source code into a program.
pub mod lexer;

/// The number module, which decodes and formats the numeric view of string values.
pub mod number;

/// The optimiser module, which rewrites a tokenized program at the configured level.
pub mod optimiser;

/// The tokens module, which holds the token, statement and program model.
pub mod tokens;

/// The executor module, which evaluates a program statement by statement.
mod executor;

pub use engine::Kabap;

/// The engine's major version, negotiated with extensions and recorded in saved tokens.
pub const VERSION_MAJOR: u32 = 1;

/// The engine's minor version.
pub const VERSION_MINOR: u32 = 0;
