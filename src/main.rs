//! # Kabap
//!
//! A small, sandboxed, embeddable scripting language for host applications.
//!
//! This binary is a thin shell over the engine: it reads a script file, runs it, prints what the script returned and exits with a code describing what
//! happened (0 success, 1 script error, 2 help/version/misuse, 3 missing file, 4 unreadable file, 13 permission denied).

// Bring the `Parser` and `CommandFactory` traits into scope from `clap`, which allow parsing argument structs from the command line and printing their
// generated help. We assign them to underscore to indicate clearly that they're not used outside of bringing their trait methods into scope.
use clap::CommandFactory as _;
use clap::Parser as _;

use kabap::cli::{commands::KabapCommand, KabapArguments};

/// The exit code shared by help, version and misuse.
const EXIT_INFORMATIONAL: i32 = 2;

/// The main entry point for the Kabap interpreter. This parses the arguments passed at the command-line, handles the informational flags and runs the
/// given subcommand.
fn main() -> anyhow::Result<()> {
	let arguments = match KabapArguments::try_parse() {
		Ok(arguments) => arguments,
		Err(error) => {
			// Help, version and misuse all land here and share an exit code.
			let _ = error.print();
			std::process::exit(EXIT_INFORMATIONAL);
		},
	};

	if arguments.version {
		println!("Kabap v{}.{}", kabap::VERSION_MAJOR, kabap::VERSION_MINOR);
		std::process::exit(EXIT_INFORMATIONAL);
	}

	if arguments.hello {
		let mut engine = kabap::Kabap::new();
		if engine.script("return = \"Hello, world!\";") && engine.run() {
			println!("{}", engine.stdout());
		}
		std::process::exit(EXIT_INFORMATIONAL);
	}

	let Some(command) = arguments.command else {
		KabapArguments::command().print_help()?;
		std::process::exit(EXIT_INFORMATIONAL);
	};

	command.execute()
}
