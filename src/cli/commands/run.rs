use colored::Colorize as _;

use crate::cli::commands::KabapCommand;
use crate::Kabap;

/// The exit code for a script that failed to parse or run.
const EXIT_SCRIPT_ERROR: i32 = 1;

/// The exit code for a script file that does not exist.
const EXIT_FILE_MISSING: i32 = 3;

/// The exit code for a script file that exists but could not be read.
const EXIT_FILE_ERROR: i32 = 4;

/// The exit code for a script file the process may not read.
const EXIT_FILE_PERMISSION: i32 = 13;

/// The run command, which executes the given script file and prints what it returns.
#[derive(clap::Parser)]
pub struct RunCommand {
	/// The name of the file to run.
	pub sourcefile: String,
}

impl KabapCommand for RunCommand {
	fn execute(&self) -> anyhow::Result<()> {
		let source = match std::fs::read_to_string(&self.sourcefile) {
			Ok(source) => source,
			Err(error) => {
				eprintln!("{} {error}", "Error reading script:".red().bold());
				let code = match error.kind() {
					std::io::ErrorKind::NotFound => EXIT_FILE_MISSING,
					std::io::ErrorKind::PermissionDenied => EXIT_FILE_PERMISSION,
					_ => EXIT_FILE_ERROR,
				};
				std::process::exit(code);
			},
		};

		let mut engine = Kabap::new();
		if !engine.script(&source) || !engine.run() {
			eprintln!("{}", engine.stderr().red());
			std::process::exit(EXIT_SCRIPT_ERROR);
		}

		if !engine.stdout().is_empty() {
			println!("{}", engine.stdout());
		}
		Ok(())
	}
}
