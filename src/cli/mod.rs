use crate::cli::commands::SubCommand;

/// The commands module, which handles running Kabap subcommands, like `kabap run`.
pub mod commands;

/// The command-line arguments for the Kabap interpreter.
#[derive(clap::Parser)]
pub struct KabapArguments {
	/// Print the interpreter version and exit.
	#[arg(long = "v")]
	pub version: bool,

	/// Run a built-in hello world script through the engine and exit.
	#[arg(long)]
	pub hello: bool,

	/// The command to run, such as `run`.
	#[command(subcommand)]
	pub command: Option<SubCommand>,
}
