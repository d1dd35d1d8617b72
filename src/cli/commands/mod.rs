use crate::cli::commands::run::RunCommand;

/// The run module, which handles the `kabap run` command.
pub mod run;

/// A Kabap subcommand. This provides the join functionality to execute the command that's `enum_dispatched` to all variants of `SubCommand`.
#[enum_dispatch::enum_dispatch]
pub trait KabapCommand {
	/// Executes this subcommand, using the arguments given at the command line and parsed by clap into this struct.
	fn execute(&self) -> anyhow::Result<()>;
}

/// The subcommands of the interpreter.
#[derive(clap::Subcommand)]
#[enum_dispatch::enum_dispatch(KabapCommand)]
pub enum SubCommand {
	/// The run command, which executes the given script file.
	Run(RunCommand),
}
